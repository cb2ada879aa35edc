use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::models::project::{DbProject, Project, PROJECT_COLUMNS};
use crate::models::task::{DbTask, Task, TASK_COLUMNS};
use crate::models::team_member::{DbTeamMember, TeamMember, MEMBER_COLUMNS};

/// Everything a single insights run reads, loaded once up front.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub members: Vec<TeamMember>,
}

impl Snapshot {
    /// Rows are ordered by creation time then id so rule tie-breaks are stable.
    pub async fn load(pool: &SqlitePool) -> Result<Self, AppError> {
        let projects = sqlx::query_as::<_, DbProject>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id"
        ))
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Project::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let tasks = sqlx::query_as::<_, DbTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, id"
        ))
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Task::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let members = sqlx::query_as::<_, DbTeamMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members ORDER BY created_at, id"
        ))
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(TeamMember::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            projects = projects.len(),
            tasks = tasks.len(),
            members = members.len(),
            "insights snapshot loaded"
        );

        Ok(Self { projects, tasks, members })
    }
}

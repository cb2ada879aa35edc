use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::principal::Principal;
use super::role::Role;
use crate::errors::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectFacts {
    pub owner_id: Option<Uuid>,
    /// Department of the owning user.
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFacts {
    pub project_id: Uuid,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFacts {
    pub department_id: Option<Uuid>,
}

/// Relationship lookups the access evaluator needs. Every call goes to the
/// backing store; nothing is cached between requests.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn principal(&self, user_id: Uuid) -> AppResult<Option<Principal>>;

    async fn project_facts(&self, project_id: Uuid) -> AppResult<Option<ProjectFacts>>;

    async fn task_facts(&self, task_id: Uuid) -> AppResult<Option<TaskFacts>>;

    async fn member_facts(&self, member_id: Uuid) -> AppResult<Option<MemberFacts>>;

    /// Team member linked to the given user account, if any.
    async fn team_member_for_user(&self, user_id: Uuid) -> AppResult<Option<Uuid>>;

    async fn is_project_member(&self, project_id: Uuid, team_member_id: Uuid) -> AppResult<bool>;
}

#[derive(Debug, Clone)]
pub struct SqliteAccessStore {
    pool: SqlitePool,
}

impl SqliteAccessStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessStore for SqliteAccessStore {
    async fn principal(&self, user_id: Uuid) -> AppResult<Option<Principal>> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<Uuid>, bool)>(
            "SELECT id, role, department_id, is_active FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, role, department_id, active)| Principal {
            id,
            role: Role::from_stored(&role),
            department_id,
            active,
        }))
    }

    async fn project_facts(&self, project_id: Uuid) -> AppResult<Option<ProjectFacts>> {
        let row = sqlx::query_as::<_, (Option<Uuid>, Option<Uuid>)>(
            "SELECT p.owner_id, u.department_id FROM projects p LEFT JOIN users u ON u.id = p.owner_id WHERE p.id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(owner_id, department_id)| ProjectFacts { owner_id, department_id }))
    }

    async fn task_facts(&self, task_id: Uuid) -> AppResult<Option<TaskFacts>> {
        let row = sqlx::query_as::<_, (Uuid, Option<Uuid>)>("SELECT project_id, assignee_id FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(project_id, assignee_id)| TaskFacts { project_id, assignee_id }))
    }

    async fn member_facts(&self, member_id: Uuid) -> AppResult<Option<MemberFacts>> {
        let row = sqlx::query_as::<_, (Option<Uuid>,)>("SELECT department_id FROM team_members WHERE id = ?")
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(department_id,)| MemberFacts { department_id }))
    }

    async fn team_member_for_user(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM team_members WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn is_project_member(&self, project_id: Uuid, team_member_id: Uuid) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM project_members WHERE project_id = ? AND team_member_id = ?",
        )
        .bind(project_id)
        .bind(team_member_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

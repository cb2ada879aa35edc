use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::Auditable;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Completed,
}

impl TaskStatus {
    pub const ALLOWED: &'static [&'static str] = &["todo", "in-progress", "review", "completed"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "in-progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Review => "review",
            Self::Completed => "completed",
        }
    }

    /// Statuses that count toward a member's active workload.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALLOWED: &'static [&'static str] = &["low", "medium", "high"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "2025-10-01")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-10-15")]
    pub end_date: NaiveDate,
    pub status: TaskStatus,
    pub priority: Priority,
    pub progress: i64,
    /// Team member the task is assigned to.
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auditable for Task {
    fn resource_type() -> &'static str {
        "task"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "project_id": self.project_id, "name": self.name })
    }
}

pub const TASK_COLUMNS: &str =
    "id, project_id, name, description, start_date, end_date, status, priority, progress, assignee_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub priority: String,
    pub progress: i64,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        let status = TaskStatus::parse(&value.status)
            .ok_or_else(|| AppError::internal(format!("invalid stored task status '{}'", value.status)))?;
        let priority = Priority::parse(&value.priority)
            .ok_or_else(|| AppError::internal(format!("invalid stored task priority '{}'", value.priority)))?;

        Ok(Task {
            id: value.id,
            project_id: value.project_id,
            name: value.name,
            description: value.description,
            start_date: value.start_date,
            end_date: value.end_date,
            status,
            priority,
            progress: value.progress,
            assignee_id: value.assignee_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Applies a status and/or progress change keeping `completed <=> 100`.
///
/// Status is applied first, then progress:
/// - status `completed` sets progress to 100
/// - status `todo` on a task at 100 resets progress to 0
/// - progress 100 sets status `completed`
/// - progress below 100 on a completed task reopens it (`todo` at 0,
///   `in-progress` otherwise)
///
/// Any combination still violating the invariant (e.g. `review` at 100) is
/// rejected as a progress validation error.
pub fn couple_status_progress(
    status: TaskStatus,
    progress: i64,
    new_status: Option<TaskStatus>,
    new_progress: Option<i64>,
) -> Result<(TaskStatus, i64), AppError> {
    let (mut status, mut progress) = (status, progress);

    if let Some(next) = new_status {
        status = next;
        match next {
            TaskStatus::Completed => progress = 100,
            TaskStatus::Todo if progress == 100 => progress = 0,
            _ => {}
        }
    }

    if let Some(next) = new_progress {
        if !(0..=100).contains(&next) {
            return Err(AppError::validation("progress", "must be between 0 and 100"));
        }
        progress = next;
        if progress == 100 {
            status = TaskStatus::Completed;
        } else if status == TaskStatus::Completed {
            status = if progress == 0 { TaskStatus::Todo } else { TaskStatus::InProgress };
        }
    }

    if (status == TaskStatus::Completed) != (progress == 100) {
        return Err(AppError::validation(
            "progress",
            "must be 100 exactly when the task is completed",
        ));
    }

    Ok((status, progress))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreateRequest {
    pub project_id: Uuid,
    #[schema(example = "Define launch checklist")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "2025-10-01")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-10-15")]
    pub end_date: NaiveDate,
    #[schema(example = "todo")]
    pub status: Option<String>,
    #[schema(example = "medium")]
    pub priority: Option<String>,
    #[schema(example = 0)]
    pub progress: Option<i64>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TaskUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[schema(example = "in-progress")]
    pub status: Option<String>,
    #[schema(example = "high")]
    pub priority: Option<String>,
    pub progress: Option<i64>,
    /// `null` clears the assignee.
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub assignee_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskStatusRequest {
    #[schema(example = "review")]
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskProgressRequest {
    #[schema(example = 60)]
    pub progress: i64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListQuery {
    pub project_id: Option<Uuid>,
    #[param(example = "in-progress")]
    pub status: Option<String>,
    pub assignee_id: Option<Uuid>,
    #[param(example = "high")]
    pub priority: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::*;

    #[test]
    fn progress_100_completes() {
        for status in [Todo, InProgress, Review] {
            assert_eq!(couple_status_progress(status, 40, None, Some(100)).unwrap(), (Completed, 100));
        }
    }

    #[test]
    fn completed_status_forces_full_progress() {
        for progress in [0, 35, 99] {
            assert_eq!(couple_status_progress(InProgress, progress, Some(Completed), None).unwrap(), (Completed, 100));
        }
    }

    #[test]
    fn todo_resets_full_progress() {
        assert_eq!(couple_status_progress(Completed, 100, Some(Todo), None).unwrap(), (Todo, 0));
        assert_eq!(couple_status_progress(InProgress, 30, Some(Todo), None).unwrap(), (Todo, 30));
    }

    #[test]
    fn lowering_progress_reopens() {
        assert_eq!(couple_status_progress(Completed, 100, None, Some(0)).unwrap(), (Todo, 0));
        assert_eq!(couple_status_progress(Completed, 100, None, Some(70)).unwrap(), (InProgress, 70));
    }

    #[test]
    fn progress_wins_when_both_given() {
        assert_eq!(couple_status_progress(Todo, 0, Some(Completed), Some(50)).unwrap(), (InProgress, 50));
        assert_eq!(couple_status_progress(Todo, 0, Some(Review), Some(100)).unwrap(), (Completed, 100));
    }

    #[test]
    fn unresolvable_combination_is_rejected() {
        let err = couple_status_progress(Completed, 100, Some(Review), None).unwrap_err();
        assert_eq!(err.kind(), "validation_failed");
        assert!(couple_status_progress(Todo, 0, None, Some(101)).is_err());
    }

    #[test]
    fn no_op_is_identity() {
        assert_eq!(couple_status_progress(Review, 80, None, None).unwrap(), (Review, 80));
        assert_eq!(couple_status_progress(Review, 80, Some(Review), Some(80)).unwrap(), (Review, 80));
    }
}

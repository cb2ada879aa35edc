use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::Auditable;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub const ALLOWED: &'static [&'static str] = &["planning", "active", "on-hold", "completed"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "on-hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::OnHold => "on-hold",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "#3B82F6")]
    pub color: String,
    pub status: ProjectStatus,
    /// Mean of task progress once the project has tasks.
    pub progress: i64,
    #[schema(example = "2025-10-01")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-12-15")]
    pub end_date: NaiveDate,
    pub owner_id: Option<Uuid>,
    pub member_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auditable for Project {
    fn resource_type() -> &'static str {
        "project"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name, "status": self.status })
    }
}

pub const PROJECT_COLUMNS: &str =
    "id, name, description, color, status, progress, start_date, end_date, owner_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub status: String,
    pub progress: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(value: DbProject) -> Result<Self, Self::Error> {
        let status = ProjectStatus::parse(&value.status)
            .ok_or_else(|| AppError::internal(format!("invalid stored project status '{}'", value.status)))?;

        Ok(Project {
            id: value.id,
            name: value.name,
            description: value.description,
            color: value.color,
            status,
            progress: value.progress,
            start_date: value.start_date,
            end_date: value.end_date,
            owner_id: value.owner_id,
            member_ids: Vec::new(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Integer mean of task progress, truncated. `None` without tasks.
pub fn derived_progress(task_progress: &[i64]) -> Option<i64> {
    if task_progress.is_empty() {
        return None;
    }
    let sum: i64 = task_progress.iter().sum();
    Some(sum / task_progress.len() as i64)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Launch Planning")]
    pub name: String,
    #[schema(example = "Prepare milestones for the product launch.")]
    pub description: Option<String>,
    #[schema(example = "#3B82F6")]
    pub color: Option<String>,
    #[schema(example = "planning")]
    pub status: Option<String>,
    #[schema(example = "2025-10-01")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-12-15")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    #[schema(example = "Launch Planning")]
    pub name: Option<String>,
    #[schema(example = "Updated description")]
    pub description: Option<String>,
    #[schema(example = "#2ecc71")]
    pub color: Option<String>,
    #[schema(example = "active")]
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Accepted only while the project has no tasks.
    pub progress: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectMemberRequest {
    pub team_member_id: Uuid,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    #[param(example = "active")]
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

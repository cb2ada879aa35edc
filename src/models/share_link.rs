use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::project::Project;
use super::task::Task;
use crate::audit::Auditable;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareLink {
    pub id: Uuid,
    pub project_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl Auditable for ShareLink {
    fn resource_type() -> &'static str {
        "share_link"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "project_id": self.project_id, "expires_at": self.expires_at })
    }
}

pub const SHARE_LINK_COLUMNS: &str = "id, project_id, token_hash, expires_at, created_by, revoked_at, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbShareLink {
    pub id: Uuid,
    pub project_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DbShareLink {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.revoked_at.is_none()
    }
}

impl TryFrom<DbShareLink> for ShareLink {
    type Error = AppError;

    fn try_from(value: DbShareLink) -> Result<Self, Self::Error> {
        let is_valid = value.is_valid_at(Utc::now());
        Ok(ShareLink {
            id: value.id,
            project_id: value.project_id,
            expires_at: value.expires_at,
            created_by: value.created_by,
            revoked_at: value.revoked_at,
            created_at: value.created_at,
            is_valid,
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ShareLinkCreateRequest {
    #[schema(example = 7)]
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareLinkCreatedResponse {
    pub link: ShareLink,
    pub token: String,
    #[schema(example = "/api/share/3f1c...")]
    pub path: String,
}

/// Member details exposed through a public share link.
#[derive(Debug, Serialize, ToSchema, FromRow)]
pub struct SharedMember {
    pub id: Uuid,
    pub name: String,
    pub job_title: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SharedProjectView {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub members: Vec<SharedMember>,
    pub expires_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::Auditable;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Away,
    Offline,
}

impl MemberStatus {
    pub const ALLOWED: &'static [&'static str] = &["active", "away", "offline"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "away" => Some(Self::Away),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

/// Operational identity used for project membership and task assignment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamMember {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub job_title: Option<String>,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auditable for TeamMember {
    fn resource_type() -> &'static str {
        "team_member"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name, "email": self.email })
    }
}

pub const MEMBER_COLUMNS: &str = "id, user_id, department_id, name, email, job_title, status, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbTeamMember {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub job_title: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTeamMember> for TeamMember {
    type Error = AppError;

    fn try_from(value: DbTeamMember) -> Result<Self, Self::Error> {
        let status = MemberStatus::parse(&value.status)
            .ok_or_else(|| AppError::internal(format!("invalid stored member status '{}'", value.status)))?;

        Ok(TeamMember {
            id: value.id,
            user_id: value.user_id,
            department_id: value.department_id,
            name: value.name,
            email: value.email,
            job_title: value.job_title,
            status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TeamMemberCreateRequest {
    #[schema(example = "Grace Hopper")]
    pub name: String,
    #[schema(example = "grace@example.com")]
    pub email: String,
    #[schema(example = "Engineer")]
    pub job_title: Option<String>,
    pub department_id: Option<Uuid>,
    /// Links the member to an existing account.
    pub user_id: Option<Uuid>,
    #[schema(example = "active")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TeamMemberUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub job_title: Option<String>,
    pub department_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberStatusRequest {
    #[schema(example = "away")]
    pub status: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamListQuery {
    #[param(example = "active")]
    pub status: Option<String>,
    pub department_id: Option<Uuid>,
}

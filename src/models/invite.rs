use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::Auditable;
use crate::authz::Role;
use crate::errors::AppError;

/// Roles an invite may grant.
pub const INVITE_ROLES: &[&str] = &["manager", "member", "viewer"];

pub const MIN_EXPIRY_DAYS: i64 = 1;
pub const MAX_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Invite {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub department_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl Auditable for Invite {
    fn resource_type() -> &'static str {
        "invite"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "email": self.email, "role": self.role })
    }
}

pub const INVITE_COLUMNS: &str =
    "id, token_hash, email, role, department_id, password_hash, created_by, expires_at, used_at, revoked_at, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbInvite {
    pub id: Uuid,
    pub token_hash: String,
    pub email: String,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub password_hash: Option<String>,
    pub created_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DbInvite {
    /// Unexpired, unused and unrevoked at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.used_at.is_none() && self.revoked_at.is_none()
    }
}

impl TryFrom<DbInvite> for Invite {
    type Error = AppError;

    fn try_from(value: DbInvite) -> Result<Self, Self::Error> {
        let is_valid = value.is_valid_at(Utc::now());
        Ok(Invite {
            id: value.id,
            email: value.email,
            role: Role::from_stored(&value.role),
            department_id: value.department_id,
            created_by: value.created_by,
            expires_at: value.expires_at,
            used_at: value.used_at,
            revoked_at: value.revoked_at,
            created_at: value.created_at,
            is_valid,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteCreateRequest {
    #[schema(example = "new.hire@example.com")]
    pub email: String,
    #[schema(example = "member")]
    pub role: String,
    pub department_id: Option<Uuid>,
    /// Optional pre-set password; otherwise chosen on acceptance.
    pub password: Option<String>,
    #[schema(example = 7)]
    pub expires_in_days: Option<i64>,
}

/// Returned once on creation; the token is never readable again.
#[derive(Debug, Serialize, ToSchema)]
pub struct InviteCreatedResponse {
    pub invite: Invite,
    pub token: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InviteAcceptRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: Option<String>,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteValidation {
    pub valid: bool,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    /// False when the inviter already set a password.
    pub password_required: bool,
}

impl InviteValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            email: None,
            role: None,
            department_id: None,
            expires_at: None,
            password_required: false,
        }
    }
}

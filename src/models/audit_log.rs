use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[schema(example = "invite.created")]
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const AUDIT_COLUMNS: &str =
    "id, user_id, action, resource_type, resource_id, details, ip_address, user_agent, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbAuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAuditLog> for AuditLog {
    type Error = AppError;

    fn try_from(value: DbAuditLog) -> Result<Self, Self::Error> {
        let details = serde_json::from_str(&value.details)
            .map_err(|err| AppError::internal(format!("invalid audit details: {err}")))?;

        Ok(AuditLog {
            id: value.id,
            user_id: value.user_id,
            action: value.action,
            resource_type: value.resource_type,
            resource_id: value.resource_id,
            details,
            ip_address: value.ip_address,
            user_agent: value.user_agent,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditListQuery {
    #[param(example = "invite")]
    pub resource_type: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

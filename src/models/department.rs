use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::Auditable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Back-reference only; cleared when the admin account is removed.
    pub admin_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auditable for Department {
    fn resource_type() -> &'static str {
        "department"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name, "admin_id": self.admin_id })
    }
}

pub const DEPARTMENT_COLUMNS: &str = "id, name, description, admin_id, created_at, updated_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepartmentCreateRequest {
    #[schema(example = "Engineering")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepartmentUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignAdminRequest {
    pub user_id: Uuid,
}

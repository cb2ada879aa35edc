use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::Auditable;
use crate::authz::Role;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
    #[schema(example = "+1 555 0100")]
    pub phone: Option<String>,
    #[schema(example = "Europe/Lisbon")]
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Auditable for User {
    fn resource_type() -> &'static str {
        "user"
    }

    fn resource_id(&self) -> Uuid {
        self.id
    }

    fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({ "email": self.email, "role": self.role, "is_active": self.is_active })
    }
}

pub const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, department_id, is_active, phone, timezone, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
    pub phone: Option<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: value.id,
            name: value.name,
            email: value.email,
            role: Role::from_stored(&value.role),
            department_id: value.department_id,
            is_active: value.is_active,
            phone: value.phone,
            timezone: value.timezone,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[schema(example = "S3cureP@ssw0rd")]
    pub current_password: String,
    #[schema(example = "N3wS3cureP@ss")]
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    #[schema(example = "Ada King")]
    pub name: Option<String>,
    #[schema(example = "manager")]
    pub role: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub department_id: Option<Option<Uuid>>,
}

/// Admin-created account. The role defaults to `member`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UserCreateRequest {
    #[schema(example = "Grace Hopper")]
    pub name: String,
    #[schema(example = "grace@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "manager")]
    pub role: Option<String>,
    pub department_id: Option<Uuid>,
}

/// Self-service edits. Role, password and department are not reachable here.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
    pub task_reminders: bool,
    pub project_updates: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            task_reminders: true,
            project_updates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DisplayPreferences {
    pub compact_mode: bool,
    pub show_avatars: bool,
    #[schema(example = "gantt")]
    pub default_view: String,
}

impl DisplayPreferences {
    pub const VIEWS: &'static [&'static str] = &["gantt", "list", "board"];
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            compact_mode: false,
            show_avatars: true,
            default_view: "gantt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSettings {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "system")]
    pub theme: String,
    #[schema(example = "en")]
    pub language: String,
    pub notifications: NotificationPreferences,
    pub display_preferences: DisplayPreferences,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub const THEMES: &'static [&'static str] = &["light", "dark", "system"];
}

pub const SETTINGS_COLUMNS: &str = "id, user_id, theme, language, notifications, display_preferences, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbUserSettings {
    pub id: Uuid,
    pub user_id: Uuid,
    pub theme: String,
    pub language: String,
    pub notifications: String,
    pub display_preferences: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUserSettings> for UserSettings {
    type Error = AppError;

    fn try_from(value: DbUserSettings) -> Result<Self, Self::Error> {
        let notifications = serde_json::from_str(&value.notifications)
            .map_err(|err| AppError::internal(format!("corrupt notification settings: {err}")))?;
        let display_preferences = serde_json::from_str(&value.display_preferences)
            .map_err(|err| AppError::internal(format!("corrupt display settings: {err}")))?;

        Ok(UserSettings {
            id: value.id,
            user_id: value.user_id,
            theme: value.theme,
            language: value.language,
            notifications,
            display_preferences,
            updated_at: value.updated_at,
        })
    }
}

/// Each present section replaces the stored one wholesale.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SettingsUpdateRequest {
    pub theme: Option<String>,
    pub language: Option<String>,
    pub notifications: Option<NotificationPreferences>,
    pub display_preferences: Option<DisplayPreferences>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub department_id: Option<Uuid>,
    /// Include deactivated accounts.
    pub include_inactive: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_preferences_match_column_defaults() {
        let notifications: NotificationPreferences =
            serde_json::from_str(r#"{"email":true,"push":true,"task_reminders":true,"project_updates":true}"#).unwrap();
        let display: DisplayPreferences =
            serde_json::from_str(r#"{"compact_mode":false,"show_avatars":true,"default_view":"gantt"}"#).unwrap();

        assert_eq!(notifications, NotificationPreferences::default());
        assert_eq!(display, DisplayPreferences::default());
    }

    #[test]
    fn corrupt_settings_row_is_an_internal_error() {
        let row = DbUserSettings {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            theme: "dark".into(),
            language: "en".into(),
            notifications: "not json".into(),
            display_preferences: "{}".into(),
            updated_at: Utc::now(),
        };
        assert!(matches!(UserSettings::try_from(row), Err(AppError::Internal(_))));
    }
}

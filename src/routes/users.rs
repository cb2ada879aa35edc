use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::auth::{ensure_email_available, insert_user};
use super::{normalize_email, DepartmentFilter};
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Permission, Policy, Principal, RequireAccess, Role};
use crate::errors::{AppError, AppResult};
use crate::models::user::{
    DbUser, DbUserSettings, DisplayPreferences, ProfileUpdateRequest, SettingsUpdateRequest, User, UserCreateRequest,
    UserListQuery, UserSettings, UserUpdateRequest, SETTINGS_COLUMNS, USER_COLUMNS,
};
use crate::utils::{hash_password, utc_now, MIN_PASSWORD_LENGTH};
use crate::validation::Validator;

const ROLE_NAMES: &[&str] = &["viewer", "member", "manager", "department_admin", "admin"];

pub fn router(state: &AppState) -> Router<AppState> {
    let guard = |policy: Policy| RequireAccess::new(state, policy);

    Router::new()
        .route("/", get(list_users).route_layer(guard(Policy::permission(Permission::ViewUsers))))
        .route("/", post(create_user).route_layer(guard(Policy::permission(Permission::ManageUsers))))
        .route("/:user_id", get(get_user).route_layer(guard(Policy::permission(Permission::ViewUsers))))
        .route("/:user_id", put(update_user).route_layer(guard(Policy::permission(Permission::ManageUsers))))
        .route("/:user_id", delete(delete_user).route_layer(guard(Policy::permission(Permission::ManageUsers))))
}

/// The caller's own profile and settings, mounted at `/api/user`.
pub fn profile_router(state: &AppState) -> Router<AppState> {
    let authenticated = || RequireAccess::new(state, Policy::authenticated());

    Router::new()
        .route("/profile", get(get_profile).route_layer(authenticated()))
        .route("/profile", put(update_profile).route_layer(authenticated()))
        .route("/settings", get(get_settings).route_layer(authenticated()))
        .route("/settings", put(update_settings).route_layer(authenticated()))
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(UserListQuery),
    responses((status = 200, description = "Users", body = [User])),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<User>>> {
    let mut v = Validator::new();
    let role = query
        .role
        .as_deref()
        .and_then(|raw| v.parse_enum("role", raw, ROLE_NAMES, |s| s.parse::<Role>().ok()));
    v.finish()?;

    let filter = DepartmentFilter::for_principal(&principal);
    let include_inactive = query.include_inactive.unwrap_or(false);

    let users = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE deleted_at IS NULL \
           AND (? OR is_active = 1) \
           AND (? IS NULL OR role = ?) \
           AND (? IS NULL OR department_id = ?) \
           AND (? = 0 OR department_id = ?) \
         ORDER BY name, id"
    ))
    .bind(include_inactive)
    .bind(role.map(Role::as_str))
    .bind(role.map(Role::as_str))
    .bind(query.department_id)
    .bind(query.department_id)
    .bind(filter.scoped)
    .bind(filter.department_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(User::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 403, description = "Outside the caller's department"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user = fetch_user(&state.pool, user_id).await?;
    ensure_same_department(&principal, &user)?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing manage_users"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let mut v = Validator::new();
    v.string_length("name", &payload.name, 1, 100);
    v.email("email", &payload.email);
    if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        v.push("password", format!("must be at least {MIN_PASSWORD_LENGTH} characters"));
    }
    let role = match payload.role.as_deref() {
        Some(raw) => v.parse_enum("role", raw, ROLE_NAMES, |s| s.parse::<Role>().ok()),
        None => Some(Role::Member),
    };
    v.finish()?;
    let role = role.unwrap_or(Role::Member);

    if let Some(department_id) = payload.department_id {
        ensure_department_exists(&state.pool, department_id).await?;
    }
    let email = normalize_email(&payload.email);
    ensure_email_available(&state.pool, &email).await?;
    let password_hash = hash_password(&payload.password)?;

    let user_id = Uuid::new_v4();
    let mut tx = state.pool.begin().await?;

    insert_user(&mut tx, user_id, payload.name.trim(), &email, &password_hash, role, payload.department_id).await?;

    let entry = AuditEntry::new(Some(principal.id), "user", "created")
        .with_resource(user_id)
        .with_details(serde_json::json!({ "email": email, "role": role }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, role = %role, created_by = %principal.id, "user created");

    Ok((StatusCode::CREATED, Json(fetch_user(&state.pool, user_id).await?)))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Validation failed or self-demotion"),
        (status = 403, description = "Missing manage_users"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let mut user = fetch_user(&state.pool, user_id).await?;

    let mut v = Validator::new();
    v.optional_string_length("name", payload.name.as_deref(), 1, 100);
    let role = payload
        .role
        .as_deref()
        .and_then(|raw| v.parse_enum("role", raw, ROLE_NAMES, |s| s.parse::<Role>().ok()));
    if user.id == principal.id {
        if role.is_some_and(|role| role != user.role) {
            v.push("role", "cannot change your own role");
        }
        if payload.is_active == Some(false) {
            v.push("is_active", "cannot deactivate your own account");
        }
    }
    v.finish()?;

    if let Some(Some(department_id)) = payload.department_id {
        ensure_department_exists(&state.pool, department_id).await?;
    }

    let previous_role = user.role;
    if let Some(name) = payload.name.as_deref() {
        user.name = name.trim().to_string();
    }
    if let Some(role) = role {
        user.role = role;
    }
    if let Some(active) = payload.is_active {
        user.is_active = active;
    }
    if let Some(department_id) = payload.department_id {
        user.department_id = department_id;
    }
    user.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE users SET name = ?, role = ?, is_active = ?, department_id = ?, updated_at = ? WHERE id = ?")
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.department_id)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    // A demoted department admin no longer administers anything.
    if previous_role == Role::DepartmentAdmin && user.role != Role::DepartmentAdmin {
        sqlx::query("UPDATE departments SET admin_id = NULL WHERE admin_id = ?")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
    }

    let entry = AuditEntry::for_entity(Some(principal.id), "updated", &user)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    if previous_role != user.role {
        tracing::info!(user_id = %user.id, from = %previous_role, to = %user.role, "user role changed");
    }

    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deactivated and removed"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let user = fetch_user(&state.pool, user_id).await?;
    if user.id == principal.id {
        return Err(AppError::bad_request("cannot delete your own account"));
    }

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE users SET is_active = 0, deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE departments SET admin_id = NULL, updated_at = ? WHERE admin_id = ?")
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "deleted", &user)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "user soft-deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/user/profile",
    tag = "Profile",
    responses(
        (status = 200, description = "The caller's profile", body = User),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_profile(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> AppResult<Json<User>> {
    Ok(Json(fetch_user(&state.pool, principal.id).await?))
}

#[utoipa::path(
    put,
    path = "/api/user/profile",
    tag = "Profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<ProfileUpdateRequest>,
) -> AppResult<Json<User>> {
    let mut user = fetch_user(&state.pool, principal.id).await?;

    let mut v = Validator::new();
    v.optional_string_length("name", payload.name.as_deref(), 1, 100);
    if let Some(email) = payload.email.as_deref() {
        v.email("email", email);
    }
    if let Some(Some(phone)) = &payload.phone {
        v.string_length("phone", phone, 1, 32);
    }
    v.optional_string_length("timezone", payload.timezone.as_deref(), 1, 64);
    v.finish()?;

    let previous_email = user.email.clone();
    if let Some(email) = payload.email.as_deref() {
        let email = normalize_email(email);
        if email != user.email {
            ensure_email_available(&state.pool, &email).await?;
            user.email = email;
        }
    }
    if let Some(name) = payload.name.as_deref() {
        user.name = name.trim().to_string();
    }
    if let Some(phone) = payload.phone {
        user.phone = phone.map(|p| p.trim().to_string());
    }
    if let Some(timezone) = payload.timezone.as_deref() {
        user.timezone = timezone.trim().to_string();
    }
    user.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE users SET name = ?, email = ?, phone = ?, timezone = ?, updated_at = ? WHERE id = ?")
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.timezone)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    let mut entry = AuditEntry::new(Some(principal.id), "user", "profile_updated")
        .with_resource(user.id)
        .with_context(RequestContext::from_headers(&headers));
    if previous_email != user.email {
        entry = entry.with_details(serde_json::json!({ "email": { "from": previous_email, "to": user.email } }));
    }
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(Json(user))
}

#[utoipa::path(
    get,
    path = "/api/user/settings",
    tag = "Profile",
    responses(
        (status = 200, description = "The caller's settings, created with defaults on first read", body = UserSettings),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_settings(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<UserSettings>> {
    Ok(Json(load_settings(&state.pool, principal.id).await?))
}

#[utoipa::path(
    put,
    path = "/api/user/settings",
    tag = "Profile",
    request_body = SettingsUpdateRequest,
    responses(
        (status = 200, description = "Settings updated", body = UserSettings),
        (status = 400, description = "Validation failed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<SettingsUpdateRequest>,
) -> AppResult<Json<UserSettings>> {
    let mut v = Validator::new();
    if let Some(theme) = payload.theme.as_deref() {
        v.parse_enum("theme", theme, UserSettings::THEMES, |s| UserSettings::THEMES.contains(&s).then_some(()));
    }
    v.optional_string_length("language", payload.language.as_deref(), 2, 10);
    if let Some(display) = &payload.display_preferences {
        v.parse_enum("display_preferences.default_view", &display.default_view, DisplayPreferences::VIEWS, |s| {
            DisplayPreferences::VIEWS.contains(&s).then_some(())
        });
    }
    v.finish()?;

    let mut settings = load_settings(&state.pool, principal.id).await?;
    if let Some(theme) = payload.theme {
        settings.theme = theme;
    }
    if let Some(language) = payload.language {
        settings.language = language.trim().to_string();
    }
    if let Some(notifications) = payload.notifications {
        settings.notifications = notifications;
    }
    if let Some(display) = payload.display_preferences {
        settings.display_preferences = display;
    }
    settings.updated_at = utc_now();

    let notifications = serde_json::to_string(&settings.notifications)
        .map_err(|err| AppError::internal(format!("failed to encode settings: {err}")))?;
    let display = serde_json::to_string(&settings.display_preferences)
        .map_err(|err| AppError::internal(format!("failed to encode settings: {err}")))?;

    sqlx::query(
        "UPDATE user_settings SET theme = ?, language = ?, notifications = ?, display_preferences = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(&settings.theme)
    .bind(&settings.language)
    .bind(notifications)
    .bind(display)
    .bind(settings.updated_at)
    .bind(principal.id)
    .execute(&state.pool)
    .await?;

    Ok(Json(settings))
}

/// Settings row for `user_id`, inserting the defaults when none exists yet.
async fn load_settings(pool: &SqlitePool, user_id: Uuid) -> AppResult<UserSettings> {
    let now = utc_now();
    sqlx::query("INSERT OR IGNORE INTO user_settings (id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    let row = sqlx::query_as::<_, DbUserSettings>(&format!(
        "SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE user_id = ?"
    ))
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    UserSettings::try_from(row)
}

/// Department admins only see accounts in their own department.
fn ensure_same_department(principal: &Principal, user: &User) -> AppResult<()> {
    if principal.role != Role::DepartmentAdmin || principal.id == user.id {
        return Ok(());
    }
    match principal.department_id {
        Some(own) if user.department_id == Some(own) => Ok(()),
        _ => Err(AppError::access_denied("user is outside your department")),
    }
}

async fn ensure_department_exists(pool: &SqlitePool, department_id: Uuid) -> AppResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM departments WHERE id = ?")
        .bind(department_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| AppError::validation("department_id", "must reference an existing department"))
}

/// Live (not soft-deleted) user by id.
pub(crate) async fn fetch_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<User> {
    fetch_db_user(pool, user_id).await.and_then(User::try_from)
}

pub(crate) async fn fetch_db_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_cover_every_role() {
        for role in Role::ALL {
            assert!(ROLE_NAMES.contains(&role.as_str()));
        }
        assert_eq!(ROLE_NAMES.len(), Role::ALL.len());
    }

    fn user_in(department_id: Option<Uuid>) -> User {
        let now = chrono::Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Someone".into(),
            email: "someone@example.com".into(),
            role: Role::Member,
            department_id,
            is_active: true,
            phone: None,
            timezone: "UTC".into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn department_admin_reads_only_own_department() {
        let own = Uuid::new_v4();
        let dept_admin = Principal::new(Uuid::new_v4(), Role::DepartmentAdmin).in_department(own);

        assert!(ensure_same_department(&dept_admin, &user_in(Some(own))).is_ok());
        let err = ensure_same_department(&dept_admin, &user_in(Some(Uuid::new_v4()))).unwrap_err();
        assert_eq!(err.kind(), "access_denied");
        assert!(ensure_same_department(&dept_admin, &user_in(None)).is_err());

        let admin = Principal::new(Uuid::new_v4(), Role::Admin);
        assert!(ensure_same_department(&admin, &user_in(None)).is_ok());
    }
}

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Permission, Policy, RequireAccess, Role};
use crate::errors::{AppError, AppResult};
use crate::models::department::{
    AssignAdminRequest, Department, DepartmentCreateRequest, DepartmentUpdateRequest, DEPARTMENT_COLUMNS,
};
use crate::models::user::{DbUser, USER_COLUMNS};
use crate::utils::utc_now;
use crate::validation::Validator;

pub fn router(state: &AppState) -> Router<AppState> {
    let guard = |policy: Policy| RequireAccess::new(state, policy);
    let manage = || Policy::permission(Permission::ManageDepartments);

    Router::new()
        .route("/", get(list_departments).route_layer(guard(Policy::authenticated())))
        .route("/", post(create_department).route_layer(guard(manage())))
        .route("/:department_id", get(get_department).route_layer(guard(manage())))
        .route("/:department_id", put(update_department).route_layer(guard(manage())))
        .route("/:department_id", delete(delete_department).route_layer(guard(manage())))
        .route("/:department_id/admin", put(assign_admin).route_layer(guard(manage())))
}

#[utoipa::path(
    get,
    path = "/api/departments",
    tag = "Departments",
    responses((status = 200, description = "All departments", body = [Department])),
    security(("bearerAuth" = []))
)]
pub async fn list_departments(State(state): State<AppState>) -> AppResult<Json<Vec<Department>>> {
    let departments =
        sqlx::query_as::<_, Department>(&format!("SELECT {DEPARTMENT_COLUMNS} FROM departments ORDER BY name, id"))
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(departments))
}

#[utoipa::path(
    get,
    path = "/api/departments/{department_id}",
    tag = "Departments",
    params(("department_id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department", body = Department),
        (status = 403, description = "Missing manage_departments"),
        (status = 404, description = "Department not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_department(
    State(state): State<AppState>,
    Path(department_id): Path<Uuid>,
) -> AppResult<Json<Department>> {
    Ok(Json(fetch_department(&state.pool, department_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/departments",
    tag = "Departments",
    request_body = DepartmentCreateRequest,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Name already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_department(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<DepartmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Department>)> {
    let mut v = Validator::new();
    v.string_length("name", &payload.name, 1, 100);
    v.optional_string_length("description", payload.description.as_deref(), 0, 500);
    v.finish()?;

    let name = payload.name.trim().to_string();
    ensure_name_free(&state.pool, &name, None).await?;

    let now = utc_now();
    let department = Department {
        id: Uuid::new_v4(),
        name,
        description: payload.description,
        admin_id: None,
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO departments (id, name, description, admin_id, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, ?)",
    )
    .bind(department.id)
    .bind(&department.name)
    .bind(&department.description)
    .bind(department.created_at)
    .bind(department.updated_at)
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "created", &department)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(department_id = %department.id, "department created");

    Ok((StatusCode::CREATED, Json(department)))
}

#[utoipa::path(
    put,
    path = "/api/departments/{department_id}",
    tag = "Departments",
    params(("department_id" = Uuid, Path, description = "Department id")),
    request_body = DepartmentUpdateRequest,
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Name already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_department(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(department_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DepartmentUpdateRequest>,
) -> AppResult<Json<Department>> {
    let mut department = fetch_department(&state.pool, department_id).await?;

    let mut v = Validator::new();
    v.optional_string_length("name", payload.name.as_deref(), 1, 100);
    v.optional_string_length("description", payload.description.as_deref(), 0, 500);
    v.finish()?;

    if let Some(name) = payload.name.as_deref() {
        let name = name.trim().to_string();
        ensure_name_free(&state.pool, &name, Some(department.id)).await?;
        department.name = name;
    }
    if payload.description.is_some() {
        department.description = payload.description;
    }
    department.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE departments SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&department.name)
        .bind(&department.description)
        .bind(department.updated_at)
        .bind(department.id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "updated", &department)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(Json(department))
}

#[utoipa::path(
    delete,
    path = "/api/departments/{department_id}",
    tag = "Departments",
    params(("department_id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 204, description = "Department deleted; users and members keep no department"),
        (status = 404, description = "Department not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_department(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(department_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let department = fetch_department(&state.pool, department_id).await?;

    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(department.id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "deleted", &department)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/departments/{department_id}/admin",
    tag = "Departments",
    params(("department_id" = Uuid, Path, description = "Department id")),
    request_body = AssignAdminRequest,
    responses(
        (status = 200, description = "Admin assigned", body = Department),
        (status = 400, description = "Unknown or inactive user"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "User already administers another department")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_admin(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(department_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AssignAdminRequest>,
) -> AppResult<Json<Department>> {
    let department = fetch_department(&state.pool, department_id).await?;

    let user = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL AND is_active = 1"
    ))
    .bind(payload.user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::validation("user_id", "must reference an active user"))?;

    let administered: Option<Uuid> = sqlx::query_scalar("SELECT id FROM departments WHERE admin_id = ? AND id != ?")
        .bind(user.id)
        .bind(department.id)
        .fetch_optional(&state.pool)
        .await?;
    if administered.is_some() {
        return Err(AppError::conflict("user already administers another department"));
    }

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    if let Some(previous) = department.admin_id.filter(|id| *id != user.id) {
        sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ? AND role = ?")
            .bind(Role::Manager.as_str())
            .bind(now)
            .bind(previous)
            .bind(Role::DepartmentAdmin.as_str())
            .execute(&mut *tx)
            .await?;
    }

    // System admins keep their role.
    let role = if Role::from_stored(&user.role) == Role::Admin {
        Role::Admin
    } else {
        Role::DepartmentAdmin
    };
    sqlx::query("UPDATE users SET role = ?, department_id = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(department.id)
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE departments SET admin_id = ?, updated_at = ? WHERE id = ?")
        .bind(user.id)
        .bind(now)
        .bind(department.id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::new(Some(principal.id), "department", "admin_assigned")
        .with_resource(department.id)
        .with_details(serde_json::json!({ "user_id": user.id, "previous_admin_id": department.admin_id }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(department_id = %department.id, user_id = %user.id, "department admin assigned");

    Ok(Json(fetch_department(&state.pool, department.id).await?))
}

async fn fetch_department(pool: &SqlitePool, department_id: Uuid) -> AppResult<Department> {
    sqlx::query_as::<_, Department>(&format!("SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE id = ?"))
        .bind(department_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("department not found"))
}

async fn ensure_name_free(pool: &SqlitePool, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM departments WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    match existing {
        Some(id) if Some(id) != except => Err(AppError::conflict("department name already in use")),
        _ => Ok(()),
    }
}

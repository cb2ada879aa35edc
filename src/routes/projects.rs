use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{share, DepartmentFilter};
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Permission, Policy, Relationship, RequireAccess, ScopeTarget};
use crate::errors::{AppError, AppResult};
use crate::models::project::{
    derived_progress, DbProject, Project, ProjectCreateRequest, ProjectListQuery, ProjectMemberRequest,
    ProjectStatus, ProjectUpdateRequest, PROJECT_COLUMNS,
};
use crate::models::task::{DbTask, Task, TASK_COLUMNS};
use crate::models::team_member::{DbTeamMember, TeamMember, MEMBER_COLUMNS};
use crate::models::PageQuery;
use crate::utils::utc_now;
use crate::validation::Validator;

const DEFAULT_COLOR: &str = "#3B82F6";

pub fn router(state: &AppState) -> Router<AppState> {
    let guard = |policy: Policy| RequireAccess::new(state, policy);
    let view = || Policy::permission(Permission::ViewProjects).scoped(ScopeTarget::Project);
    let manage = || Policy::relationship(Relationship::project()).scoped(ScopeTarget::Project);

    Router::new()
        .route("/", get(list_projects).route_layer(guard(Policy::permission(Permission::ViewProjects))))
        .route("/", post(create_project).route_layer(guard(Policy::permission(Permission::CreateProjects))))
        .route("/:project_id", get(get_project).route_layer(guard(view())))
        .route("/:project_id", put(update_project).route_layer(guard(manage())))
        .route("/:project_id", delete(delete_project).route_layer(guard(Policy::permission(Permission::DeleteProjects))))
        .route(
            "/:project_id/tasks",
            get(list_project_tasks)
                .route_layer(guard(Policy::permission(Permission::ViewTasks).scoped(ScopeTarget::Project))),
        )
        .route("/:project_id/members", get(list_project_members).route_layer(guard(view())))
        .route("/:project_id/members", post(add_project_member).route_layer(guard(manage())))
        .route("/:project_id/members/:member_id", delete(remove_project_member).route_layer(guard(manage())))
        .route("/:project_id/share-links", get(share::list_share_links).route_layer(guard(manage())))
        .route("/:project_id/share-links", post(share::create_share_link).route_layer(guard(manage())))
}

#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "Projects",
    params(ProjectListQuery),
    responses(
        (status = 200, description = "List projects", body = [Project]),
        (status = 403, description = "Missing view_projects")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<ProjectListQuery>,
) -> AppResult<Json<Vec<Project>>> {
    let mut v = Validator::new();
    let status = query
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, ProjectStatus::ALLOWED, ProjectStatus::parse));
    v.finish()?;

    let filter = DepartmentFilter::for_principal(&principal);
    let (limit, offset) = PageQuery { page: query.page, per_page: query.per_page }.limit_offset();

    let rows = sqlx::query_as::<_, DbProject>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects \
         WHERE (? IS NULL OR status = ?) \
           AND (? = 0 OR owner_id IN (SELECT id FROM users WHERE department_id = ?)) \
         ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
    ))
    .bind(status.map(ProjectStatus::as_str))
    .bind(status.map(ProjectStatus::as_str))
    .bind(filter.scoped)
    .bind(filter.department_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let mut projects = Vec::with_capacity(rows.len());
    for row in rows {
        let mut project = Project::try_from(row)?;
        project.member_ids = member_ids(&state.pool, project.id).await?;
        projects.push(project);
    }

    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing create_projects")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let mut v = Validator::new();
    v.string_length("name", &payload.name, 1, 200);
    v.optional_string_length("description", payload.description.as_deref(), 0, 2000);
    if let Some(color) = payload.color.as_deref() {
        v.hex_color("color", color);
    }
    let status = match payload.status.as_deref() {
        Some(raw) => v.parse_enum("status", raw, ProjectStatus::ALLOWED, ProjectStatus::parse),
        None => Some(ProjectStatus::Planning),
    };
    v.date_order("start_date", payload.start_date, "end_date", payload.end_date);
    v.finish()?;
    let status = status.unwrap_or(ProjectStatus::Planning);

    ensure_members_exist(&state.pool, &payload.member_ids).await?;

    let now = utc_now();
    let project_id = Uuid::new_v4();
    let color = payload.color.as_deref().unwrap_or(DEFAULT_COLOR);

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, name, description, color, status, progress, start_date, end_date, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(color)
    .bind(status.as_str())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(principal.id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for member_id in &payload.member_ids {
        sqlx::query("INSERT OR IGNORE INTO project_members (project_id, team_member_id, joined_at) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(member_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    let entry = AuditEntry::new(Some(principal.id), "project", "created")
        .with_resource(project_id)
        .with_details(serde_json::json!({ "name": payload.name.trim(), "members": payload.member_ids.len() }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(project_id = %project_id, owner_id = %principal.id, "project created");

    let project = fetch_project(&state.pool, project_id).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 403, description = "Outside the caller's department"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(State(state): State<AppState>, Path(project_id): Path<Uuid>) -> AppResult<Json<Project>> {
    Ok(Json(fetch_project(&state.pool, project_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the owner or a manager"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let mut project = fetch_project(&state.pool, project_id).await?;

    let mut v = Validator::new();
    if let Some(name) = payload.name.as_deref() {
        v.string_length("name", name, 1, 200);
    }
    v.optional_string_length("description", payload.description.as_deref(), 0, 2000);
    if let Some(color) = payload.color.as_deref() {
        v.hex_color("color", color);
    }
    let status = payload
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, ProjectStatus::ALLOWED, ProjectStatus::parse));
    let start_date = payload.start_date.unwrap_or(project.start_date);
    let end_date = payload.end_date.unwrap_or(project.end_date);
    v.date_order("start_date", start_date, "end_date", end_date);
    if let Some(progress) = payload.progress {
        v.range("progress", progress, 0, 100);
        if task_count(&state.pool, project_id).await? > 0 {
            v.push("progress", "is derived from tasks once the project has any");
        }
    }
    v.finish()?;

    if let Some(name) = payload.name.as_deref() {
        project.name = name.trim().to_string();
    }
    if payload.description.is_some() {
        project.description = payload.description.clone();
    }
    if let Some(color) = payload.color {
        project.color = color;
    }
    if let Some(status) = status {
        project.status = status;
    }
    if let Some(progress) = payload.progress {
        project.progress = progress;
    }
    project.start_date = start_date;
    project.end_date = end_date;
    project.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE projects SET name = ?, description = ?, color = ?, status = ?, progress = ?, start_date = ?, end_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.color)
    .bind(project.status.as_str())
    .bind(project.progress)
    .bind(project.start_date)
    .bind(project.end_date)
    .bind(project.updated_at)
    .bind(project.id)
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "updated", &project)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project and its tasks deleted"),
        (status = 403, description = "Missing delete_projects"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let project = fetch_project(&state.pool, project_id).await?;

    let mut tx = state.pool.begin().await?;

    let affected = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("project not found"));
    }

    let entry = AuditEntry::for_entity(Some(principal.id), "deleted", &project)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(project_id = %project_id, "project deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/tasks",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Tasks of the project", body = [Task]),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    ensure_project_exists(&state.pool, project_id).await?;

    let tasks = sqlx::query_as::<_, DbTask>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? ORDER BY start_date, created_at, id"
    ))
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(Task::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(tasks))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/members",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project members", body = [TeamMember]),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_project_members(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<TeamMember>>> {
    ensure_project_exists(&state.pool, project_id).await?;

    let members = sqlx::query_as::<_, DbTeamMember>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM team_members \
         WHERE id IN (SELECT team_member_id FROM project_members WHERE project_id = ?) \
         ORDER BY name, id"
    ))
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(TeamMember::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/members",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ProjectMemberRequest,
    responses(
        (status = 201, description = "Member added", body = Project),
        (status = 404, description = "Project or team member not found"),
        (status = 409, description = "Already a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_project_member(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ProjectMemberRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    ensure_members_exist(&state.pool, std::slice::from_ref(&payload.team_member_id)).await?;

    let mut tx = state.pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO project_members (project_id, team_member_id, joined_at) VALUES (?, ?, ?)",
    )
    .bind(project_id)
    .bind(payload.team_member_id)
    .bind(utc_now())
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(AppError::conflict("team member is already on this project"));
    }

    let entry = AuditEntry::new(Some(principal.id), "project", "member_added")
        .with_resource(project_id)
        .with_details(serde_json::json!({ "team_member_id": payload.team_member_id }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    let project = fetch_project(&state.pool, project_id).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}/members/{member_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("member_id" = Uuid, Path, description = "Team member id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 404, description = "Not a member of the project")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_project_member(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let mut tx = state.pool.begin().await?;

    let removed = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND team_member_id = ?")
        .bind(project_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;
    if removed.rows_affected() == 0 {
        return Err(AppError::not_found("team member is not on this project"));
    }

    let entry = AuditEntry::new(Some(principal.id), "project", "member_removed")
        .with_resource(project_id)
        .with_details(serde_json::json!({ "team_member_id": member_id }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<Project> {
    let row = sqlx::query_as::<_, DbProject>(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    let mut project = Project::try_from(row)?;
    project.member_ids = member_ids(pool, project_id).await?;
    Ok(project)
}

pub(crate) async fn ensure_project_exists(pool: &SqlitePool, project_id: Uuid) -> AppResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("project not found"))
}

/// Re-derives a project's progress from its tasks. Zero once no tasks remain.
pub(crate) async fn sync_progress(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<i64> {
    let task_progress: Vec<i64> = sqlx::query_scalar("SELECT progress FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;

    let progress = derived_progress(&task_progress).unwrap_or(0);

    sqlx::query("UPDATE projects SET progress = ?, updated_at = ? WHERE id = ?")
        .bind(progress)
        .bind(utc_now())
        .bind(project_id)
        .execute(&mut *conn)
        .await?;

    tracing::debug!(project_id = %project_id, progress, "project progress re-derived");

    Ok(progress)
}

async fn member_ids(pool: &SqlitePool, project_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT team_member_id FROM project_members WHERE project_id = ? ORDER BY joined_at, team_member_id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

async fn task_count(pool: &SqlitePool, project_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(1) FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn ensure_members_exist(pool: &SqlitePool, member_ids: &[Uuid]) -> AppResult<()> {
    for member_id in member_ids {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM team_members WHERE id = ?")
            .bind(member_id)
            .fetch_optional(pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::not_found(format!("team member {member_id} not found")));
        }
    }
    Ok(())
}

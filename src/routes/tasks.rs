use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::projects::{ensure_project_exists, sync_progress};
use super::DepartmentFilter;
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{
    CurrentPrincipal, Permission, Policy, Principal, Relationship, RequireAccess, ResourceRefs, Rule, ScopeTarget,
};
use crate::errors::{AppError, AppResult};
use crate::models::task::{
    couple_status_progress, DbTask, Priority, Task, TaskCreateRequest, TaskListQuery, TaskProgressRequest,
    TaskStatus, TaskStatusRequest, TaskUpdateRequest, TASK_COLUMNS,
};
use crate::models::PageQuery;
use crate::utils::utc_now;
use crate::validation::Validator;

pub fn router(state: &AppState) -> Router<AppState> {
    let guard = |policy: Policy| RequireAccess::new(state, policy);
    // Assignee or project member may edit; managers and above bypass.
    let edit = || {
        Policy::permission(Permission::EditTasks)
            .then(Rule::Relationship(Relationship::task().assignee().members()))
            .scoped(ScopeTarget::Task)
    };

    Router::new()
        .route("/", get(list_tasks).route_layer(guard(Policy::permission(Permission::ViewTasks))))
        .route("/", post(create_task).route_layer(guard(Policy::permission(Permission::CreateTasks))))
        .route(
            "/:task_id",
            get(get_task).route_layer(guard(Policy::permission(Permission::ViewTasks).scoped(ScopeTarget::Task))),
        )
        .route("/:task_id", put(update_task).route_layer(guard(edit())))
        .route(
            "/:task_id",
            delete(delete_task).route_layer(guard(Policy::permission(Permission::DeleteTasks).scoped(ScopeTarget::Task))),
        )
        .route("/:task_id/status", patch(update_task_status).route_layer(guard(edit())))
        .route("/:task_id/progress", patch(update_task_progress).route_layer(guard(edit())))
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "Tasks",
    params(TaskListQuery),
    responses((status = 200, description = "List tasks", body = [Task])),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let mut v = Validator::new();
    let status = query
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, TaskStatus::ALLOWED, TaskStatus::parse));
    let priority = query
        .priority
        .as_deref()
        .and_then(|raw| v.parse_enum("priority", raw, Priority::ALLOWED, Priority::parse));
    v.finish()?;

    let filter = DepartmentFilter::for_principal(&principal);
    let (limit, offset) = PageQuery { page: query.page, per_page: query.per_page }.limit_offset();

    let tasks = sqlx::query_as::<_, DbTask>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE (? IS NULL OR project_id = ?) \
           AND (? IS NULL OR status = ?) \
           AND (? IS NULL OR assignee_id = ?) \
           AND (? IS NULL OR priority = ?) \
           AND (? = 0 OR project_id IN ( \
                SELECT p.id FROM projects p JOIN users u ON u.id = p.owner_id WHERE u.department_id = ?)) \
         ORDER BY end_date, created_at, id LIMIT ? OFFSET ?"
    ))
    .bind(query.project_id)
    .bind(query.project_id)
    .bind(status.map(TaskStatus::as_str))
    .bind(status.map(TaskStatus::as_str))
    .bind(query.assignee_id)
    .bind(query.assignee_id)
    .bind(priority.map(Priority::as_str))
    .bind(priority.map(Priority::as_str))
    .bind(filter.scoped)
    .bind(filter.department_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(Task::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "Tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing create_tasks, or assigning without assign_tasks"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    // The project comes from the body, so containment is checked here.
    state
        .evaluator
        .evaluate(
            &principal,
            &Policy::authenticated().scoped(ScopeTarget::Project),
            &ResourceRefs::project(payload.project_id),
        )
        .await?
        .into_result()?;
    ensure_project_exists(&state.pool, payload.project_id).await?;

    let mut v = Validator::new();
    v.string_length("name", &payload.name, 1, 200);
    v.optional_string_length("description", payload.description.as_deref(), 0, 2000);
    v.date_order("start_date", payload.start_date, "end_date", payload.end_date);
    let status = payload
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, TaskStatus::ALLOWED, TaskStatus::parse));
    let priority = match payload.priority.as_deref() {
        Some(raw) => v.parse_enum("priority", raw, Priority::ALLOWED, Priority::parse),
        None => Some(Priority::Medium),
    };
    if let Some(progress) = payload.progress {
        v.range("progress", progress, 0, 100);
    }
    v.finish()?;

    let (status, progress) = couple_status_progress(TaskStatus::Todo, 0, status, payload.progress)?;
    if let Some(assignee_id) = payload.assignee_id {
        check_assignment(&state.pool, &principal, assignee_id).await?;
    }

    let now = utc_now();
    let task = Task {
        id: Uuid::new_v4(),
        project_id: payload.project_id,
        name: payload.name.trim().to_string(),
        description: payload.description,
        start_date: payload.start_date,
        end_date: payload.end_date,
        status,
        priority: priority.unwrap_or(Priority::Medium),
        progress,
        assignee_id: payload.assignee_id,
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO tasks (id, project_id, name, description, start_date, end_date, status, priority, progress, assignee_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task.id)
    .bind(task.project_id)
    .bind(&task.name)
    .bind(&task.description)
    .bind(task.start_date)
    .bind(task.end_date)
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(task.progress)
    .bind(task.assignee_id)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut *tx)
    .await?;

    sync_progress(&mut tx, task.project_id).await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "created", &task)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(task_id = %task.id, project_id = %task.project_id, "task created");

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task detail", body = Task),
        (status = 403, description = "Outside the caller's department"),
        (status = 404, description = "Task not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_task(State(state): State<AppState>, Path(task_id): Path<Uuid>) -> AppResult<Json<Task>> {
    Ok(Json(fetch_task(&state.pool, task_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the assignee, a project member or a manager"),
        (status = 404, description = "Task not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let mut task = fetch_task(&state.pool, task_id).await?;

    let mut v = Validator::new();
    if let Some(name) = payload.name.as_deref() {
        v.string_length("name", name, 1, 200);
    }
    v.optional_string_length("description", payload.description.as_deref(), 0, 2000);
    let start_date = payload.start_date.unwrap_or(task.start_date);
    let end_date = payload.end_date.unwrap_or(task.end_date);
    v.date_order("start_date", start_date, "end_date", end_date);
    let status = payload
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, TaskStatus::ALLOWED, TaskStatus::parse));
    let priority = payload
        .priority
        .as_deref()
        .and_then(|raw| v.parse_enum("priority", raw, Priority::ALLOWED, Priority::parse));
    if let Some(progress) = payload.progress {
        v.range("progress", progress, 0, 100);
    }
    v.finish()?;

    let (status, progress) = couple_status_progress(task.status, task.progress, status, payload.progress)?;

    if let Some(assignee_id) = payload.assignee_id {
        if assignee_id != task.assignee_id {
            match assignee_id {
                Some(member_id) => check_assignment(&state.pool, &principal, member_id).await?,
                None if principal.has_permission(Permission::AssignTasks) => {}
                None => return Err(AppError::insufficient_permission("requires permission 'assign_tasks'")),
            }
            task.assignee_id = assignee_id;
        }
    }

    if let Some(name) = payload.name.as_deref() {
        task.name = name.trim().to_string();
    }
    if payload.description.is_some() {
        task.description = payload.description;
    }
    if let Some(priority) = priority {
        task.priority = priority;
    }
    task.start_date = start_date;
    task.end_date = end_date;
    task.status = status;
    task.progress = progress;

    persist(&state, &principal, &mut task, &headers, "updated").await?;

    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{task_id}/status",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    request_body = TaskStatusRequest,
    responses(
        (status = 200, description = "Status changed; progress follows", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Task not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task_status(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<TaskStatusRequest>,
) -> AppResult<Json<Task>> {
    let mut task = fetch_task(&state.pool, task_id).await?;

    let mut v = Validator::new();
    let status = v.parse_enum("status", &payload.status, TaskStatus::ALLOWED, TaskStatus::parse);
    v.finish()?;

    let (status, progress) = couple_status_progress(task.status, task.progress, status, None)?;
    task.status = status;
    task.progress = progress;

    persist(&state, &principal, &mut task, &headers, "status_changed").await?;

    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{task_id}/progress",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    request_body = TaskProgressRequest,
    responses(
        (status = 200, description = "Progress changed; status follows", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Task not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task_progress(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<TaskProgressRequest>,
) -> AppResult<Json<Task>> {
    let mut task = fetch_task(&state.pool, task_id).await?;

    let mut v = Validator::new();
    v.range("progress", payload.progress, 0, 100);
    v.finish()?;

    let (status, progress) = couple_status_progress(task.status, task.progress, None, Some(payload.progress))?;
    task.status = status;
    task.progress = progress;

    persist(&state, &principal, &mut task, &headers, "progress_changed").await?;

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Missing delete_tasks"),
        (status = 404, description = "Task not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let task = fetch_task(&state.pool, task_id).await?;

    let mut tx = state.pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task.id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::not_found("task not found"));
    }

    sync_progress(&mut tx, task.project_id).await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "deleted", &task)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_task(pool: &SqlitePool, task_id: Uuid) -> AppResult<Task> {
    let row = sqlx::query_as::<_, DbTask>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;
    Task::try_from(row)
}

/// Writes every mutable field, then re-derives the project's progress in the
/// same transaction.
async fn persist(state: &AppState, principal: &Principal, task: &mut Task, headers: &HeaderMap, verb: &str) -> AppResult<()> {
    task.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE tasks SET name = ?, description = ?, start_date = ?, end_date = ?, status = ?, priority = ?, progress = ?, assignee_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&task.name)
    .bind(&task.description)
    .bind(task.start_date)
    .bind(task.end_date)
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(task.progress)
    .bind(task.assignee_id)
    .bind(task.updated_at)
    .bind(task.id)
    .execute(&mut *tx)
    .await?;

    sync_progress(&mut tx, task.project_id).await?;

    let entry = AuditEntry::for_entity(Some(principal.id), verb, &*task)
        .with_details(serde_json::json!({ "status": task.status, "progress": task.progress }))
        .with_context(RequestContext::from_headers(headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(())
}

/// Self-assignment is always allowed; assigning anyone else needs `assign_tasks`.
async fn check_assignment(pool: &SqlitePool, principal: &Principal, assignee_id: Uuid) -> AppResult<()> {
    ensure_member(pool, assignee_id).await?;

    if principal.has_permission(Permission::AssignTasks) {
        return Ok(());
    }
    let own: Option<Uuid> = sqlx::query_scalar("SELECT id FROM team_members WHERE user_id = ?")
        .bind(principal.id)
        .fetch_optional(pool)
        .await?;
    if own == Some(assignee_id) {
        Ok(())
    } else {
        Err(AppError::insufficient_permission("requires permission 'assign_tasks'"))
    }
}

async fn ensure_member(pool: &SqlitePool, member_id: Uuid) -> AppResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM team_members WHERE id = ?")
        .bind(member_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| AppError::validation("assignee_id", "must reference an existing team member"))
}

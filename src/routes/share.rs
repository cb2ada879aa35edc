use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Duration;
use uuid::Uuid;

use super::projects::fetch_project;
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Policy, RequireAccess};
use crate::errors::{AppError, AppResult};
use crate::models::invite::{MAX_EXPIRY_DAYS, MIN_EXPIRY_DAYS};
use crate::models::share_link::{
    DbShareLink, ShareLink, ShareLinkCreateRequest, ShareLinkCreatedResponse, SharedMember, SharedProjectView,
    SHARE_LINK_COLUMNS,
};
use crate::models::task::{DbTask, Task, TASK_COLUMNS};
use crate::utils::{generate_token, token_digest, utc_now};
use crate::validation::Validator;

/// `/api/share-links` (authenticated management) and `/api/share` (public).
pub fn links_router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/:link_id",
        delete(revoke_share_link).route_layer(RequireAccess::new(state, Policy::authenticated())),
    )
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/:token", get(view_shared_project))
}

#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/share-links",
    tag = "Share links",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ShareLinkCreateRequest,
    responses(
        (status = 201, description = "Share link created; the token is only returned here", body = ShareLinkCreatedResponse),
        (status = 400, description = "Expiry out of range"),
        (status = 403, description = "Not the owner or a manager"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_share_link(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Option<Json<ShareLinkCreateRequest>>,
) -> AppResult<(StatusCode, Json<ShareLinkCreatedResponse>)> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let days = payload.expires_in_days.unwrap_or(state.config.share_link_expiry_days);

    let mut v = Validator::new();
    v.range("expires_in_days", days, MIN_EXPIRY_DAYS, MAX_EXPIRY_DAYS);
    v.finish()?;

    let token = generate_token();
    let now = utc_now();
    let link = DbShareLink {
        id: Uuid::new_v4(),
        project_id,
        token_hash: token_digest(&token),
        expires_at: now + Duration::days(days),
        created_by: Some(principal.id),
        revoked_at: None,
        created_at: now,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO share_links (id, project_id, token_hash, expires_at, created_by, revoked_at, created_at) VALUES (?, ?, ?, ?, ?, NULL, ?)",
    )
    .bind(link.id)
    .bind(link.project_id)
    .bind(&link.token_hash)
    .bind(link.expires_at)
    .bind(link.created_by)
    .bind(link.created_at)
    .execute(&mut *tx)
    .await?;

    let link = ShareLink::try_from(link)?;
    let entry = AuditEntry::for_entity(Some(principal.id), "created", &link)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(link_id = %link.id, project_id = %project_id, "share link created");

    let path = format!("/api/share/{token}");
    Ok((StatusCode::CREATED, Json(ShareLinkCreatedResponse { link, token, path })))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}/share-links",
    tag = "Share links",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Share links of the project, newest first", body = [ShareLink]),
        (status = 403, description = "Not the owner or a manager"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_share_links(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<ShareLink>>> {
    let links = sqlx::query_as::<_, DbShareLink>(&format!(
        "SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE project_id = ? ORDER BY created_at DESC, id"
    ))
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(ShareLink::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(links))
}

#[utoipa::path(
    delete,
    path = "/api/share-links/{link_id}",
    tag = "Share links",
    params(("link_id" = Uuid, Path, description = "Share link id")),
    responses(
        (status = 204, description = "Share link revoked"),
        (status = 403, description = "Only the creator or an admin may revoke"),
        (status = 404, description = "Share link not found"),
        (status = 409, description = "Already revoked")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_share_link(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(link_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let link = sqlx::query_as::<_, DbShareLink>(&format!("SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE id = ?"))
        .bind(link_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("share link not found"))?;

    if link.created_by != Some(principal.id) && !principal.is_admin() {
        return Err(AppError::access_denied("only the creator or an admin may revoke this link"));
    }

    let mut tx = state.pool.begin().await?;

    // One-way transition: only the first revocation wins.
    let revoked = sqlx::query("UPDATE share_links SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
        .bind(utc_now())
        .bind(link_id)
        .execute(&mut *tx)
        .await?;
    if revoked.rows_affected() == 0 {
        return Err(AppError::conflict("share link already revoked"));
    }

    let entry = AuditEntry::new(Some(principal.id), "share_link", "revoked")
        .with_resource(link_id)
        .with_details(serde_json::json!({ "project_id": link.project_id }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/share/{token}",
    tag = "Share links",
    params(("token" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Read-only project view", body = SharedProjectView),
        (status = 404, description = "Invalid, expired or revoked link")
    )
)]
pub async fn view_shared_project(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SharedProjectView>> {
    let link = sqlx::query_as::<_, DbShareLink>(&format!(
        "SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE token_hash = ?"
    ))
    .bind(token_digest(&token))
    .fetch_optional(&state.pool)
    .await?
    .filter(|link| link.is_valid_at(utc_now()))
    .ok_or_else(|| AppError::not_found("invalid or expired link"))?;

    let project = fetch_project(&state.pool, link.project_id).await?;

    let tasks = sqlx::query_as::<_, DbTask>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? ORDER BY start_date, created_at, id"
    ))
    .bind(project.id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(Task::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    let members = sqlx::query_as::<_, SharedMember>(
        "SELECT id, name, job_title FROM team_members \
         WHERE id IN (SELECT team_member_id FROM project_members WHERE project_id = ?) \
         ORDER BY name, id",
    )
    .bind(project.id)
    .fetch_all(&state.pool)
    .await?;

    tracing::debug!(link_id = %link.id, project_id = %project.id, "shared project viewed");

    Ok(Json(SharedProjectView {
        project,
        tasks,
        members,
        expires_at: link.expires_at,
    }))
}

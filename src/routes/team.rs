use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{normalize_email, pinned_department};
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Permission, Policy, Principal, RequireAccess, ScopeTarget};
use crate::errors::{AppError, AppResult};
use crate::models::team_member::{
    DbTeamMember, MemberStatus, MemberStatusRequest, TeamListQuery, TeamMember, TeamMemberCreateRequest,
    TeamMemberUpdateRequest, MEMBER_COLUMNS,
};
use crate::utils::utc_now;
use crate::validation::Validator;

pub fn router(state: &AppState) -> Router<AppState> {
    let guard = |policy: Policy| RequireAccess::new(state, policy);
    let manage = || Policy::permission(Permission::ManageTeam).scoped(ScopeTarget::Member);

    Router::new()
        .route("/", get(list_members).route_layer(guard(Policy::permission(Permission::ViewTeam))))
        .route("/", post(create_member).route_layer(guard(Policy::permission(Permission::ManageTeam))))
        .route("/:member_id", get(get_member).route_layer(guard(Policy::permission(Permission::ViewTeam))))
        .route("/:member_id", put(update_member).route_layer(guard(manage())))
        .route("/:member_id", delete(delete_member).route_layer(guard(manage())))
        .route("/:member_id/status", patch(update_member_status).route_layer(guard(manage())))
}

#[utoipa::path(
    get,
    path = "/api/team",
    tag = "Team",
    params(TeamListQuery),
    responses((status = 200, description = "Team members", body = [TeamMember])),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<TeamListQuery>,
) -> AppResult<Json<Vec<TeamMember>>> {
    let mut v = Validator::new();
    let status = query
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, MemberStatus::ALLOWED, MemberStatus::parse));
    v.finish()?;

    let members = sqlx::query_as::<_, DbTeamMember>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM team_members \
         WHERE (? IS NULL OR status = ?) AND (? IS NULL OR department_id = ?) \
         ORDER BY name, id"
    ))
    .bind(status.map(MemberStatus::as_str))
    .bind(status.map(MemberStatus::as_str))
    .bind(query.department_id)
    .bind(query.department_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(TeamMember::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(members))
}

#[utoipa::path(
    get,
    path = "/api/team/{member_id}",
    tag = "Team",
    params(("member_id" = Uuid, Path, description = "Team member id")),
    responses(
        (status = 200, description = "Team member", body = TeamMember),
        (status = 404, description = "Team member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_member(State(state): State<AppState>, Path(member_id): Path<Uuid>) -> AppResult<Json<TeamMember>> {
    Ok(Json(fetch_member(&state.pool, member_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/team",
    tag = "Team",
    request_body = TeamMemberCreateRequest,
    responses(
        (status = 201, description = "Team member created", body = TeamMember),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing manage_team or outside own department"),
        (status = 409, description = "Email or account already linked")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_member(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<TeamMemberCreateRequest>,
) -> AppResult<(StatusCode, Json<TeamMember>)> {
    let mut v = Validator::new();
    v.string_length("name", &payload.name, 1, 100);
    v.email("email", &payload.email);
    v.optional_string_length("job_title", payload.job_title.as_deref(), 0, 100);
    let status = match payload.status.as_deref() {
        Some(raw) => v.parse_enum("status", raw, MemberStatus::ALLOWED, MemberStatus::parse),
        None => Some(MemberStatus::Active),
    };
    v.finish()?;

    let department_id = pinned_department(&principal, payload.department_id)?;
    let email = normalize_email(&payload.email);
    ensure_email_free(&state.pool, &email, None).await?;

    if let Some(user_id) = payload.user_id {
        let linked: Option<i64> = sqlx::query_scalar("SELECT 1 FROM team_members WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;
        if linked.is_some() {
            return Err(AppError::conflict("account already has a team member profile"));
        }
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::validation("user_id", "must reference an existing user"));
        }
    }

    let now = utc_now();
    let member = TeamMember {
        id: Uuid::new_v4(),
        user_id: payload.user_id,
        department_id,
        name: payload.name.trim().to_string(),
        email,
        job_title: payload.job_title,
        status: status.unwrap_or(MemberStatus::Active),
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO team_members (id, user_id, department_id, name, email, job_title, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(member.id)
    .bind(member.user_id)
    .bind(member.department_id)
    .bind(&member.name)
    .bind(&member.email)
    .bind(&member.job_title)
    .bind(member.status.as_str())
    .bind(member.created_at)
    .bind(member.updated_at)
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "created", &member)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(member_id = %member.id, "team member created");

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    put,
    path = "/api/team/{member_id}",
    tag = "Team",
    params(("member_id" = Uuid, Path, description = "Team member id")),
    request_body = TeamMemberUpdateRequest,
    responses(
        (status = 200, description = "Team member updated", body = TeamMember),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing manage_team or outside own department"),
        (status = 404, description = "Team member not found"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_member(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(member_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<TeamMemberUpdateRequest>,
) -> AppResult<Json<TeamMember>> {
    let mut member = fetch_member(&state.pool, member_id).await?;

    let mut v = Validator::new();
    v.optional_string_length("name", payload.name.as_deref(), 1, 100);
    if let Some(email) = payload.email.as_deref() {
        v.email("email", email);
    }
    v.optional_string_length("job_title", payload.job_title.as_deref(), 0, 100);
    let status = payload
        .status
        .as_deref()
        .and_then(|raw| v.parse_enum("status", raw, MemberStatus::ALLOWED, MemberStatus::parse));
    v.finish()?;

    if let Some(department_id) = payload.department_id {
        member.department_id = pinned_department(&principal, Some(department_id))?;
    }
    if let Some(email) = payload.email.as_deref() {
        let email = normalize_email(email);
        ensure_email_free(&state.pool, &email, Some(member.id)).await?;
        member.email = email;
    }
    if let Some(name) = payload.name.as_deref() {
        member.name = name.trim().to_string();
    }
    if payload.job_title.is_some() {
        member.job_title = payload.job_title;
    }
    if let Some(status) = status {
        member.status = status;
    }

    persist(&state, &principal, &mut member, &headers, "updated").await?;

    Ok(Json(member))
}

#[utoipa::path(
    patch,
    path = "/api/team/{member_id}/status",
    tag = "Team",
    params(("member_id" = Uuid, Path, description = "Team member id")),
    request_body = MemberStatusRequest,
    responses(
        (status = 200, description = "Availability changed", body = TeamMember),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Team member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_member_status(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(member_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<MemberStatusRequest>,
) -> AppResult<Json<TeamMember>> {
    let mut member = fetch_member(&state.pool, member_id).await?;

    let mut v = Validator::new();
    let status = v.parse_enum("status", &payload.status, MemberStatus::ALLOWED, MemberStatus::parse);
    v.finish()?;

    if let Some(status) = status {
        member.status = status;
    }
    persist(&state, &principal, &mut member, &headers, "status_changed").await?;

    Ok(Json(member))
}

#[utoipa::path(
    delete,
    path = "/api/team/{member_id}",
    tag = "Team",
    params(("member_id" = Uuid, Path, description = "Team member id")),
    responses(
        (status = 204, description = "Team member removed; assigned tasks become unassigned"),
        (status = 404, description = "Team member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_member(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(member_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let member = fetch_member(&state.pool, member_id).await?;

    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM team_members WHERE id = ?")
        .bind(member.id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), "deleted", &member)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_member(pool: &SqlitePool, member_id: Uuid) -> AppResult<TeamMember> {
    let row = sqlx::query_as::<_, DbTeamMember>(&format!("SELECT {MEMBER_COLUMNS} FROM team_members WHERE id = ?"))
        .bind(member_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("team member not found"))?;
    TeamMember::try_from(row)
}

async fn persist(
    state: &AppState,
    principal: &Principal,
    member: &mut TeamMember,
    headers: &HeaderMap,
    verb: &str,
) -> AppResult<()> {
    member.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE team_members SET department_id = ?, name = ?, email = ?, job_title = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(member.department_id)
    .bind(&member.name)
    .bind(&member.email)
    .bind(&member.job_title)
    .bind(member.status.as_str())
    .bind(member.updated_at)
    .bind(member.id)
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::for_entity(Some(principal.id), verb, &*member)
        .with_context(RequestContext::from_headers(headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(())
}

async fn ensure_email_free(pool: &SqlitePool, email: &str, except: Option<Uuid>) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM team_members WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    match existing {
        Some(id) if Some(id) != except => Err(AppError::conflict("email already in use")),
        _ => Ok(()),
    }
}

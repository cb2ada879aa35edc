use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Duration;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::auth::{ensure_email_available, insert_user};
use super::users::fetch_user;
use super::{normalize_email, pinned_department};
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Policy, Principal, RequireAccess, Role};
use crate::errors::{AppError, AppResult};
use crate::models::invite::{
    DbInvite, Invite, InviteAcceptRequest, InviteCreateRequest, InviteCreatedResponse, InviteValidation,
    INVITE_COLUMNS, INVITE_ROLES, MAX_EXPIRY_DAYS, MIN_EXPIRY_DAYS,
};
use crate::models::user::AuthResponse;
use crate::utils::{generate_token, hash_password, token_digest, utc_now};
use crate::validation::Validator;

pub fn router(state: &AppState) -> Router<AppState> {
    let guard = || RequireAccess::new(state, Policy::min_role(Role::Manager));

    Router::new()
        .route("/", get(list_invites).route_layer(guard()))
        .route("/", post(create_invite).route_layer(guard()))
        .route("/:invite_id", get(get_invite).route_layer(guard()))
        .route("/:invite_id", delete(revoke_invite).route_layer(guard()))
        .route("/validate/:token", get(validate_invite))
        .route("/accept/:token", post(accept_invite))
}

#[utoipa::path(
    post,
    path = "/api/invites",
    tag = "Invites",
    request_body = InviteCreateRequest,
    responses(
        (status = 201, description = "Invite created; the token is only returned here", body = InviteCreatedResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Below manager, or another department"),
        (status = 409, description = "Email registered or already invited")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_invite(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<InviteCreateRequest>,
) -> AppResult<(StatusCode, Json<InviteCreatedResponse>)> {
    let days = payload.expires_in_days.unwrap_or(state.config.invite_expiry_days);

    let mut v = Validator::new();
    v.email("email", &payload.email);
    let role = v.parse_enum("role", &payload.role, INVITE_ROLES, |raw| {
        INVITE_ROLES.contains(&raw).then(|| Role::from_stored(raw))
    });
    v.range("expires_in_days", days, MIN_EXPIRY_DAYS, MAX_EXPIRY_DAYS);
    v.finish()?;
    let role = role.unwrap_or(Role::Member);

    let department_id = pinned_department(&principal, payload.department_id)?;
    if let Some(department_id) = department_id {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM departments WHERE id = ?")
            .bind(department_id)
            .fetch_optional(&state.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::validation("department_id", "must reference an existing department"));
        }
    }

    let email = normalize_email(&payload.email);
    ensure_email_available(&state.pool, &email).await?;

    let now = utc_now();
    let pending: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM invites WHERE email = ? AND used_at IS NULL AND revoked_at IS NULL AND expires_at > ?",
    )
    .bind(&email)
    .bind(now)
    .fetch_optional(&state.pool)
    .await?;
    if pending.is_some() {
        return Err(AppError::conflict("a pending invite already exists for this email"));
    }

    let password_hash = payload.password.as_deref().map(hash_password).transpose()?;

    let token = generate_token();
    let invite = DbInvite {
        id: Uuid::new_v4(),
        token_hash: token_digest(&token),
        email,
        role: role.as_str().to_string(),
        department_id,
        password_hash,
        created_by: Some(principal.id),
        expires_at: now + Duration::days(days),
        used_at: None,
        revoked_at: None,
        created_at: now,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO invites (id, token_hash, email, role, department_id, password_hash, created_by, expires_at, used_at, revoked_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?)",
    )
    .bind(invite.id)
    .bind(&invite.token_hash)
    .bind(&invite.email)
    .bind(&invite.role)
    .bind(invite.department_id)
    .bind(&invite.password_hash)
    .bind(invite.created_by)
    .bind(invite.expires_at)
    .bind(invite.created_at)
    .execute(&mut *tx)
    .await?;

    let invite = Invite::try_from(invite)?;
    let entry = AuditEntry::for_entity(Some(principal.id), "created", &invite)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(invite_id = %invite.id, role = %invite.role, "invite created");

    Ok((StatusCode::CREATED, Json(InviteCreatedResponse { invite, token })))
}

#[utoipa::path(
    get,
    path = "/api/invites",
    tag = "Invites",
    responses((status = 200, description = "Invites visible to the caller, newest first", body = [Invite])),
    security(("bearerAuth" = []))
)]
pub async fn list_invites(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<Invite>>> {
    // Admins see everything, department admins their department, managers their own.
    let invites = sqlx::query_as::<_, DbInvite>(&format!(
        "SELECT {INVITE_COLUMNS} FROM invites \
         WHERE ? = 1 OR (? = 1 AND department_id = ?) OR created_by = ? \
         ORDER BY created_at DESC, id"
    ))
    .bind(principal.is_admin())
    .bind(principal.role == Role::DepartmentAdmin)
    .bind(principal.department_id)
    .bind(principal.id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(Invite::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(invites))
}

#[utoipa::path(
    get,
    path = "/api/invites/{invite_id}",
    tag = "Invites",
    params(("invite_id" = Uuid, Path, description = "Invite id")),
    responses(
        (status = 200, description = "Invite", body = Invite),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Invite not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_invite(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(invite_id): Path<Uuid>,
) -> AppResult<Json<Invite>> {
    let invite = fetch_invite(&state.pool, invite_id).await?;
    if !can_view(&principal, &invite) {
        return Err(AppError::access_denied("no access to this invite"));
    }
    Ok(Json(Invite::try_from(invite)?))
}

#[utoipa::path(
    delete,
    path = "/api/invites/{invite_id}",
    tag = "Invites",
    params(("invite_id" = Uuid, Path, description = "Invite id")),
    responses(
        (status = 204, description = "Invite revoked"),
        (status = 403, description = "Only the creator or an admin may revoke"),
        (status = 404, description = "Invite not found"),
        (status = 409, description = "Already used or revoked")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_invite(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(invite_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let invite = fetch_invite(&state.pool, invite_id).await?;
    if invite.created_by != Some(principal.id) && !principal.is_admin() {
        return Err(AppError::access_denied("only the creator or an admin may revoke this invite"));
    }

    let mut tx = state.pool.begin().await?;

    let revoked = sqlx::query("UPDATE invites SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL AND used_at IS NULL")
        .bind(utc_now())
        .bind(invite.id)
        .execute(&mut *tx)
        .await?;
    if revoked.rows_affected() == 0 {
        return Err(AppError::conflict("invite already used or revoked"));
    }

    let entry = AuditEntry::new(Some(principal.id), "invite", "revoked")
        .with_resource(invite.id)
        .with_details(serde_json::json!({ "email": invite.email }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/invites/validate/{token}",
    tag = "Invites",
    params(("token" = String, Path, description = "Invite token")),
    responses((status = 200, description = "Whether the token can still be accepted", body = InviteValidation))
)]
pub async fn validate_invite(State(state): State<AppState>, Path(token): Path<String>) -> AppResult<Json<InviteValidation>> {
    let invite = fetch_by_token(&state.pool, &token).await?;

    let validation = match invite {
        Some(invite) if invite.is_valid_at(utc_now()) => InviteValidation {
            valid: true,
            password_required: invite.password_hash.is_none(),
            role: Some(Role::from_stored(&invite.role)),
            email: Some(invite.email),
            department_id: invite.department_id,
            expires_at: Some(invite.expires_at),
        },
        _ => InviteValidation::invalid(),
    };

    Ok(Json(validation))
}

#[utoipa::path(
    post,
    path = "/api/invites/accept/{token}",
    tag = "Invites",
    params(("token" = String, Path, description = "Invite token")),
    request_body = InviteAcceptRequest,
    responses(
        (status = 201, description = "Account created from the invite", body = AuthResponse),
        (status = 400, description = "Password missing or too short"),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "Invite already used, revoked or expired")
    )
)]
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    payload: Option<Json<InviteAcceptRequest>>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();

    let invite = fetch_by_token(&state.pool, &token)
        .await?
        .ok_or_else(|| AppError::not_found("invite not found"))?;
    let now = utc_now();
    if !invite.is_valid_at(now) {
        return Err(AppError::conflict("invite already used, revoked or expired"));
    }

    let password_hash = match (payload.password.as_deref(), invite.password_hash.as_deref()) {
        (Some(password), _) => hash_password(password)?,
        (None, Some(preset)) => preset.to_string(),
        (None, None) => return Err(AppError::validation("password", "must not be empty")),
    };
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .unwrap_or_else(|| display_name(&invite.email));

    let mut tx = state.pool.begin().await?;

    // Only one acceptance can flip used_at.
    let claimed = sqlx::query(
        "UPDATE invites SET used_at = ? WHERE id = ? AND used_at IS NULL AND revoked_at IS NULL AND expires_at > ?",
    )
    .bind(now)
    .bind(invite.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        tracing::info!(invite_id = %invite.id, "invite acceptance lost the race");
        return Err(AppError::conflict("invite already used, revoked or expired"));
    }

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(&invite.email)
        .fetch_one(&mut *tx)
        .await?;
    if taken > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    let user_id = Uuid::new_v4();
    let role = Role::from_stored(&invite.role);
    insert_user(&mut tx, user_id, &name, &invite.email, &password_hash, role, invite.department_id).await?;

    // Link an existing profile with the same email, otherwise create one.
    let profile: Option<(Uuid, Option<Uuid>)> =
        sqlx::query_as("SELECT id, user_id FROM team_members WHERE email = ?")
            .bind(&invite.email)
            .fetch_optional(&mut *tx)
            .await?;
    match profile {
        Some((_, Some(_))) => return Err(AppError::conflict("team member profile already linked")),
        Some((member_id, None)) => {
            sqlx::query("UPDATE team_members SET user_id = ?, updated_at = ? WHERE id = ?")
                .bind(user_id)
                .bind(now)
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO team_members (id, user_id, department_id, name, email, job_title, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, NULL, 'active', ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(invite.department_id)
            .bind(&name)
            .bind(&invite.email)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    let entry = AuditEntry::new(Some(user_id), "invite", "accepted")
        .with_resource(invite.id)
        .with_details(serde_json::json!({ "email": invite.email, "role": role, "user_id": user_id }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    let user = fetch_user(&state.pool, user_id).await?;
    let token = state.jwt.encode(user.id)?;
    let refresh_token = state.jwt.encode_refresh(user.id)?;

    tracing::info!(invite_id = %invite.id, user_id = %user.id, "invite accepted");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, refresh_token, user })))
}

async fn fetch_invite(pool: &SqlitePool, invite_id: Uuid) -> AppResult<DbInvite> {
    sqlx::query_as::<_, DbInvite>(&format!("SELECT {INVITE_COLUMNS} FROM invites WHERE id = ?"))
        .bind(invite_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("invite not found"))
}

async fn fetch_by_token(pool: &SqlitePool, token: &str) -> AppResult<Option<DbInvite>> {
    Ok(
        sqlx::query_as::<_, DbInvite>(&format!("SELECT {INVITE_COLUMNS} FROM invites WHERE token_hash = ?"))
            .bind(token_digest(token))
            .fetch_optional(pool)
            .await?,
    )
}

fn can_view(principal: &Principal, invite: &DbInvite) -> bool {
    principal.is_admin()
        || invite.created_by == Some(principal.id)
        || (principal.role == Role::DepartmentAdmin
            && principal.department_id.is_some()
            && invite.department_id == principal.department_id)
}

/// Local part of the address, used when the invitee gives no name.
fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

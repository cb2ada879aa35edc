use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::normalize_email;
use super::users::{fetch_db_user, fetch_user};
use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{CurrentPrincipal, Policy, RequireAccess, Role};
use crate::errors::{AppError, AppResult};
use crate::jwt::{Claims, TokenKind};
use crate::models::user::{
    AuthResponse, ChangePasswordRequest, DbUser, LoginRequest, RefreshResponse, RegisterRequest, User, VerifyResponse,
    USER_COLUMNS,
};
use crate::models::MessageResponse;
use crate::utils::{hash_password, utc_now, verify_password};
use crate::validation::Validator;

pub fn router(state: &AppState) -> Router<AppState> {
    let authenticated = || RequireAccess::new(state, Policy::authenticated());

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/verify", get(verify).route_layer(authenticated()))
        .route("/me", get(me).route_layer(authenticated()))
        .route("/logout", post(logout).route_layer(authenticated()))
        .route("/password", put(change_password).route_layer(authenticated()))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let mut v = Validator::new();
    v.string_length("name", &payload.name, 1, 100);
    v.email("email", &payload.email);
    v.finish()?;

    let email = normalize_email(&payload.email);
    ensure_email_available(&state.pool, &email).await?;
    let password_hash = hash_password(&payload.password)?;

    let user_id = Uuid::new_v4();
    let mut tx = state.pool.begin().await?;

    insert_user(&mut tx, user_id, payload.name.trim(), &email, &password_hash, Role::Member, None).await?;

    let entry = AuditEntry::new(Some(user_id), "user", "registered")
        .with_resource(user_id)
        .with_details(serde_json::json!({ "email": email }))
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    let user = fetch_user(&state.pool, user_id).await?;
    let token = state.jwt.encode(user.id)?;
    let refresh_token = state.jwt.encode_refresh(user.id)?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, refresh_token, user })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated")
    )
)]
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL"
    ))
    .bind(normalize_email(&payload.email))
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        tracing::info!(user_id = %db_user.id, "login rejected: bad password");
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !db_user.is_active {
        return Err(AppError::AccountDeactivated);
    }

    let token = state.jwt.encode(db_user.id)?;
    let refresh_token = state.jwt.encode_refresh(db_user.id)?;
    let user = User::try_from(db_user)?;

    Ok(Json(AuthResponse { token, refresh_token, user }))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Missing, invalid, revoked or non-refresh token"),
        (status = 403, description = "Account deactivated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<RefreshResponse>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

    let claims = state
        .jwt
        .decode(token)
        .map_err(|_| AppError::unauthorized("invalid or expired token"))?;
    if claims.kind != TokenKind::Refresh {
        return Err(AppError::unauthorized("a refresh token is required"));
    }
    if state.blacklist.is_blacklisted(&claims.jti).await {
        return Err(AppError::unauthorized("token has been revoked"));
    }

    // Same live check as the access layer: a deactivated account cannot mint tokens.
    let principal = state
        .access_store
        .principal(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("unknown token subject"))?;
    if !principal.active {
        return Err(AppError::AccountDeactivated);
    }

    Ok(Json(RefreshResponse {
        token: state.jwt.encode(principal.id)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    tag = "Auth",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn verify(CurrentPrincipal(principal): CurrentPrincipal) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        user_id: principal.id,
    })
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> AppResult<Json<User>> {
    Ok(Json(fetch_user(&state.pool, principal.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<MessageResponse>> {
    state.blacklist.add(&claims.jti, claims.remaining()).await;

    tracing::info!(user_id = %principal.id, "logged out");

    Ok(Json(MessageResponse::new("Logged out")))
}

#[utoipa::path(
    put,
    path = "/api/auth/password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password is wrong")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = fetch_db_user(&state.pool, principal.id).await?;

    if !verify_password(&payload.current_password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("current password is incorrect"));
    }
    let password_hash = hash_password(&payload.new_password)
        .map_err(|_| AppError::validation("new_password", "must be at least 8 characters"))?;

    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(utc_now())
        .bind(principal.id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::new(Some(principal.id), "user", "password_changed")
        .with_resource(principal.id)
        .with_context(RequestContext::from_headers(&headers));
    audit::record(&mut *tx, &entry).await?;

    tx.commit().await?;

    Ok(Json(MessageResponse::new("Password changed")))
}

pub(crate) async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

/// Inserts the account together with its default settings row.
pub async fn insert_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    name: &str,
    email: &str,
    password_hash: &str,
    role: Role,
    department_id: Option<Uuid>,
) -> AppResult<()> {
    let now = utc_now();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, department_id, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(user_id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(department_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO user_settings (id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

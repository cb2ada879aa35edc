use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{Policy, RequireAccess, Role};
use crate::errors::AppResult;
use crate::models::audit_log::{AuditListQuery, AuditLog, DbAuditLog, AUDIT_COLUMNS};
use crate::models::PageQuery;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/",
        get(list_audit_logs).route_layer(RequireAccess::new(state, Policy::min_role(Role::Admin))),
    )
}

#[utoipa::path(
    get,
    path = "/api/audit-logs",
    tag = "Audit",
    params(AuditListQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = [AuditLog]),
        (status = 403, description = "Admins only")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditListQuery>,
) -> AppResult<Json<Vec<AuditLog>>> {
    let (limit, offset) = PageQuery { page: query.page, per_page: query.per_page }.limit_offset();

    let entries = sqlx::query_as::<_, DbAuditLog>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_logs \
         WHERE (? IS NULL OR resource_type = ?) \
         ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
    ))
    .bind(&query.resource_type)
    .bind(&query.resource_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(AuditLog::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(entries))
}

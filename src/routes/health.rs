use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::query_scalar;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Service and database status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let probe = query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;

    let response = match probe {
        Ok(_) => HealthResponse { status: "ok", db_ok: true, db_error: None },
        Err(err) => {
            tracing::error!(error = %err, "database probe failed");
            HealthResponse { status: "degraded", db_ok: false, db_error: Some(err.to_string()) }
        }
    };

    Ok(Json(response))
}

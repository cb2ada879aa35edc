use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{CurrentPrincipal, Policy, RequireAccess};
use crate::errors::AppResult;
use crate::insights::{self, InsightsResponse, Snapshot};
use crate::utils::{today, utc_now};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_insights).route_layer(RequireAccess::new(state, Policy::authenticated())),
    )
}

#[utoipa::path(
    get,
    path = "/api/insights",
    tag = "Insights",
    responses(
        (status = 200, description = "Findings ordered critical, warning, positive, info", body = InsightsResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_insights(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<InsightsResponse>> {
    let snapshot = Snapshot::load(&state.pool).await?;
    let insights = insights::generate(&snapshot, today());

    tracing::debug!(user_id = %principal.id, count = insights.len(), "insights generated");

    Ok(Json(InsightsResponse {
        insights,
        generated_at: utc_now(),
    }))
}

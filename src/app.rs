use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AccessEvaluator, AccessStore, PolicyEvaluator, SqliteAccessStore};
use crate::blacklist::{InMemoryBlacklist, TokenBlacklist};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{audit, auth, departments, health, insights, invites, projects, share, tasks, team, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub config: Arc<AppConfig>,
    pub access_store: Arc<dyn AccessStore>,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub blacklist: Arc<dyn TokenBlacklist>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, config: AppConfig) -> Self {
        let access_store: Arc<dyn AccessStore> = Arc::new(SqliteAccessStore::new(pool.clone()));
        let evaluator: Arc<dyn PolicyEvaluator> = Arc::new(AccessEvaluator::new(Arc::clone(&access_store)));

        Self {
            pool,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            access_store,
            evaluator,
            blacklist: Arc::new(InMemoryBlacklist::new()),
        }
    }

    /// Swaps the token blacklist, e.g. for one shared between instances.
    pub fn with_blacklist(mut self, blacklist: Arc<dyn TokenBlacklist>) -> Self {
        self.blacklist = blacklist;
        self
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let config = AppConfig::from_env()?;
    Ok(build_router(AppState::new(pool, jwt_config, config)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::router(&state))
        .nest("/projects", projects::router(&state))
        .nest("/tasks", tasks::router(&state))
        .nest("/team", team::router(&state))
        .nest("/departments", departments::router(&state))
        .nest("/users", users::router(&state))
        .nest("/user", users::profile_router(&state))
        .nest("/invites", invites::router(&state))
        .nest("/share-links", share::links_router(&state))
        .nest("/share", share::public_router())
        .nest("/audit-logs", audit::router(&state))
        .nest("/insights", insights::router(&state));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if config.cors_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

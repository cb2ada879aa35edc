//! Route-level authorization layer.
//!
//! ```ignore
//! Router::new()
//!     .route("/:project_id", get(get_project))
//!     .route_layer(RequireAccess::new(&state, Policy::permission(Permission::ViewProjects)));
//! ```
//!
//! The layer resolves the bearer token, reloads the live principal, evaluates
//! the policy against identifiers taken from the matched path and either
//! short-circuits with the mapped error or forwards the request with the
//! [`Principal`] stored in its extensions.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use uuid::Uuid;

use super::policy::{Policy, ResourceRefs};
use super::principal::Principal;
use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::{Claims, TokenKind};

#[derive(Clone)]
pub struct RequireAccess {
    state: AppState,
    policy: Arc<Policy>,
}

impl RequireAccess {
    pub fn new(state: &AppState, policy: Policy) -> Self {
        Self {
            state: state.clone(),
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for RequireAccess {
    type Service = RequireAccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAccessService {
            inner,
            state: self.state.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

#[derive(Clone)]
pub struct RequireAccessService<S> {
    inner: S,
    state: AppState,
    policy: Arc<Policy>,
}

impl<S> Service<Request<Body>> for RequireAccessService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // The clone is not guaranteed ready; keep the polled service for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = self.state.clone();
        let policy = Arc::clone(&self.policy);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            match authorize(&state, &policy, &mut parts).await {
                Ok((principal, claims)) => {
                    parts.extensions.insert(principal);
                    parts.extensions.insert(claims);
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

async fn authorize(state: &AppState, policy: &Policy, parts: &mut Parts) -> AppResult<(Principal, Claims)> {
    let token = bearer_token(parts).ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

    let claims = state
        .jwt
        .decode(token)
        .map_err(|_| AppError::unauthorized("invalid or expired token"))?;
    if claims.kind != TokenKind::Access {
        return Err(AppError::unauthorized("refresh tokens cannot authorize requests"));
    }

    if state.blacklist.is_blacklisted(&claims.jti).await {
        tracing::info!(user_id = %claims.sub, "rejected revoked token");
        return Err(AppError::unauthorized("token has been revoked"));
    }

    let principal = state
        .access_store
        .principal(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("unknown token subject"))?;

    let refs = resource_refs(parts).await?;

    state
        .evaluator
        .evaluate(&principal, policy, &refs)
        .await?
        .into_result()?;

    Ok((principal, claims))
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Path parameters named `project_id`, `task_id` and `member_id` feed the
/// matching resource reference.
async fn resource_refs(parts: &mut Parts) -> AppResult<ResourceRefs> {
    let params = match Path::<HashMap<String, String>>::from_request_parts(parts, &()).await {
        Ok(Path(params)) => params,
        Err(_) => HashMap::new(),
    };

    Ok(ResourceRefs {
        project_id: parse_param(&params, "project_id")?,
        task_id: parse_param(&params, "task_id")?,
        member_id: parse_param(&params, "member_id")?,
    })
}

fn parse_param(params: &HashMap<String, String>, name: &str) -> AppResult<Option<Uuid>> {
    params
        .get(name)
        .map(|raw| {
            Uuid::parse_str(raw).map_err(|_| AppError::validation(name, "must be a valid UUID"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_params_only() {
        let id = Uuid::new_v4();
        let mut params = HashMap::new();
        params.insert("project_id".to_string(), id.to_string());
        params.insert("token".to_string(), "abc".to_string());

        assert_eq!(parse_param(&params, "project_id").unwrap(), Some(id));
        assert_eq!(parse_param(&params, "task_id").unwrap(), None);
    }

    #[test]
    fn malformed_id_is_a_validation_error() {
        let mut params = HashMap::new();
        params.insert("task_id".to_string(), "not-a-uuid".to_string());
        let err = parse_param(&params, "task_id").unwrap_err();
        assert_eq!(err.kind(), "validation_failed");
    }

    #[test]
    fn bearer_prefix_required() {
        let req = Request::builder()
            .header(header::AUTHORIZATION, "Token abc")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert!(bearer_token(&parts).is_none());

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_token(&parts), Some("abc"));
    }
}

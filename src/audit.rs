//! Append-only audit trail for privileged operations.
//!
//! Entries are written through whatever executor the caller holds, so an
//! entry recorded inside a transaction commits or rolls back with it.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::utils::utc_now;

/// Implemented by entities whose changes are audited.
pub trait Auditable {
    /// Resource type, also the prefix of the action, e.g. `invite.created`.
    fn resource_type() -> &'static str;

    fn resource_id(&self) -> Uuid;

    /// Extra context stored with the entry.
    fn audit_details(&self) -> Value {
        Value::Object(Default::default())
    }
}

/// Client metadata captured from request headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(500).collect());

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: &'static str,
    pub resource_id: Option<Uuid>,
    pub details: Value,
    pub context: RequestContext,
}

impl AuditEntry {
    pub fn new(actor_id: Option<Uuid>, resource_type: &'static str, verb: &str) -> Self {
        Self {
            actor_id,
            action: format!("{resource_type}.{verb}"),
            resource_type,
            resource_id: None,
            details: Value::Object(Default::default()),
            context: RequestContext::default(),
        }
    }

    pub fn for_entity<T: Auditable>(actor_id: Option<Uuid>, verb: &str, entity: &T) -> Self {
        Self::new(actor_id, T::resource_type(), verb)
            .with_resource(entity.resource_id())
            .with_details(entity.audit_details())
    }

    pub fn with_resource(mut self, id: Uuid) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

pub async fn record<'e, E>(executor: E, entry: &AuditEntry) -> AppResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let details = serde_json::to_string(&entry.details).unwrap_or_else(|_| "{}".to_string());

    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, details, ip_address, user_agent, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.actor_id)
    .bind(&entry.action)
    .bind(entry.resource_type)
    .bind(entry.resource_id)
    .bind(details)
    .bind(&entry.context.ip)
    .bind(&entry.context.user_agent)
    .bind(utc_now())
    .execute(executor)
    .await?;

    tracing::debug!(action = %entry.action, actor_id = ?entry.actor_id, "audit entry recorded");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing(Uuid);

    impl Auditable for Thing {
        fn resource_type() -> &'static str {
            "thing"
        }

        fn resource_id(&self) -> Uuid {
            self.0
        }
    }

    #[test]
    fn action_is_prefixed_by_resource_type() {
        let id = Uuid::new_v4();
        let entry = AuditEntry::for_entity(None, "deleted", &Thing(id));
        assert_eq!(entry.action, "thing.deleted");
        assert_eq!(entry.resource_id, Some(id));
    }

    #[test]
    fn context_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "10.9.9.9".parse().unwrap());
        headers.insert(axum::http::header::USER_AGENT, "curl/8".parse().unwrap());

        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8"));
    }
}

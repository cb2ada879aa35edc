//! Revoked-token registry consulted by the access layer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    async fn is_blacklisted(&self, jti: &str) -> bool;

    /// Blacklist `jti` for `ttl`. Entries past their ttl are forgotten.
    async fn add(&self, jti: &str, ttl: Duration);
}

/// Single-instance blacklist. A multi-instance deployment would back the
/// trait with a shared key-value store instead.
#[derive(Debug, Default)]
pub struct InMemoryBlacklist {
    entries: RwLock<HashMap<String, Instant>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryBlacklist {
    async fn is_blacklisted(&self, jti: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(jti)
            .map(|expires_at| *expires_at > Instant::now())
            .unwrap_or(false)
    }

    async fn add(&self, jti: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(jti.to_string(), now + ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn added_token_is_blacklisted_until_expiry() {
        let blacklist = InMemoryBlacklist::new();
        blacklist.add("abc", Duration::from_secs(60)).await;
        assert!(blacklist.is_blacklisted("abc").await);
        assert!(!blacklist.is_blacklisted("other").await);
    }

    #[tokio::test]
    async fn expired_entries_are_pruned() {
        let blacklist = InMemoryBlacklist::new();
        blacklist.add("old", Duration::from_millis(0)).await;
        assert!(!blacklist.is_blacklisted("old").await);

        blacklist.add("new", Duration::from_secs(60)).await;
        assert_eq!(blacklist.len().await, 1);
    }
}

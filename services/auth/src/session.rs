//! Refresh-token sessions, the token blacklist and short-lived login state
//!
//! Everything lives in a key/value store with TTLs: Redis in production,
//! an in-process map in tests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use common::{cache::RedisPool, jwt::unix_now};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

/// Key/value operations the sessions need
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read and delete in one step
    async fn take(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl KvStore for RedisPool {
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        RedisPool::set(self, key, value, ttl_seconds).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        RedisPool::get(self, key).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        RedisPool::take(self, key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        RedisPool::delete(self, key).await
    }
}

/// Tokens are long; keys carry their digest instead
fn token_key(prefix: &str, token: &str) -> String {
    format!("{}:{}", prefix, hex::encode(Sha256::digest(token.as_bytes())))
}

/// Session manager for handling user sessions
#[derive(Clone)]
pub struct SessionManager {
    kv: Arc<dyn KvStore>,
    refresh_ttl: u64,
}

impl SessionManager {
    pub fn new(kv: Arc<dyn KvStore>, refresh_ttl: u64) -> Self {
        Self { kv, refresh_ttl }
    }

    /// Record `refresh_token` as the user's current session
    pub async fn create_session(&self, user_id: Uuid, refresh_token: &str) -> Result<()> {
        info!(user_id = %user_id, "Creating session");

        self.kv
            .set(
                &format!("session:{}", user_id),
                &token_key("refresh", refresh_token),
                Some(self.refresh_ttl),
            )
            .await
    }

    /// Whether `refresh_token` is the user's current, unrevoked session
    pub async fn is_session_valid(&self, user_id: Uuid, refresh_token: &str) -> Result<bool> {
        if self.is_blacklisted(refresh_token).await? {
            return Ok(false);
        }

        let stored = self.kv.get(&format!("session:{}", user_id)).await?;
        Ok(stored.as_deref() == Some(token_key("refresh", refresh_token).as_str()))
    }

    pub async fn delete_session(&self, user_id: Uuid) -> Result<()> {
        info!(user_id = %user_id, "Deleting session");
        self.kv.delete(&format!("session:{}", user_id)).await
    }

    /// Refuse `token` until it would have expired anyway
    pub async fn blacklist_token(&self, token: &str, expires_at: u64) -> Result<()> {
        let remaining = expires_at.saturating_sub(unix_now()?);
        self.kv
            .set(&token_key("blacklisted_token", token), "1", Some(remaining))
            .await
    }

    pub async fn is_blacklisted(&self, token: &str) -> Result<bool> {
        Ok(self
            .kv
            .get(&token_key("blacklisted_token", token))
            .await?
            .is_some())
    }

    /// Stash OAuth state until the provider redirects back
    pub async fn put_oauth_state(&self, csrf: &str, verifier: &str, ttl: u64) -> Result<()> {
        self.kv
            .set(&format!("oauth_state:{}", csrf), verifier, Some(ttl))
            .await
    }

    /// Claim OAuth state; a second claim for the same `csrf` finds nothing
    pub async fn take_oauth_state(&self, csrf: &str) -> Result<Option<String>> {
        self.kv.take(&format!("oauth_state:{}", csrf)).await
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryKv;
    use super::*;

    fn sessions() -> SessionManager {
        SessionManager::new(Arc::new(MemoryKv::default()), 3600)
    }

    #[tokio::test]
    async fn test_only_latest_refresh_token_is_valid() {
        let sessions = sessions();
        let user = Uuid::new_v4();

        sessions.create_session(user, "first").await.unwrap();
        sessions.create_session(user, "second").await.unwrap();

        assert!(!sessions.is_session_valid(user, "first").await.unwrap());
        assert!(sessions.is_session_valid(user, "second").await.unwrap());

        sessions.delete_session(user).await.unwrap();
        assert!(!sessions.is_session_valid(user, "second").await.unwrap());
    }

    #[tokio::test]
    async fn test_blacklisted_token_is_refused() {
        let sessions = sessions();
        let user = Uuid::new_v4();
        sessions.create_session(user, "token").await.unwrap();

        sessions
            .blacklist_token("token", unix_now().unwrap() + 60)
            .await
            .unwrap();
        assert!(sessions.is_blacklisted("token").await.unwrap());
        assert!(!sessions.is_session_valid(user, "token").await.unwrap());
    }

    #[tokio::test]
    async fn test_oauth_state_is_single_use() {
        let sessions = sessions();
        sessions.put_oauth_state("csrf", "verifier", 600).await.unwrap();

        assert_eq!(
            sessions.take_oauth_state("csrf").await.unwrap().as_deref(),
            Some("verifier")
        );
        assert!(sessions.take_oauth_state("csrf").await.unwrap().is_none());
    }
}

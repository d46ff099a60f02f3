//! One-time passcode login
//!
//! Codes are six digits, stored as SHA-256 digests and consumed on first
//! successful use.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use marketplace::{
    models::NewOtp,
    store::{OtpStore, Store},
};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{AuthError, AuthResult};

/// Delivers a code to its target (phone number or email)
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, target: &str, code: &str) -> Result<()>;
}

/// Writes codes to the service log; for environments without an SMS or
/// mail gateway
pub struct LogSender;

#[async_trait]
impl OtpSender for LogSender {
    async fn send(&self, target: &str, code: &str) -> Result<()> {
        info!(target = %target, code = %code, "One-time code issued");
        Ok(())
    }
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn Store>,
    sender: Arc<dyn OtpSender>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn OtpSender>, ttl_seconds: i64) -> Self {
        Self {
            store,
            sender,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Issue and deliver a fresh code for `target`
    pub async fn request(&self, target: &str) -> AuthResult<()> {
        let code = generate_code();

        self.store
            .insert_otp(NewOtp {
                target: target.to_string(),
                code_hash: hash_code(&code),
                expires_at: Utc::now() + self.ttl,
            })
            .await?;

        self.sender.send(target, &code).await?;
        Ok(())
    }

    /// Check `code` against the latest live code for `target` and consume it
    pub async fn verify(&self, target: &str, code: &str) -> AuthResult<()> {
        let now = Utc::now();
        let rejected = || AuthError::Unauthorized("Invalid or expired code".to_string());

        let otp = self
            .store
            .latest_live_otp(target, now)
            .await?
            .ok_or_else(rejected)?;

        if otp.code_hash != hash_code(code.trim()) {
            warn!(target = %target, "One-time code mismatch");
            return Err(rejected());
        }

        // A concurrent verify may have used it first
        if !self.store.consume_otp(otp.id, now).await? {
            return Err(rejected());
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod capture {
    use super::*;
    use tokio::sync::Mutex;

    /// Records delivered codes for tests
    #[derive(Default)]
    pub struct CaptureSender {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl CaptureSender {
        pub async fn last_code(&self) -> Option<String> {
            self.sent.lock().await.last().map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl OtpSender for CaptureSender {
        async fn send(&self, target: &str, code: &str) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((target.to_string(), code.to_string()));
            Ok(())
        }
    }
}

//! One-time passcodes

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Issued passcode; only the SHA-256 digest of the code is kept
#[derive(Debug, Clone)]
pub struct Otp {
    pub id: Uuid,
    pub target: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Otp {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub target: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

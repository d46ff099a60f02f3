//! Login throttling to slow down password guessing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Throttle configuration
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Failures allowed before the key is locked
    pub max_failures: u32,
    /// Failures older than this are forgotten
    pub window: Duration,
    /// How long a locked key stays locked
    pub lockout: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::from_secs(300),
            lockout: Duration::from_secs(900),
        }
    }
}

#[derive(Debug)]
struct Entry {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

/// Failed-login counter keyed by normalised email
#[derive(Debug, Clone)]
pub struct LoginThrottle {
    config: ThrottleConfig,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl LoginThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` may attempt a login now
    pub async fn check(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let Some(entry) = entries.get(key) else {
            return true;
        };

        match entry.locked_until {
            Some(until) if now < until => false,
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt, locking the key once the limit is reached
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            failures: 0,
            last_failure: now,
            locked_until: None,
        });

        if now.duration_since(entry.last_failure) >= self.config.window {
            entry.failures = 0;
        }

        entry.failures += 1;
        entry.last_failure = now;

        if entry.failures >= self.config.max_failures {
            entry.locked_until = Some(now + self.config.lockout);
            warn!(
                key = %key,
                seconds = self.config.lockout.as_secs(),
                "Locking login after repeated failures"
            );
        }
    }

    /// Forget failures after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max_failures: u32, lockout: Duration) -> LoginThrottle {
        LoginThrottle::new(ThrottleConfig {
            max_failures,
            window: Duration::from_secs(60),
            lockout,
        })
    }

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let throttle = throttle(3, Duration::from_secs(60));

        for _ in 0..2 {
            throttle.record_failure("a@example.com").await;
            assert!(throttle.check("a@example.com").await);
        }
        throttle.record_failure("a@example.com").await;

        assert!(!throttle.check("a@example.com").await);
        assert!(throttle.check("b@example.com").await);
    }

    #[tokio::test]
    async fn test_reset_clears_failures() {
        let throttle = throttle(2, Duration::from_secs(60));

        throttle.record_failure("a@example.com").await;
        throttle.reset("a@example.com").await;
        throttle.record_failure("a@example.com").await;

        assert!(throttle.check("a@example.com").await);
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let throttle = throttle(1, Duration::from_millis(20));

        throttle.record_failure("a@example.com").await;
        assert!(!throttle.check("a@example.com").await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(throttle.check("a@example.com").await);
    }
}

//! Service settings loaded from defaults and the environment

use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

/// Auth service settings
///
/// Every field maps to the upper-case environment variable of the same name
/// (`PORT`, `APP_ENV`, `FRONTEND_URL`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub app_env: String,
    pub frontend_url: String,
    /// Lifetime of one-time codes
    pub otp_ttl_seconds: i64,
    /// Failed logins allowed per email before the account is locked out
    pub login_max_failures: u32,
    pub login_lockout_seconds: u64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("port", 3000)?
            .set_default("app_env", "production")?
            .set_default("frontend_url", "http://localhost:5173")?
            .set_default("otp_ttl_seconds", 300)?
            .set_default("login_max_failures", 5)?
            .set_default("login_lockout_seconds", 900)?
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}

#[cfg(test)]
impl Settings {
    pub fn for_test() -> Self {
        Self {
            port: 0,
            app_env: "test".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            otp_ttl_seconds: 300,
            login_max_failures: 3,
            login_lockout_seconds: 60,
            admin_email: None,
            admin_password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_defaults_and_overrides() {
        unsafe {
            env::remove_var("PORT");
            env::set_var("APP_ENV", "development");
            env::set_var("OTP_TTL_SECONDS", "120");
        }

        let settings = Settings::load().unwrap();
        assert_eq!(settings.port, 3000);
        assert!(settings.is_development());
        assert_eq!(settings.otp_ttl_seconds, 120);

        unsafe {
            env::remove_var("APP_ENV");
            env::remove_var("OTP_TTL_SECONDS");
        }
    }
}

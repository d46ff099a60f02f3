//! Service settings loaded from defaults and the environment

use anyhow::Result;
use config::{Config, Environment};
use marketplace::booking::validate_commission_rate;
use rust_decimal::Decimal;
use serde::Deserialize;

/// API service settings; fields map to `PORT`, `APP_ENV`, `FRONTEND_URL`
/// and `COMMISSION_RATE`
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub app_env: String,
    pub frontend_url: String,
    /// Platform share of each completed booking, strictly between 0 and 1
    pub commission_rate: Decimal,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("port", 3001)?
            .set_default("app_env", "production")?
            .set_default("frontend_url", "http://localhost:5173")?
            .set_default("commission_rate", "0.20")?
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        validate_commission_rate(settings.commission_rate)?;
        Ok(settings)
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_defaults() {
        unsafe {
            env::remove_var("PORT");
            env::remove_var("APP_ENV");
            env::remove_var("COMMISSION_RATE");
        }

        let settings = Settings::load().unwrap();
        assert_eq!(settings.port, 3001);
        assert_eq!(settings.commission_rate, Decimal::new(20, 2));
        assert!(!settings.is_development());
    }

    #[test]
    #[serial]
    fn test_out_of_range_commission_is_rejected() {
        unsafe {
            env::set_var("COMMISSION_RATE", "1.5");
        }
        let loaded = Settings::load();
        unsafe {
            env::remove_var("COMMISSION_RATE");
        }

        assert!(loaded.is_err());
    }
}

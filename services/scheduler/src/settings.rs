//! Cron schedules loaded from defaults and the environment

use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

/// Six-field cron expressions (with seconds), read from `PAYOUT_SCHEDULE`
/// and `OTP_SWEEP_SCHEDULE`
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub payout_schedule: String,
    pub otp_sweep_schedule: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            // 02:00 UTC daily
            .set_default("payout_schedule", "0 0 2 * * *")?
            .set_default("otp_sweep_schedule", "0 */10 * * * *")?
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

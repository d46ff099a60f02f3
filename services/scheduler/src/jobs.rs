//! Periodic maintenance jobs

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use marketplace::{
    ledger::{Ledger, SettlementReport},
    store::{OtpStore, Store},
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::settings::Settings;

#[derive(Clone)]
pub struct Jobs {
    store: Arc<dyn Store>,
    ledger: Ledger,
}

impl Jobs {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
        }
    }

    /// Move every worker's pending earnings into a salary entry for `date`.
    /// Running twice for the same day settles nothing the second time.
    pub async fn settle_payouts(&self, date: NaiveDate) -> Result<SettlementReport> {
        let report = self.ledger.settle_payouts(date).await?;

        if report.failures > 0 {
            warn!(%date, failures = report.failures, "Some payouts were not settled");
        }
        info!(
            %date,
            settled = report.settled.len(),
            total = %report.total,
            "Payout settlement finished"
        );
        Ok(report)
    }

    /// Delete passcodes past their expiry
    pub async fn sweep_otps(&self) -> Result<u64> {
        let purged = self.store.purge_expired_otps(Utc::now()).await?;
        if purged > 0 {
            info!(purged, "Expired OTPs removed");
        }
        Ok(purged)
    }

    /// Register both jobs and start the scheduler
    pub async fn start(&self, settings: &Settings) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;

        let jobs = self.clone();
        let payouts = Job::new_async(settings.payout_schedule.as_str(), move |_, _| {
            let jobs = jobs.clone();
            Box::pin(async move {
                let today = Utc::now().date_naive();
                if let Err(e) = jobs.settle_payouts(today).await {
                    error!(error = %e, "Payout settlement job failed");
                }
            })
        })?;

        let jobs = self.clone();
        let sweep = Job::new_async(settings.otp_sweep_schedule.as_str(), move |_, _| {
            let jobs = jobs.clone();
            Box::pin(async move {
                if let Err(e) = jobs.sweep_otps().await {
                    error!(error = %e, "OTP sweep job failed");
                }
            })
        })?;

        scheduler.add(payouts).await?;
        scheduler.add(sweep).await?;
        scheduler.start().await?;

        info!(
            payouts = %settings.payout_schedule,
            otp_sweep = %settings.otp_sweep_schedule,
            "Scheduler started"
        );
        Ok(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use marketplace::{
        models::{NewOtp, NewUser, NewWorkerProfile, Role, ServiceType, TransactionFilter},
        store::{LedgerStore, MemoryStore, UserStore, WorkerStore},
    };
    use rust_decimal::Decimal;
    use uuid::Uuid;

    async fn worker(store: &MemoryStore, name: &str) -> Uuid {
        store
            .insert_user(
                NewUser {
                    name: name.to_string(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    password_hash: "x".to_string(),
                    role: Role::Worker,
                    phone: None,
                },
                Some(NewWorkerProfile {
                    services: vec![ServiceType::CarWash],
                    skills: vec![],
                }),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_settlement_is_once_per_day() {
        let store = Arc::new(MemoryStore::new());
        let ravi = worker(&store, "Ravi").await;
        let kiran = worker(&store, "Kiran").await;
        let idle = worker(&store, "Idle").await;
        store.credit_pending_payout(ravi, Decimal::new(47920, 2)).await;
        store.credit_pending_payout(kiran, Decimal::new(8000, 2)).await;

        let jobs = Jobs::new(store.clone());
        let day = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();

        let report = jobs.settle_payouts(day).await.unwrap();
        assert_eq!(report.settled.len(), 2);
        assert_eq!(report.total, Decimal::new(55920, 2));
        assert_eq!(report.failures, 0);

        let ravi_profile = store.find_worker(ravi).await.unwrap().unwrap();
        assert_eq!(ravi_profile.pending_payouts, Decimal::ZERO);
        assert_eq!(ravi_profile.last_settled_on, Some(day));
        assert!(
            store
                .find_transaction_by_reference(&format!("payout:{}:{}", idle, day))
                .await
                .unwrap()
                .is_none()
        );

        let again = jobs.settle_payouts(day).await.unwrap();
        assert!(again.settled.is_empty());
        assert_eq!(again.total, Decimal::ZERO);

        let salaries = store
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(salaries.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_codes() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        for (target, offset) in [("a@example.com", -60), ("b@example.com", -1), ("c@example.com", 300)] {
            store
                .insert_otp(NewOtp {
                    target: target.to_string(),
                    code_hash: "digest".to_string(),
                    expires_at: now + Duration::seconds(offset),
                })
                .await
                .unwrap();
        }

        let jobs = Jobs::new(store.clone());
        assert_eq!(jobs.sweep_otps().await.unwrap(), 2);
        assert_eq!(jobs.sweep_otps().await.unwrap(), 0);
        assert!(
            store
                .latest_live_otp("c@example.com", Utc::now())
                .await
                .unwrap()
                .is_some()
        );
    }
}

//! Worker profile model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceType;

/// Worker profile; shares its id with the owning user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: Uuid,
    pub services: Vec<ServiceType>,
    pub is_available: bool,
    pub pending_payouts: Decimal,
    pub rating: f64,
    pub skills: Vec<String>,
    pub is_active: bool,
    /// Day of the last payout settlement
    pub last_settled_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    pub fn offers(&self, service_type: ServiceType) -> bool {
        self.services.contains(&service_type)
    }
}

/// Profile fields supplied at worker registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkerProfile {
    pub services: Vec<ServiceType>,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// A worker as seen by assignment, with the load used to break rating ties
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCandidate {
    #[serde(flatten)]
    pub worker: Worker,
    pub name: String,
    pub active_assignments: i64,
}

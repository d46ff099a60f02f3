//! Worker matching

use std::{cmp::Ordering, sync::Arc};

use crate::{
    error::{DomainError, DomainResult},
    models::{ServiceType, WorkerCandidate},
    store::{Store, WorkerStore},
};

/// Order candidates for a job: rating descending, then fewest active
/// assignments. Candidates below `min_rating` are dropped.
pub fn rank_candidates(
    mut candidates: Vec<WorkerCandidate>,
    min_rating: Option<f64>,
) -> Vec<WorkerCandidate> {
    if let Some(min) = min_rating {
        candidates.retain(|c| c.worker.rating >= min);
    }

    candidates.sort_by(|a, b| {
        b.worker
            .rating
            .partial_cmp(&a.worker.rating)
            .unwrap_or(Ordering::Equal)
            .then(a.active_assignments.cmp(&b.active_assignments))
    });
    candidates
}

#[derive(Clone)]
pub struct WorkerDirectory {
    store: Arc<dyn Store>,
}

impl WorkerDirectory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Active, available workers offering `service_type`, best first
    pub async fn find_available_workers(
        &self,
        service_type: ServiceType,
        min_rating: Option<f64>,
    ) -> DomainResult<Vec<WorkerCandidate>> {
        if min_rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
            return Err(DomainError::Validation(
                "minRating must be between 0 and 5".to_string(),
            ));
        }

        let candidates = self.store.list_worker_candidates(service_type).await?;
        Ok(rank_candidates(candidates, min_rating))
    }
}

//! Worker discovery and worker self-service

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use marketplace::{
    DomainError,
    models::{Role, ServiceType, Worker},
    permissions::Actor,
    store::{UserStore, WorkerStore},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::success;
use crate::{
    error::{ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableQuery {
    pub service_type: ServiceType,
    pub min_rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

/// Public view of a worker
#[derive(Debug, Serialize)]
pub struct WorkerProfile {
    #[serde(flatten)]
    pub worker: Worker,
    pub name: String,
}

pub async fn available_workers(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<impl IntoResponse> {
    let candidates = state
        .workers
        .find_available_workers(query.service_type, query.min_rating)
        .await?;
    Ok(success(candidates))
}

pub async fn get_worker(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let worker = state
        .store
        .find_worker(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Worker"))?;
    let user = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Worker"))?;

    Ok(success(WorkerProfile {
        worker,
        name: user.name,
    }))
}

pub async fn set_availability(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppJson(request): AppJson<AvailabilityRequest>,
) -> ApiResult<impl IntoResponse> {
    actor.require_role(Role::Worker)?;

    let worker = state
        .store
        .set_worker_availability(actor.id, request.is_available)
        .await?;
    info!(worker_id = %actor.id, is_available = request.is_available, "Availability changed");
    Ok(success(worker))
}

pub async fn check_in(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    actor.require_role(Role::Worker)?;

    let now = Utc::now();
    let record = state
        .store
        .check_in(actor.id, now.date_naive(), now)
        .await?;
    Ok(success(record))
}

pub async fn check_out(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    actor.require_role(Role::Worker)?;

    let now = Utc::now();
    let record = state
        .store
        .check_out(actor.id, now.date_naive(), now)
        .await?;
    Ok(success(record))
}

pub async fn attendance(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    actor.require_role(Role::Worker)?;
    Ok(success(state.store.list_attendance(actor.id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use marketplace::models::Role;
    use serde_json::json;

    use crate::routes::testing::Harness;

    #[tokio::test]
    async fn test_available_workers_are_ranked() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;
        let (low, _) = h.user("Ravi", Role::Worker).await;
        let (high, _) = h.user("Kiran", Role::Worker).await;
        h.store.set_worker_rating(low.id, 3.9).await;
        h.store.set_worker_rating(high.id, 4.7).await;

        let (status, body) = h
            .send(
                "GET",
                "/api/workers/available?serviceType=cleaning",
                Some(&customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Kiran", "Ravi"]);

        let (_, body) = h
            .send(
                "GET",
                "/api/workers/available?serviceType=cleaning&minRating=4",
                Some(&customer),
                None,
            )
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = h
            .send(
                "GET",
                "/api/workers/available?serviceType=laundry&minRating=9",
                Some(&customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unavailable_worker_is_hidden() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;
        let (_, worker) = h.user("Ravi", Role::Worker).await;

        let (status, body) = h
            .send(
                "PATCH",
                "/api/workers/me/availability",
                Some(&worker),
                Some(json!({ "isAvailable": false })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isAvailable"], false);

        let (_, body) = h
            .send(
                "GET",
                "/api/workers/available?serviceType=cleaning",
                Some(&customer),
                None,
            )
            .await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attendance_flow() {
        let h = Harness::new();
        let (_, worker) = h.user("Ravi", Role::Worker).await;

        let (status, _) = h
            .send("POST", "/api/workers/me/check-out", Some(&worker), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h
            .send("POST", "/api/workers/me/check-in", Some(&worker), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h
            .send("POST", "/api/workers/me/check-in", Some(&worker), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = h
            .send("POST", "/api/workers/me/check-out", Some(&worker), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["checkOut"].is_string());

        let (status, _) = h
            .send("POST", "/api/workers/me/check-out", Some(&worker), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = h
            .send("GET", "/api/workers/me/attendance", Some(&worker), None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_service_is_for_workers_only() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;

        let (status, _) = h
            .send("POST", "/api/workers/me/check-in", Some(&customer), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_get_worker_profile() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;
        let (worker, _) = h.user("Ravi", Role::Worker).await;

        let (status, body) = h
            .send(
                "GET",
                &format!("/api/workers/{}", worker.id),
                Some(&customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Ravi");
        assert_eq!(body["data"]["services"][0], "cleaning");

        let (status, _) = h
            .send(
                "GET",
                &format!("/api/workers/{}", uuid::Uuid::new_v4()),
                Some(&customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! Booking endpoints

use axum::{
    Extension,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use marketplace::{
    models::{BookingDraft, BookingStatus, Role},
    permissions::Actor,
};
use serde::Deserialize;
use uuid::Uuid;

use super::success;
use crate::{
    error::{ApiError, ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    /// Defaults to the caller when a worker accepts a job
    #[serde(default)]
    pub worker_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppJson(draft): AppJson<BookingDraft>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.bookings.create(&actor, draft).await?;
    Ok((StatusCode::CREATED, success(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.bookings.list(&actor, query.status).await?))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.bookings.get(&actor, id).await?))
}

pub async fn assign_worker(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    body: Option<AppJson<AssignRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = body.map(|AppJson(r)| r).unwrap_or_default();

    let worker_id = match (request.worker_id, actor.role) {
        (Some(worker_id), _) => worker_id,
        (None, Role::Worker) => actor.id,
        (None, _) => return Err(ApiError::BadRequest("workerId is required".to_string())),
    };

    Ok(success(
        state.bookings.assign_worker(&actor, id, worker_id).await?,
    ))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    AppJson(request): AppJson<StatusRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(
        state.bookings.update_status(&actor, id, request.status).await?,
    ))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    body: Option<AppJson<CancelRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = body.map(|AppJson(r)| r).unwrap_or_default();
    Ok(success(
        state.bookings.cancel(&actor, id, request.reason).await?,
    ))
}

/// Pay for a booking from the customer's wallet
pub async fn pay_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.bookings.pay(&actor, id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use marketplace::{
        models::Role,
        store::{LedgerStore, WorkerStore},
    };
    use rust_decimal::Decimal;
    use serde_json::{Value, json};

    use crate::routes::testing::Harness;

    fn draft() -> Value {
        json!({
            "serviceType": "cleaning",
            "scheduledDate": "2025-01-10",
            "scheduledTime": "10:00:00",
            "address": "4 Park Street",
            "price": "599",
        })
    }

    async fn create(h: &Harness, token: &str) -> String {
        let (status, body) = h
            .send("POST", "/api/bookings", Some(token), Some(draft()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_full_lifecycle_records_commission() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;
        let (worker, worker_token) = h.user("Ravi", Role::Worker).await;
        let id = create(&h, &customer).await;

        let (status, body) = h
            .send(
                "POST",
                &format!("/api/bookings/{}/assign", id),
                Some(&worker_token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "assigned");

        for next in ["confirmed", "in-progress", "completed"] {
            let (status, body) = h
                .send(
                    "PATCH",
                    &format!("/api/bookings/{}/status", id),
                    Some(&worker_token),
                    Some(json!({ "status": next })),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "moving to {}", next);
            assert_eq!(body["data"]["status"], next);
        }

        let profile = h.store.find_worker(worker.id).await.unwrap().unwrap();
        assert_eq!(profile.pending_payouts, Decimal::new(47920, 2));

        let commission = h
            .store
            .find_transaction_by_reference(&format!("booking:{}:commission", id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(commission.amount, Decimal::new(11980, 2));
    }

    #[tokio::test]
    async fn test_skipping_a_state_is_a_conflict() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;
        let (_, worker_token) = h.user("Ravi", Role::Worker).await;
        let id = create(&h, &customer).await;
        h.send(
            "POST",
            &format!("/api/bookings/{}/assign", id),
            Some(&worker_token),
            None,
        )
        .await;

        let (status, body) = h
            .send(
                "PATCH",
                &format!("/api/bookings/{}/status", id),
                Some(&worker_token),
                Some(json!({ "status": "completed" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_workers_cannot_create_bookings() {
        let h = Harness::new();
        let (_, worker_token) = h.user("Ravi", Role::Worker).await;

        let (status, _) = h
            .send("POST", "/api/bookings", Some(&worker_token), Some(draft()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;

        let (status, body) = h
            .send(
                "POST",
                "/api/bookings",
                Some(&customer),
                Some(json!({ "serviceType": "cleaning" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("address"));
    }

    #[tokio::test]
    async fn test_listing_is_scoped_to_the_caller() {
        let h = Harness::new();
        let (_, asha) = h.user("Asha", Role::Customer).await;
        let (_, meera) = h.user("Meera", Role::Customer).await;
        let (_, admin) = h.user("Admin", Role::Admin).await;
        create(&h, &asha).await;
        create(&h, &asha).await;
        create(&h, &meera).await;

        let (_, mine) = h.send("GET", "/api/bookings", Some(&asha), None).await;
        assert_eq!(mine["data"].as_array().unwrap().len(), 2);

        let (_, all) = h.send("GET", "/api/bookings", Some(&admin), None).await;
        assert_eq!(all["data"].as_array().unwrap().len(), 3);

        let (_, pending) = h
            .send("GET", "/api/bookings?status=pending", Some(&admin), None)
            .await;
        assert_eq!(pending["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_strangers_cannot_view() {
        let h = Harness::new();
        let (_, asha) = h.user("Asha", Role::Customer).await;
        let (_, meera) = h.user("Meera", Role::Customer).await;
        let id = create(&h, &asha).await;

        let (status, _) = h
            .send("GET", &format!("/api/bookings/{}", id), Some(&meera), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_pay_then_cancel_refunds() {
        let h = Harness::new();
        let (customer, token) = h.user("Asha", Role::Customer).await;
        h.state
            .ledger
            .credit(
                customer.id,
                Decimal::new(1000, 0),
                marketplace::models::TransactionKind::Payment,
                "razorpay",
                "razorpay:pay_seed".to_string(),
                None,
            )
            .await
            .unwrap();
        let id = create(&h, &token).await;

        let (status, body) = h
            .send("POST", &format!("/api/bookings/{}/pay", id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["direction"], "debit");
        assert_eq!(
            h.store.wallet_balance(customer.id).await.unwrap(),
            Decimal::new(401, 0)
        );

        let (status, _) = h
            .send("POST", &format!("/api/bookings/{}/pay", id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = h
            .send(
                "POST",
                &format!("/api/bookings/{}/cancel", id),
                Some(&token),
                Some(json!({ "reason": "  plans changed " })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
        assert_eq!(body["data"]["cancellationReason"], "plans changed");
        assert_eq!(
            h.store.wallet_balance(customer.id).await.unwrap(),
            Decimal::new(1000, 0)
        );
    }

    #[tokio::test]
    async fn test_pay_without_funds_is_unprocessable() {
        let h = Harness::new();
        let (_, token) = h.user("Asha", Role::Customer).await;
        let id = create(&h, &token).await;

        let (status, _) = h
            .send("POST", &format!("/api/bookings/{}/pay", id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_cancel_without_body() {
        let h = Harness::new();
        let (_, token) = h.user("Asha", Role::Customer).await;
        let id = create(&h, &token).await;

        let (status, body) = h
            .send(
                "POST",
                &format!("/api/bookings/{}/cancel", id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_admin_assign_needs_worker_id() {
        let h = Harness::new();
        let (_, customer) = h.user("Asha", Role::Customer).await;
        let (_, admin) = h.user("Admin", Role::Admin).await;
        let id = create(&h, &customer).await;

        let (status, _) = h
            .send(
                "POST",
                &format!("/api/bookings/{}/assign", id),
                Some(&admin),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

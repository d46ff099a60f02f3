//! Wallet balance and ledger history

use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use marketplace::{
    models::{TransactionFilter, TransactionKind},
    permissions::Actor,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::success;
use crate::{error::ApiResult, state::AppState};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub booking_id: Option<Uuid>,
    /// Admins only; everyone else sees their own entries
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl HistoryQuery {
    fn into_filter(self, actor: &Actor) -> TransactionFilter {
        let party_id = if actor.is_admin() {
            self.user_id
        } else {
            Some(actor.id)
        };

        TransactionFilter {
            party_id,
            kind: self.kind,
            booking_id: self.booking_id,
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
        }
    }
}

pub async fn wallet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    let balance = state.ledger.balance(actor.id).await?;
    Ok(success(json!({ "balance": balance })))
}

pub async fn transactions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.into_filter(&actor);
    Ok(success(state.ledger.transactions(&filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use marketplace::models::Role;
    use rust_decimal::Decimal;

    use crate::routes::testing::Harness;

    #[test]
    fn test_non_admins_are_pinned_to_themselves() {
        let customer = Actor::new(Uuid::new_v4(), Role::Customer);
        let other = Uuid::new_v4();

        let filter = HistoryQuery {
            user_id: Some(other),
            limit: Some(10_000),
            ..HistoryQuery::default()
        }
        .into_filter(&customer);
        assert_eq!(filter.party_id, Some(customer.id));
        assert_eq!(filter.limit, Some(MAX_LIMIT));

        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        let filter = HistoryQuery {
            user_id: Some(other),
            ..HistoryQuery::default()
        }
        .into_filter(&admin);
        assert_eq!(filter.party_id, Some(other));
    }

    #[tokio::test]
    async fn test_history_filters_by_type() {
        let h = Harness::new();
        let (customer, token) = h.user("Asha", Role::Customer).await;
        let (_, other) = h.user("Meera", Role::Customer).await;

        for n in 0..2 {
            h.state
                .ledger
                .credit(
                    customer.id,
                    Decimal::new(100, 0),
                    TransactionKind::Payment,
                    "razorpay",
                    format!("razorpay:pay_{}", n),
                    None,
                )
                .await
                .unwrap();
        }
        h.state
            .ledger
            .credit(
                customer.id,
                Decimal::new(50, 0),
                TransactionKind::Refund,
                "wallet",
                "booking:x:refund".to_string(),
                None,
            )
            .await
            .unwrap();

        let (status, body) = h
            .send("GET", "/api/transactions", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);

        let (_, body) = h
            .send("GET", "/api/transactions?type=refund", Some(&token), None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["type"], "refund");

        let (_, body) = h
            .send("GET", "/api/transactions", Some(&other), None)
            .await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let (_, wallet) = h.send("GET", "/api/wallet", Some(&token), None).await;
        assert_eq!(wallet["data"]["balance"], "250");
    }
}

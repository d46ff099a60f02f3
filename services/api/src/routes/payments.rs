//! Razorpay checkout endpoints

use axum::{Extension, extract::State, response::IntoResponse};
use marketplace::{payment::CheckoutResult, permissions::Actor};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::success;
use crate::{
    error::{ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    AppJson(request): AppJson<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state
        .payments
        .create_order(request.amount, request.currency.as_deref(), request.receipt)
        .await?;
    Ok(success(order))
}

/// Verify a checkout and credit the caller's wallet
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppJson(checkout): AppJson<CheckoutResult>,
) -> ApiResult<impl IntoResponse> {
    let tx = state.payments.verify(actor.id, &checkout).await?;
    let balance = state.ledger.balance(actor.id).await?;

    Ok(success(serde_json::json!({
        "transaction": tx,
        "balance": balance,
    })))
}

//! Admin dashboard endpoints

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use marketplace::{
    models::Role,
    permissions::Actor,
    store::{AdminStore, UserStore, WorkerStore},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::success;
use crate::{
    error::{ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettleRequest {
    /// Settlement day, today (UTC) when omitted
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    actor.require_admin()?;
    Ok(success(state.store.dashboard_stats().await?))
}

pub async fn users(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<UsersQuery>,
) -> ApiResult<impl IntoResponse> {
    actor.require_admin()?;
    Ok(success(state.store.list_users(query.role).await?))
}

pub async fn deactivate_worker(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    actor.require_admin()?;

    let worker = state.store.deactivate_worker(id).await?;
    info!(worker_id = %id, admin_id = %actor.id, "Worker deactivated");
    Ok(success(worker))
}

pub async fn settle_payouts(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Option<AppJson<SettleRequest>>,
) -> ApiResult<impl IntoResponse> {
    actor.require_admin()?;

    let request = body.map(|AppJson(r)| r).unwrap_or_default();
    let date = request.date.unwrap_or_else(|| Utc::now().date_naive());

    let report = state.ledger.settle_payouts(date).await?;
    info!(
        %date,
        settled = report.settled.len(),
        total = %report.total,
        failures = report.failures,
        "Manual payout settlement"
    );
    Ok(success(report))
}

pub async fn contacts(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    actor.require_admin()?;
    Ok(success(state.store.list_contacts().await?))
}

//! Wallet ledger and payout settlement
//!
//! The ledger is append-only. A wallet balance is a cached sum that the store
//! updates in the same write as each wallet-moving entry.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{DomainError, DomainResult},
    models::{
        Booking, Direction, NewTransaction, Transaction, TransactionFilter, TransactionKind,
        TransactionStatus, transaction::reference,
    },
    store::{BookingStore, LedgerStore, Store, WorkerStore},
};

/// Summary of one settlement run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub date: Option<NaiveDate>,
    pub settled: Vec<Transaction>,
    pub total: Decimal,
    pub failures: usize,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Credit a user's wallet.
    ///
    /// `kind` is `Payment` for top-ups and `Refund` for returned booking
    /// payments. `reference` makes the credit idempotent.
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        kind: TransactionKind,
        method: &str,
        reference: String,
        booking_id: Option<Uuid>,
    ) -> DomainResult<Transaction> {
        self.append_wallet(user_id, amount, kind, Direction::Credit, method, reference, booking_id)
            .await
    }

    /// Debit a user's wallet; fails with `InsufficientFunds` and leaves the
    /// balance untouched when it would go negative.
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: &str,
        reference: String,
        booking_id: Option<Uuid>,
    ) -> DomainResult<Transaction> {
        self.append_wallet(
            user_id,
            amount,
            TransactionKind::Payment,
            Direction::Debit,
            method,
            reference,
            booking_id,
        )
        .await
    }

    /// Debit the booking price from its customer's wallet. The store holds
    /// the booking while appending, so a paid booking cannot be cancelled
    /// without its refund and a cancelled one cannot be paid.
    pub async fn pay_booking(&self, booking: &Booking) -> DomainResult<Transaction> {
        let entry = wallet_entry(
            booking.customer_id,
            booking.price,
            TransactionKind::Payment,
            Direction::Debit,
            "wallet",
            reference::booking_payment(booking.id),
            Some(booking.id),
        )?;

        let tx = self.store.pay_booking(booking.id, entry).await?;
        info!(
            user_id = %booking.customer_id,
            booking_id = %booking.id,
            amount = %tx.amount,
            "Booking payment debited"
        );
        Ok(tx)
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_wallet(
        &self,
        user_id: Uuid,
        amount: Decimal,
        kind: TransactionKind,
        direction: Direction,
        method: &str,
        reference: String,
        booking_id: Option<Uuid>,
    ) -> DomainResult<Transaction> {
        let entry = wallet_entry(user_id, amount, kind, direction, method, reference, booking_id)?;
        let tx = self.store.append_transaction(entry).await?;

        info!(
            user_id = %user_id,
            amount = %amount,
            direction = %direction,
            reference = ?tx.reference,
            "Wallet updated"
        );
        Ok(tx)
    }

    pub async fn balance(&self, user_id: Uuid) -> DomainResult<Decimal> {
        self.store.wallet_balance(user_id).await
    }

    pub async fn transactions(&self, filter: &TransactionFilter) -> DomainResult<Vec<Transaction>> {
        self.store.list_transactions(filter).await
    }

    /// Convert every active worker's pending payouts into a salary entry for
    /// `date`. Each worker settles at most once per date; a failure for one
    /// worker is logged and the batch continues.
    pub async fn settle_payouts(&self, date: NaiveDate) -> DomainResult<SettlementReport> {
        let workers = self.store.workers_with_pending_payouts().await?;
        let mut report = SettlementReport {
            date: Some(date),
            ..SettlementReport::default()
        };

        for worker_id in workers {
            match self.store.settle_worker(worker_id, date).await {
                Ok(Some(tx)) => {
                    report.total += tx.amount;
                    report.settled.push(tx);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker_id = %worker_id, error = %e, "Payout settlement failed");
                    report.failures += 1;
                }
            }
        }

        info!(
            date = %date,
            settled = report.settled.len(),
            total = %report.total,
            failures = report.failures,
            "Payout settlement finished"
        );
        Ok(report)
    }
}

/// Largest amount a NUMERIC(12,2) ledger or booking column can hold
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Money amounts are positive, at most `MAX_AMOUNT`, with at most two
/// decimal places
pub fn validate_amount(amount: Decimal) -> DomainResult<()> {
    validate_money("amount", amount)
}

/// `validate_amount` for a named field
pub fn validate_money(field: &str, amount: Decimal) -> DomainResult<()> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "{} must be greater than zero",
            field
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(DomainError::Validation(format!(
            "{} cannot exceed {}",
            field, MAX_AMOUNT
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(DomainError::Validation(format!(
            "{} cannot have more than two decimal places",
            field
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn wallet_entry(
    user_id: Uuid,
    amount: Decimal,
    kind: TransactionKind,
    direction: Direction,
    method: &str,
    reference: String,
    booking_id: Option<Uuid>,
) -> DomainResult<NewTransaction> {
    validate_amount(amount)?;
    if !kind.affects_wallet() {
        return Err(DomainError::Validation(format!(
            "{} entries do not move a wallet",
            kind
        )));
    }

    Ok(NewTransaction {
        user_id: Some(user_id),
        worker_id: None,
        booking_id,
        kind,
        direction,
        amount,
        method: method.to_string(),
        status: TransactionStatus::Completed,
        reference: Some(reference),
    })
}

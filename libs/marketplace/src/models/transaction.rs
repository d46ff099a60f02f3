//! Ledger transaction model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Commission,
    Salary,
    Refund,
}

text_enum!(TransactionKind, "transaction type" {
    Payment => "payment",
    Commission => "commission",
    Salary => "salary",
    Refund => "refund",
});

impl TransactionKind {
    /// Payments and refunds move money in and out of a user's wallet;
    /// commissions and salaries are platform-side bookkeeping.
    pub fn affects_wallet(self) -> bool {
        matches!(self, TransactionKind::Payment | TransactionKind::Refund)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

text_enum!(Direction, "direction" {
    Credit => "credit",
    Debit => "debit",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

text_enum!(TransactionStatus, "transaction status" {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub worker_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount: Decimal,
    pub method: String,
    pub status: TransactionStatus,
    /// Unique idempotency key
    pub reference: Option<String>,
    pub date: DateTime<Utc>,
}

impl Transaction {
    /// Amount with the sign of its direction
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Ledger entry to append
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Option<Uuid>,
    pub worker_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount: Decimal,
    pub method: String,
    pub status: TransactionStatus,
    pub reference: Option<String>,
}

impl NewTransaction {
    pub fn into_transaction(self, date: DateTime<Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            worker_id: self.worker_id,
            booking_id: self.booking_id,
            kind: self.kind,
            direction: self.direction,
            amount: self.amount,
            method: self.method,
            status: self.status,
            reference: self.reference,
            date,
        }
    }

    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    /// Credit returning a booking payment to the wallet it came from
    pub fn refund_of(payment: &Transaction, booking_id: Uuid) -> Self {
        Self {
            user_id: payment.user_id,
            worker_id: None,
            booking_id: Some(booking_id),
            kind: TransactionKind::Refund,
            direction: Direction::Credit,
            amount: payment.amount,
            method: "wallet".to_string(),
            status: TransactionStatus::Completed,
            reference: Some(reference::booking_refund(booking_id)),
        }
    }

    /// Whether appending this entry changes a wallet balance
    pub fn moves_wallet(&self) -> bool {
        self.kind.affects_wallet()
            && self.status == TransactionStatus::Completed
            && self.user_id.is_some()
    }
}

/// Ledger reference keys. Each one can appear at most once in the ledger.
pub mod reference {
    use super::*;

    pub fn provider_payment(payment_id: &str) -> String {
        format!("razorpay:{}", payment_id)
    }

    pub fn booking_payment(booking_id: Uuid) -> String {
        format!("booking:{}:payment", booking_id)
    }

    pub fn booking_refund(booking_id: Uuid) -> String {
        format!("booking:{}:refund", booking_id)
    }

    pub fn booking_commission(booking_id: Uuid) -> String {
        format!("booking:{}:commission", booking_id)
    }

    pub fn payout(worker_id: Uuid, on: NaiveDate) -> String {
        format!("payout:{}:{}", worker_id, on)
    }
}

/// History filter; `None` fields are unconstrained
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Matches entries where the party is either the user or the worker
    pub party_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub booking_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.party_id
            .is_none_or(|id| tx.user_id == Some(id) || tx.worker_id == Some(id))
            && self.kind.is_none_or(|k| tx.kind == k)
            && self.booking_id.is_none_or(|b| tx.booking_id == Some(b))
    }
}

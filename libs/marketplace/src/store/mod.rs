//! Repository traits for marketplace persistence
//!
//! Implementations:
//! - `PgStore`: PostgreSQL storage used by every service
//! - `MemoryStore`: in-process storage for tests (feature `test-support`)
//!
//! Methods that change more than one record are atomic: the status change,
//! ledger entry and balance update they describe either all happen or none
//! do. Ledger `reference` values are unique; appending a duplicate fails
//! with `DomainError::Conflict`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::DomainResult,
    models::{
        Attendance, Booking, BookingFilter, BookingStatus, ContactMessage, NewBooking,
        NewContactMessage, NewOtp, NewTransaction, NewUser, NewWorkerProfile, Otp, Role,
        ServiceType, Transaction, TransactionFilter, User, Worker, WorkerCandidate,
    },
};

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user, and their worker profile when one is given.
    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(
        &self,
        new_user: NewUser,
        worker: Option<NewWorkerProfile>,
    ) -> DomainResult<User>;

    async fn find_user(&self, id: Uuid) -> DomainResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> DomainResult<Option<User>>;

    async fn find_user_by_phone(&self, phone: &str) -> DomainResult<Option<User>>;

    async fn list_users(&self, role: Option<Role>) -> DomainResult<Vec<User>>;
}

#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn find_worker(&self, id: Uuid) -> DomainResult<Option<Worker>>;

    /// Active, available workers offering `service_type`, with their current
    /// number of active assignments
    async fn list_worker_candidates(
        &self,
        service_type: ServiceType,
    ) -> DomainResult<Vec<WorkerCandidate>>;

    async fn set_worker_availability(&self, id: Uuid, is_available: bool) -> DomainResult<Worker>;

    /// Deactivated workers are also made unavailable
    async fn deactivate_worker(&self, id: Uuid) -> DomainResult<Worker>;

    /// Active workers with money owed
    async fn workers_with_pending_payouts(&self) -> DomainResult<Vec<Uuid>>;

    /// Convert the worker's pending payouts into a salary transaction.
    ///
    /// Returns `None` when nothing is owed or the worker was already settled
    /// on `on`.
    async fn settle_worker(&self, id: Uuid, on: NaiveDate) -> DomainResult<Option<Transaction>>;

    async fn check_in(
        &self,
        worker_id: Uuid,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> DomainResult<Attendance>;

    async fn check_out(
        &self,
        worker_id: Uuid,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> DomainResult<Attendance>;

    async fn list_attendance(&self, worker_id: Uuid) -> DomainResult<Vec<Attendance>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_booking(&self, new_booking: NewBooking) -> DomainResult<Booking>;

    async fn find_booking(&self, id: Uuid) -> DomainResult<Option<Booking>>;

    /// Newest first
    async fn list_bookings(&self, filter: &BookingFilter) -> DomainResult<Vec<Booking>>;

    /// Compare-and-set the status. `worker_id`, when given, is attached in the
    /// same write. Returns `None` if the booking is no longer in `from`.
    async fn advance_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        worker_id: Option<Uuid>,
    ) -> DomainResult<Option<Booking>>;

    /// Move an in-progress booking to completed, append its commission and
    /// add `payout` to the worker's pending payouts.
    async fn complete_booking(
        &self,
        id: Uuid,
        commission: NewTransaction,
        payout: Decimal,
    ) -> DomainResult<Option<(Booking, Transaction)>>;

    /// Cancel a booking still in `from`. A completed wallet payment for the
    /// booking is refunded in the same write, with the booking row held so a
    /// concurrent `pay_booking` either lands before the refund or not at all.
    async fn cancel_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        reason: Option<String>,
    ) -> DomainResult<Option<(Booking, Option<Transaction>)>>;

    /// Append the wallet debit paying for a booking while holding the
    /// booking row. Fails with `Conflict` when the booking is cancelled or
    /// already paid, and `NotFound` when it does not exist.
    async fn pay_booking(&self, id: Uuid, payment: NewTransaction) -> DomainResult<Transaction>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry. Wallet-moving entries update the user's balance in
    /// the same write; a debit larger than the balance fails with
    /// `InsufficientFunds` and changes nothing.
    async fn append_transaction(&self, entry: NewTransaction) -> DomainResult<Transaction>;

    async fn wallet_balance(&self, user_id: Uuid) -> DomainResult<Decimal>;

    /// Newest first
    async fn list_transactions(&self, filter: &TransactionFilter)
    -> DomainResult<Vec<Transaction>>;

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> DomainResult<Option<Transaction>>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn dashboard_stats(&self) -> DomainResult<DashboardStats>;

    async fn insert_contact(&self, message: NewContactMessage) -> DomainResult<ContactMessage>;

    async fn list_contacts(&self) -> DomainResult<Vec<ContactMessage>>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert_otp(&self, otp: NewOtp) -> DomainResult<Otp>;

    /// Most recent unconsumed, unexpired code for `target`
    async fn latest_live_otp(&self, target: &str, now: DateTime<Utc>)
    -> DomainResult<Option<Otp>>;

    /// Mark a code used; `false` if it was already consumed
    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool>;

    /// Delete expired codes, returning how many were removed
    async fn purge_expired_otps(&self, now: DateTime<Utc>) -> DomainResult<u64>;
}

/// Everything the services need from persistence
pub trait Store:
    UserStore + WorkerStore + BookingStore + LedgerStore + AdminStore + OtpStore
{
}

impl<T> Store for T where
    T: UserStore + WorkerStore + BookingStore + LedgerStore + AdminStore + OtpStore
{
}

/// Aggregates behind the admin dashboard
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub users_by_role: BTreeMap<String, i64>,
    pub bookings_by_status: BTreeMap<String, i64>,
    pub commission_revenue: Decimal,
    pub pending_payouts: Decimal,
    pub settled_payouts: Decimal,
}

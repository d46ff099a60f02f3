//! In-memory store for tests
//!
//! All state sits behind one lock, so every multi-record operation is
//! trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AdminStore, BookingStore, DashboardStats, LedgerStore, OtpStore, UserStore, WorkerStore,
};
use crate::{
    error::{DomainError, DomainResult},
    models::{
        Attendance, Booking, BookingFilter, BookingStatus, ContactMessage, Direction, NewBooking,
        NewContactMessage, NewOtp, NewTransaction, NewUser, NewWorkerProfile, Otp, Role,
        ServiceType, Transaction, TransactionFilter, TransactionKind, TransactionStatus, User,
        Worker, WorkerCandidate, transaction::reference,
    },
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    workers: HashMap<Uuid, Worker>,
    bookings: HashMap<Uuid, Booking>,
    transactions: Vec<Transaction>,
    attendance: Vec<Attendance>,
    contacts: Vec<ContactMessage>,
    otps: Vec<Otp>,
}

impl MemoryState {
    fn append(&mut self, entry: NewTransaction) -> DomainResult<Transaction> {
        // Mirrors the amount check constraint on the transactions table
        if entry.amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if let Some(reference) = &entry.reference {
            if self
                .transactions
                .iter()
                .any(|t| t.reference.as_deref() == Some(reference.as_str()))
            {
                return Err(DomainError::Conflict(format!(
                    "ledger entry {} already exists",
                    reference
                )));
            }
        }

        if entry.moves_wallet() {
            let user_id = entry.user_id.unwrap_or_default();
            let user = self
                .users
                .get_mut(&user_id)
                .ok_or_else(|| DomainError::not_found("User"))?;

            let next = user.wallet_balance + entry.signed_amount();
            if next < Decimal::ZERO {
                return Err(DomainError::InsufficientFunds {
                    balance: user.wallet_balance,
                    requested: entry.amount,
                });
            }
            user.wallet_balance = next;
        }

        let tx = entry.into_transaction(Utc::now());
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    fn active_assignments(&self, worker_id: Uuid) -> i64 {
        self.bookings
            .values()
            .filter(|b| b.worker_id == Some(worker_id) && b.status.is_active_assignment())
            .count() as i64
    }
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a worker's rating; ratings have no write path of their own
    pub async fn set_worker_rating(&self, id: Uuid, rating: f64) {
        if let Some(worker) = self.state.write().await.workers.get_mut(&id) {
            worker.rating = rating;
        }
    }

    /// Accrue a payout outside the booking flow
    pub async fn credit_pending_payout(&self, id: Uuid, amount: Decimal) {
        if let Some(worker) = self.state.write().await.workers.get_mut(&id) {
            worker.pending_payouts += amount;
        }
    }

    /// Signed sum of the user's completed wallet entries
    pub async fn ledger_sum(&self, user_id: Uuid) -> Decimal {
        self.state
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| {
                t.user_id == Some(user_id)
                    && t.kind.affects_wallet()
                    && t.status == TransactionStatus::Completed
            })
            .map(Transaction::signed_amount)
            .sum()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(
        &self,
        new_user: NewUser,
        worker: Option<NewWorkerProfile>,
    ) -> DomainResult<User> {
        let mut state = self.state.write().await;

        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(DomainError::Conflict("Email already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            phone: new_user.phone,
            wallet_balance: Decimal::ZERO,
            is_active: true,
            created_at: now,
        };

        if let Some(profile) = worker {
            state.workers.insert(
                user.id,
                Worker {
                    id: user.id,
                    services: profile.services,
                    is_available: true,
                    pending_payouts: Decimal::ZERO,
                    rating: 0.0,
                    skills: profile.skills,
                    is_active: true,
                    last_settled_on: None,
                    created_at: now,
                },
            );
        }

        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> DomainResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> DomainResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> DomainResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[async_trait]
impl WorkerStore for MemoryStore {
    async fn find_worker(&self, id: Uuid) -> DomainResult<Option<Worker>> {
        Ok(self.state.read().await.workers.get(&id).cloned())
    }

    async fn list_worker_candidates(
        &self,
        service_type: ServiceType,
    ) -> DomainResult<Vec<WorkerCandidate>> {
        let state = self.state.read().await;

        Ok(state
            .workers
            .values()
            .filter(|w| w.is_active && w.is_available && w.offers(service_type))
            .map(|w| WorkerCandidate {
                worker: w.clone(),
                name: state
                    .users
                    .get(&w.id)
                    .map(|u| u.name.clone())
                    .unwrap_or_default(),
                active_assignments: state.active_assignments(w.id),
            })
            .collect())
    }

    async fn set_worker_availability(&self, id: Uuid, is_available: bool) -> DomainResult<Worker> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Worker"))?;
        worker.is_available = is_available;
        Ok(worker.clone())
    }

    async fn deactivate_worker(&self, id: Uuid) -> DomainResult<Worker> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Worker"))?;
        worker.is_active = false;
        worker.is_available = false;
        let worker = worker.clone();

        if let Some(user) = state.users.get_mut(&id) {
            user.is_active = false;
        }
        Ok(worker)
    }

    async fn workers_with_pending_payouts(&self) -> DomainResult<Vec<Uuid>> {
        Ok(self
            .state
            .read()
            .await
            .workers
            .values()
            .filter(|w| w.is_active && w.pending_payouts > Decimal::ZERO)
            .map(|w| w.id)
            .collect())
    }

    async fn settle_worker(&self, id: Uuid, on: NaiveDate) -> DomainResult<Option<Transaction>> {
        let mut state = self.state.write().await;

        let worker = state
            .workers
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Worker"))?;
        if worker.pending_payouts <= Decimal::ZERO || worker.last_settled_on == Some(on) {
            return Ok(None);
        }
        let amount = worker.pending_payouts;

        let tx = state.append(NewTransaction {
            user_id: None,
            worker_id: Some(id),
            booking_id: None,
            kind: TransactionKind::Salary,
            direction: Direction::Credit,
            amount,
            method: "bank-transfer".to_string(),
            status: TransactionStatus::Completed,
            reference: Some(reference::payout(id, on)),
        })?;

        if let Some(worker) = state.workers.get_mut(&id) {
            worker.pending_payouts = Decimal::ZERO;
            worker.last_settled_on = Some(on);
        }
        Ok(Some(tx))
    }

    async fn check_in(
        &self,
        worker_id: Uuid,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> DomainResult<Attendance> {
        let mut state = self.state.write().await;
        if !state.workers.contains_key(&worker_id) {
            return Err(DomainError::not_found("Worker"));
        }
        if state
            .attendance
            .iter()
            .any(|a| a.worker_id == worker_id && a.work_date == on)
        {
            return Err(DomainError::Conflict("Already checked in today".to_string()));
        }

        let record = Attendance {
            id: Uuid::new_v4(),
            worker_id,
            work_date: on,
            check_in: at,
            check_out: None,
        };
        state.attendance.push(record.clone());
        Ok(record)
    }

    async fn check_out(
        &self,
        worker_id: Uuid,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> DomainResult<Attendance> {
        let mut state = self.state.write().await;
        let record = state
            .attendance
            .iter_mut()
            .find(|a| a.worker_id == worker_id && a.work_date == on)
            .ok_or_else(|| DomainError::not_found("Check-in for today"))?;

        if record.check_out.is_some() {
            return Err(DomainError::Conflict("Already checked out today".to_string()));
        }
        record.check_out = Some(at);
        Ok(record.clone())
    }

    async fn list_attendance(&self, worker_id: Uuid) -> DomainResult<Vec<Attendance>> {
        let mut records: Vec<Attendance> = self
            .state
            .read()
            .await
            .attendance
            .iter()
            .filter(|a| a.worker_id == worker_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.work_date.cmp(&a.work_date));
        Ok(records)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, new_booking: NewBooking) -> DomainResult<Booking> {
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            customer_id: new_booking.customer_id,
            worker_id: None,
            service_type: new_booking.service_type,
            scheduled_date: new_booking.scheduled_date,
            scheduled_time: new_booking.scheduled_time,
            address: new_booking.address,
            price: new_booking.price,
            status: BookingStatus::Pending,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.state
            .write()
            .await
            .bookings
            .insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn find_booking(&self, id: Uuid) -> DomainResult<Option<Booking>> {
        Ok(self.state.read().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> DomainResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .state
            .read()
            .await
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn advance_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        worker_id: Option<Uuid>,
    ) -> DomainResult<Option<Booking>> {
        let mut state = self.state.write().await;
        match state.bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                if worker_id.is_some() {
                    booking.worker_id = worker_id;
                }
                booking.updated_at = Utc::now();
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete_booking(
        &self,
        id: Uuid,
        commission: NewTransaction,
        payout: Decimal,
    ) -> DomainResult<Option<(Booking, Transaction)>> {
        let mut state = self.state.write().await;

        let worker_id = match state.bookings.get(&id) {
            Some(b) if b.status == BookingStatus::InProgress => b.worker_id,
            _ => return Ok(None),
        };

        let tx = state.append(commission)?;

        if let Some(worker) = worker_id.and_then(|w| state.workers.get_mut(&w)) {
            worker.pending_payouts += payout;
        }

        let Some(booking) = state.bookings.get_mut(&id) else {
            return Ok(None);
        };
        booking.status = BookingStatus::Completed;
        booking.updated_at = Utc::now();
        Ok(Some((booking.clone(), tx)))
    }

    async fn cancel_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        reason: Option<String>,
    ) -> DomainResult<Option<(Booking, Option<Transaction>)>> {
        let mut state = self.state.write().await;

        match state.bookings.get(&id) {
            Some(b) if b.status == from => {}
            _ => return Ok(None),
        }

        let payment_ref = reference::booking_payment(id);
        let refund = state
            .transactions
            .iter()
            .find(|t| {
                t.reference.as_deref() == Some(payment_ref.as_str())
                    && t.status == TransactionStatus::Completed
            })
            .map(|payment| NewTransaction::refund_of(payment, id));
        let refund = refund.map(|r| state.append(r)).transpose()?;

        let Some(booking) = state.bookings.get_mut(&id) else {
            return Ok(None);
        };
        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = reason;
        booking.updated_at = Utc::now();
        Ok(Some((booking.clone(), refund)))
    }

    async fn pay_booking(&self, id: Uuid, payment: NewTransaction) -> DomainResult<Transaction> {
        let mut state = self.state.write().await;

        match state.bookings.get(&id) {
            None => return Err(DomainError::not_found("Booking")),
            Some(b) if b.status == BookingStatus::Cancelled => {
                return Err(DomainError::Conflict(
                    "Cannot pay for a cancelled booking".to_string(),
                ));
            }
            Some(_) => {}
        }

        let payment_ref = reference::booking_payment(id);
        if state
            .transactions
            .iter()
            .any(|t| t.reference.as_deref() == Some(payment_ref.as_str()))
        {
            return Err(DomainError::Conflict("Booking already paid".to_string()));
        }

        state.append(payment)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_transaction(&self, entry: NewTransaction) -> DomainResult<Transaction> {
        self.state.write().await.append(entry)
    }

    async fn wallet_balance(&self, user_id: Uuid) -> DomainResult<Decimal> {
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .map(|u| u.wallet_balance)
            .ok_or_else(|| DomainError::not_found("User"))
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> DomainResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);

        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| filter.matches(t))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> DomainResult<Option<Transaction>> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .find(|t| t.reference.as_deref() == Some(reference))
            .cloned())
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn dashboard_stats(&self) -> DomainResult<DashboardStats> {
        let state = self.state.read().await;
        let mut stats = DashboardStats::default();

        for user in state.users.values() {
            *stats
                .users_by_role
                .entry(user.role.as_str().to_string())
                .or_default() += 1;
        }
        for booking in state.bookings.values() {
            *stats
                .bookings_by_status
                .entry(booking.status.as_str().to_string())
                .or_default() += 1;
        }
        for tx in state
            .transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
        {
            match tx.kind {
                TransactionKind::Commission => stats.commission_revenue += tx.amount,
                TransactionKind::Salary => stats.settled_payouts += tx.amount,
                _ => {}
            }
        }
        stats.pending_payouts = state.workers.values().map(|w| w.pending_payouts).sum();

        Ok(stats)
    }

    async fn insert_contact(&self, message: NewContactMessage) -> DomainResult<ContactMessage> {
        let contact = ContactMessage {
            id: Uuid::new_v4(),
            name: message.name,
            email: message.email,
            subject: message.subject,
            message: message.message,
            created_at: Utc::now(),
        };
        self.state.write().await.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn list_contacts(&self) -> DomainResult<Vec<ContactMessage>> {
        Ok(self
            .state
            .read()
            .await
            .contacts
            .iter()
            .rev()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn insert_otp(&self, otp: NewOtp) -> DomainResult<Otp> {
        let otp = Otp {
            id: Uuid::new_v4(),
            target: otp.target,
            code_hash: otp.code_hash,
            expires_at: otp.expires_at,
            consumed_at: None,
            created_at: Utc::now(),
        };
        self.state.write().await.otps.push(otp.clone());
        Ok(otp)
    }

    async fn latest_live_otp(
        &self,
        target: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<Otp>> {
        Ok(self
            .state
            .read()
            .await
            .otps
            .iter()
            .rev()
            .find(|o| o.target == target && o.is_live(now))
            .cloned())
    }

    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        match state
            .otps
            .iter_mut()
            .find(|o| o.id == id && o.consumed_at.is_none())
        {
            Some(otp) => {
                otp.consumed_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired_otps(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let mut state = self.state.write().await;
        let before = state.otps.len();
        state.otps.retain(|o| o.expires_at > now);
        Ok((before - state.otps.len()) as u64)
    }
}

//! Booking lifecycle
//!
//! Every operation checks the status adjacency table first, then the
//! actor's permission, then writes through a compare-and-set on the expected
//! status. Successful changes are published to the booking's room.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{DomainError, DomainResult},
    ledger::Ledger,
    models::{
        Booking, BookingDraft, BookingFilter, BookingStatus, Direction, NewTransaction, Role,
        Transaction, TransactionKind, TransactionStatus, transaction::reference,
    },
    permissions::{Actor, BookingAction, authorize},
    realtime::{BOOKING_UPDATED, Frame, RoomHub, booking_room},
    store::{BookingStore, Store, WorkerStore},
};

/// Platform share of a completed booking unless configured otherwise
pub const DEFAULT_COMMISSION_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// Commission rates are fractions strictly between 0 and 1
pub fn validate_commission_rate(rate: Decimal) -> DomainResult<Decimal> {
    if rate > Decimal::ZERO && rate < Decimal::ONE {
        Ok(rate)
    } else {
        Err(DomainError::Validation(format!(
            "commission rate must be between 0 and 1, got {}",
            rate
        )))
    }
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn Store>,
    ledger: Ledger,
    hub: RoomHub,
    commission_rate: Decimal,
}

impl BookingService {
    pub fn new(store: Arc<dyn Store>, hub: RoomHub, commission_rate: Decimal) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            hub,
            commission_rate,
        }
    }

    /// Platform commission on `price`, rounded to paise
    pub fn commission_for(&self, price: Decimal) -> Decimal {
        (price * self.commission_rate).round_dp(2)
    }

    pub async fn create(&self, actor: &Actor, draft: BookingDraft) -> DomainResult<Booking> {
        actor.require_role(Role::Customer)?;
        let new_booking = draft.validate(actor.id)?;
        if self.commission_for(new_booking.price) <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "price {} is too low to carry a commission",
                new_booking.price
            )));
        }

        let booking = self.store.insert_booking(new_booking).await?;
        info!(
            booking_id = %booking.id,
            customer_id = %booking.customer_id,
            service = %booking.service_type,
            "Booking created"
        );
        Ok(booking)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> DomainResult<Booking> {
        let booking = self.fetch(id).await?;
        authorize(actor, BookingAction::View, &booking)?;
        Ok(booking)
    }

    /// Customers see their own bookings, workers their assignments, admins
    /// everything
    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<BookingStatus>,
    ) -> DomainResult<Vec<Booking>> {
        let mut filter = BookingFilter {
            status,
            ..BookingFilter::default()
        };
        match actor.role {
            Role::Customer => filter.customer_id = Some(actor.id),
            Role::Worker => filter.worker_id = Some(actor.id),
            Role::Admin => {}
        }

        self.store.list_bookings(&filter).await
    }

    pub async fn assign_worker(
        &self,
        actor: &Actor,
        id: Uuid,
        worker_id: Uuid,
    ) -> DomainResult<Booking> {
        let booking = self.fetch(id).await?;

        if booking.worker_id.is_some() {
            return Err(DomainError::Conflict(
                "Booking already has a worker".to_string(),
            ));
        }
        ensure_transition(booking.status, BookingStatus::Assigned)?;
        authorize(actor, BookingAction::Assign { worker_id }, &booking)?;

        let worker = self
            .store
            .find_worker(worker_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Worker"))?;
        if !worker.is_active {
            return Err(DomainError::Conflict("Worker is not active".to_string()));
        }
        if !worker.offers(booking.service_type) {
            return Err(DomainError::Validation(format!(
                "Worker does not offer {}",
                booking.service_type
            )));
        }

        let updated = match self
            .store
            .advance_booking(id, booking.status, BookingStatus::Assigned, Some(worker_id))
            .await?
        {
            Some(updated) => updated,
            None => return Err(self.stale(id, BookingStatus::Assigned).await),
        };

        info!(booking_id = %id, worker_id = %worker_id, "Worker assigned");
        self.announce(&updated).await;
        Ok(updated)
    }

    /// Move a booking along the status machine. Completion records the
    /// commission and accrues the worker's payout in the same write.
    pub async fn update_status(
        &self,
        actor: &Actor,
        id: Uuid,
        to: BookingStatus,
    ) -> DomainResult<Booking> {
        let booking = self.fetch(id).await?;
        ensure_transition(booking.status, to)?;

        match to {
            BookingStatus::Cancelled => return self.cancel(actor, id, None).await,
            BookingStatus::Assigned => {
                return Err(DomainError::Validation(
                    "Assign a worker to move a booking to assigned".to_string(),
                ));
            }
            _ => {}
        }

        authorize(actor, BookingAction::Advance { to }, &booking)?;

        let updated = if to == BookingStatus::Completed {
            self.complete(&booking).await?
        } else {
            match self.store.advance_booking(id, booking.status, to, None).await? {
                Some(updated) => updated,
                None => return Err(self.stale(id, to).await),
            }
        };

        info!(booking_id = %id, from = %booking.status, to = %to, "Booking status changed");
        self.announce(&updated).await;
        Ok(updated)
    }

    async fn complete(&self, booking: &Booking) -> DomainResult<Booking> {
        let commission = self.commission_for(booking.price);
        let payout = booking.price - commission;

        let entry = NewTransaction {
            user_id: None,
            worker_id: booking.worker_id,
            booking_id: Some(booking.id),
            kind: TransactionKind::Commission,
            direction: Direction::Credit,
            amount: commission,
            method: "platform".to_string(),
            status: TransactionStatus::Completed,
            reference: Some(reference::booking_commission(booking.id)),
        };

        match self.store.complete_booking(booking.id, entry, payout).await? {
            Some((updated, tx)) => {
                info!(
                    booking_id = %booking.id,
                    commission = %tx.amount,
                    payout = %payout,
                    "Commission recorded"
                );
                Ok(updated)
            }
            None => Err(self.stale(booking.id, BookingStatus::Completed).await),
        }
    }

    /// Cancel a booking, refunding its wallet payment if there was one
    pub async fn cancel(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: Option<String>,
    ) -> DomainResult<Booking> {
        let booking = self.fetch(id).await?;
        ensure_transition(booking.status, BookingStatus::Cancelled)?;
        authorize(actor, BookingAction::Cancel, &booking)?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let (updated, refund) = match self
            .store
            .cancel_booking(id, booking.status, reason)
            .await?
        {
            Some(result) => result,
            None => return Err(self.stale(id, BookingStatus::Cancelled).await),
        };

        info!(
            booking_id = %id,
            refunded = ?refund.as_ref().map(|r| r.amount),
            "Booking cancelled"
        );
        self.announce(&updated).await;
        Ok(updated)
    }

    /// Pay the booking price from the customer's wallet
    pub async fn pay(&self, actor: &Actor, id: Uuid) -> DomainResult<Transaction> {
        let booking = self.fetch(id).await?;
        authorize(actor, BookingAction::Pay, &booking)?;

        let payment = self.ledger.pay_booking(&booking).await?;

        info!(booking_id = %id, amount = %payment.amount, "Booking paid");
        Ok(payment)
    }

    async fn fetch(&self, id: Uuid) -> DomainResult<Booking> {
        self.store
            .find_booking(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Booking"))
    }

    /// Error for a compare-and-set that lost a race: report the transition
    /// from whatever state won
    async fn stale(&self, id: Uuid, to: BookingStatus) -> DomainError {
        match self.fetch(id).await {
            Ok(current) => DomainError::InvalidTransition {
                from: current.status,
                to,
            },
            Err(e) => e,
        }
    }

    async fn announce(&self, booking: &Booking) {
        let data = match serde_json::to_value(booking) {
            Ok(data) => data,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Could not encode booking event");
                return;
            }
        };

        self.hub
            .publish(&booking_room(booking.id), Frame::new(BOOKING_UPDATED, data))
            .await;
    }
}

fn ensure_transition(from: BookingStatus, to: BookingStatus) -> DomainResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition { from, to })
    }
}

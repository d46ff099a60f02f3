//! Role-based access to bookings
//!
//! Every booking operation goes through [`authorize`], keyed by the actor's
//! role and their relationship to the booking.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{DomainError, DomainResult},
    models::{Booking, BookingStatus, Role},
};

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(&self, role: Role) -> DomainResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(DomainError::forbidden(format!("{} access required", role)))
        }
    }

    pub fn require_admin(&self) -> DomainResult<()> {
        self.require_role(Role::Admin)
    }
}

/// How the actor relates to a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Owner,
    AssignedWorker,
    Stranger,
}

pub fn relation(actor: &Actor, booking: &Booking) -> Relation {
    match actor.role {
        Role::Customer if booking.customer_id == actor.id => Relation::Owner,
        Role::Worker if booking.worker_id == Some(actor.id) => Relation::AssignedWorker,
        _ => Relation::Stranger,
    }
}

/// Operations on an existing booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    View,
    Assign { worker_id: Uuid },
    Advance { to: BookingStatus },
    Cancel,
    Pay,
}

/// Decide whether `actor` may perform `action` on `booking`
pub fn authorize(actor: &Actor, action: BookingAction, booking: &Booking) -> DomainResult<()> {
    use BookingStatus::*;

    let relation = relation(actor, booking);
    let admin = actor.is_admin();

    let allowed = match action {
        BookingAction::View => admin || relation != Relation::Stranger,
        // A worker may only accept a job for themself
        BookingAction::Assign { worker_id } => {
            admin || (actor.role == Role::Worker && worker_id == actor.id)
        }
        BookingAction::Advance { to } => match (booking.status, to) {
            (Assigned, Confirmed) => admin || relation == Relation::AssignedWorker,
            (Confirmed, InProgress) | (InProgress, Completed) => {
                relation == Relation::AssignedWorker
            }
            _ => admin,
        },
        BookingAction::Cancel => {
            admin || (relation == Relation::Owner && booking.status == Pending)
        }
        BookingAction::Pay => relation == Relation::Owner,
    };

    if allowed {
        Ok(())
    } else {
        Err(DomainError::forbidden(format!(
            "{} may not {} this booking",
            actor.role,
            action.verb()
        )))
    }
}

impl BookingAction {
    fn verb(&self) -> &'static str {
        match self {
            BookingAction::View => "view",
            BookingAction::Assign { .. } => "assign",
            BookingAction::Advance { .. } => "update",
            BookingAction::Cancel => "cancel",
            BookingAction::Pay => "pay for",
        }
    }
}

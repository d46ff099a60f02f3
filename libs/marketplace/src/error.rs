//! Domain error taxonomy
//!
//! Every marketplace operation fails with one of these variants; the HTTP
//! services map each variant onto a status code in one place.

use common::error::DatabaseError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::BookingStatus;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired credentials
    #[error("{0}")]
    Auth(String),

    /// Role or ownership mismatch
    #[error("{0}")]
    Permission(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate resource or competing write
    #[error("{0}")]
    Conflict(String),

    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("Payment signature mismatch")]
    SignatureMismatch,

    /// Payment provider failure
    #[error("Payment provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Type alias for Result with DomainError
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }

    pub fn forbidden(why: impl Into<String>) -> Self {
        DomainError::Permission(why.into())
    }
}

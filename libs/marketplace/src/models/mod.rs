//! Marketplace entities and their creation payloads

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored
/// as text.
macro_rules! text_enum {
    ($ty:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire and storage representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(crate::error::DomainError::Validation(format!(
                        "unknown {}: {}",
                        $label, other
                    ))),
                }
            }
        }
    };
}

pub(crate) use text_enum;

pub mod attendance;
pub mod booking;
pub mod contact;
pub mod otp;
pub mod transaction;
pub mod user;
pub mod worker;

// Re-export for convenience
pub use attendance::Attendance;
pub use booking::{Booking, BookingDraft, BookingFilter, BookingStatus, NewBooking, ServiceType};
pub use contact::{ContactMessage, NewContactMessage};
pub use otp::{NewOtp, Otp};
pub use transaction::{
    Direction, NewTransaction, Transaction, TransactionFilter, TransactionKind, TransactionStatus,
};
pub use user::{NewUser, Role, User};
pub use worker::{NewWorkerProfile, Worker, WorkerCandidate};

//! Marketplace domain
//!
//! Booking lifecycle, wallet ledger, payment bridge, worker matching and the
//! realtime room hub, on top of the repository traits in [`store`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use marketplace::{booking::BookingService, realtime::RoomHub, store::PgStore};
//!
//! # async fn example(pool: sqlx::PgPool) {
//! let store = Arc::new(PgStore::new(pool));
//! let bookings = BookingService::new(
//!     store,
//!     RoomHub::new(),
//!     marketplace::booking::DEFAULT_COMMISSION_RATE,
//! );
//! # }
//! ```

pub mod assignment;
pub mod booking;
pub mod error;
pub mod ledger;
pub mod models;
pub mod payment;
pub mod permissions;
pub mod realtime;
pub mod store;

pub use error::{DomainError, DomainResult};

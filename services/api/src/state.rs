//! Application state shared across handlers

use std::sync::Arc;

use common::jwt::JwtService;
use marketplace::{
    assignment::WorkerDirectory,
    booking::BookingService,
    ledger::Ledger,
    payment::{PaymentBridge, PaymentGateway},
    realtime::RoomHub,
    store::Store,
};
use rust_decimal::Decimal;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub bookings: BookingService,
    pub ledger: Ledger,
    pub payments: PaymentBridge,
    pub workers: WorkerDirectory,
    /// Shared with `bookings`, which publishes status changes into it
    pub hub: RoomHub,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        jwt: JwtService,
        commission_rate: Decimal,
    ) -> Self {
        let hub = RoomHub::new();

        Self {
            bookings: BookingService::new(store.clone(), hub.clone(), commission_rate),
            ledger: Ledger::new(store.clone()),
            payments: PaymentBridge::new(gateway, store.clone()),
            workers: WorkerDirectory::new(store.clone()),
            hub,
            jwt,
            store,
        }
    }
}

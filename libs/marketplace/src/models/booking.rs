//! Booking model and its status machine

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;
use crate::{
    error::{DomainError, DomainResult},
    ledger::validate_money,
};

/// Services offered on the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Cleaning,
    Laundry,
    CarWash,
}

text_enum!(ServiceType, "service type" {
    Cleaning => "cleaning",
    Laundry => "laundry",
    CarWash => "car-wash",
});

/// Booking lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    Pending,
    Assigned,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

text_enum!(BookingStatus, "booking status" {
    Pending => "pending",
    Assigned => "assigned",
    Confirmed => "confirmed",
    InProgress => "in-progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl BookingStatus {
    /// Adjacency table of the status machine.
    ///
    /// `pending → assigned → confirmed → in-progress → completed`, plus
    /// `cancelled` from any state before work starts.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Pending | Assigned | Confirmed, Cancelled)
        )
    }

    /// States in which the booking occupies its worker
    pub fn is_active_assignment(self) -> bool {
        matches!(
            self,
            BookingStatus::Assigned | BookingStatus::Confirmed | BookingStatus::InProgress
        )
    }
}

/// Booking entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub worker_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub address: String,
    pub price: Decimal,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking request as received from a customer; every field is checked by
/// [`BookingDraft::validate`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    pub service_type: Option<ServiceType>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub address: Option<String>,
    pub price: Option<Decimal>,
}

impl BookingDraft {
    /// Turn the draft into an insertable booking for `customer_id`
    pub fn validate(self, customer_id: Uuid) -> DomainResult<NewBooking> {
        let mut missing = Vec::new();

        if self.service_type.is_none() {
            missing.push("serviceType");
        }
        if self.scheduled_date.is_none() {
            missing.push("scheduledDate");
        }
        if self.scheduled_time.is_none() {
            missing.push("scheduledTime");
        }
        let address = self
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        if address.is_none() {
            missing.push("address");
        }
        if self.price.is_none() {
            missing.push("price");
        }

        match (
            self.service_type,
            self.scheduled_date,
            self.scheduled_time,
            address,
            self.price,
        ) {
            (Some(service_type), Some(scheduled_date), Some(scheduled_time), Some(address), Some(price)) => {
                validate_money("price", price)?;

                Ok(NewBooking {
                    customer_id,
                    service_type,
                    scheduled_date,
                    scheduled_time,
                    address,
                    price,
                })
            }
            _ => Err(DomainError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Validated booking ready for insertion
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: Uuid,
    pub service_type: ServiceType,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub address: String,
    pub price: Decimal,
}

/// Listing filter; `None` fields are unconstrained
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub customer_id: Option<Uuid>,
    pub worker_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.customer_id.is_none_or(|id| booking.customer_id == id)
            && self.worker_id.is_none_or(|id| booking.worker_id == Some(id))
            && self.status.is_none_or(|s| booking.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 6] = [Pending, Assigned, Confirmed, InProgress, Completed, Cancelled];

    #[test]
    fn test_adjacency_table() {
        let allowed = [
            (Pending, Assigned),
            (Assigned, Confirmed),
            (Confirmed, InProgress),
            (InProgress, Completed),
            (Pending, Cancelled),
            (Assigned, Cancelled),
            (Confirmed, Cancelled),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_value(InProgress).unwrap(), "in-progress");
        assert_eq!("in-progress".parse::<BookingStatus>().unwrap(), InProgress);
        assert_eq!(ServiceType::CarWash.as_str(), "car-wash");
    }

    #[test]
    fn test_draft_reports_every_missing_field() {
        let draft = BookingDraft {
            service_type: Some(ServiceType::Cleaning),
            address: Some("   ".to_string()),
            ..Default::default()
        };

        match draft.validate(Uuid::new_v4()) {
            Err(DomainError::Validation(msg)) => {
                assert_eq!(
                    msg,
                    "missing required fields: scheduledDate, scheduledTime, address, price"
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_draft_rejects_non_positive_price() {
        let draft = BookingDraft {
            service_type: Some(ServiceType::Laundry),
            scheduled_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            scheduled_time: NaiveTime::from_hms_opt(9, 30, 0),
            address: Some("12 MG Road".to_string()),
            price: Some(Decimal::ZERO),
        };

        assert!(matches!(
            draft.validate(Uuid::new_v4()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_draft_rejects_price_beyond_column_range() {
        let draft = |price: &str| BookingDraft {
            service_type: Some(ServiceType::Cleaning),
            scheduled_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            scheduled_time: NaiveTime::from_hms_opt(9, 30, 0),
            address: Some("12 MG Road".to_string()),
            price: Some(price.parse().unwrap()),
        };

        match draft("10000000000").validate(Uuid::new_v4()) {
            Err(DomainError::Validation(msg)) => assert!(msg.starts_with("price cannot exceed")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(draft("9999999999.99").validate(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_draft_deserializes_from_camel_case() {
        let draft: BookingDraft = serde_json::from_str(
            r#"{"serviceType":"car-wash","scheduledDate":"2025-03-01","scheduledTime":"09:30:00","address":"12 MG Road","price":450}"#,
        )
        .unwrap();

        let booking = draft.validate(Uuid::new_v4()).unwrap();
        assert_eq!(booking.service_type, ServiceType::CarWash);
        assert_eq!(booking.price, Decimal::new(450, 0));
        assert_eq!(booking.address, "12 MG Road");
    }
}

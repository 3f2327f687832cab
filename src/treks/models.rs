use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, AppResult, BookingError};

/// Batch status - advances by date or administrative action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "batch_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Upcoming => "upcoming",
            BatchStatus::Ongoing => "ongoing",
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    /// Valid administrative transitions:
    /// - Upcoming -> Ongoing, Cancelled
    /// - Ongoing -> Completed, Cancelled
    /// - Terminal states (Completed, Cancelled) -> nothing
    pub fn can_transition(self, to: BatchStatus) -> bool {
        matches!(
            (self, to),
            (BatchStatus::Upcoming, BatchStatus::Ongoing)
                | (BatchStatus::Upcoming, BatchStatus::Cancelled)
                | (BatchStatus::Ongoing, BatchStatus::Completed)
                | (BatchStatus::Ongoing, BatchStatus::Cancelled)
        )
    }

    pub fn validate_transition(self, to: BatchStatus) -> AppResult<()> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(AppError::Booking(BookingError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            }))
        }
    }
}

/// Trek entity - the catalogue item batches hang off
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trek {
    pub id: Uuid,
    pub name: String,
    pub region: String,
    pub duration_days: i32,
    pub difficulty: String,
    pub base_price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Batch entity - a dated departure of a trek with fixed seat capacity
///
/// INVARIANT: current_participants <= max_participants, enforced by the
/// seat ledger's conditional update (never by read-then-write).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Batch {
    pub id: Uuid,
    pub trek_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: Decimal,
    pub max_participants: i32,
    pub current_participants: i32,
    pub status: BatchStatus,
    /// Batch-level opt-in for auto-cancelling overdue partial balances.
    /// A booking-level flag alone is not sufficient.
    pub auto_cancel_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn seats_left(&self) -> i32 {
        (self.max_participants - self.current_participants).max(0)
    }

    /// New bookings are only admitted onto upcoming batches
    pub fn is_open_for_booking(&self) -> bool {
        self.status == BatchStatus::Upcoming
    }

    pub fn days_until_departure(&self, today: NaiveDate) -> i64 {
        (self.start_date - today).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_transitions() {
        assert!(BatchStatus::Upcoming.can_transition(BatchStatus::Ongoing));
        assert!(BatchStatus::Upcoming.can_transition(BatchStatus::Cancelled));
        assert!(BatchStatus::Ongoing.can_transition(BatchStatus::Completed));

        // Terminal states never move
        assert!(!BatchStatus::Completed.can_transition(BatchStatus::Upcoming));
        assert!(!BatchStatus::Cancelled.can_transition(BatchStatus::Ongoing));
        // No skipping straight to completed
        assert!(!BatchStatus::Upcoming.can_transition(BatchStatus::Completed));
    }

    #[test]
    fn test_seats_left_never_negative() {
        let batch = Batch {
            id: Uuid::new_v4(),
            trek_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 7).unwrap(),
            price: Decimal::new(15000, 0),
            max_participants: 10,
            current_participants: 12,
            status: BatchStatus::Upcoming,
            auto_cancel_overdue: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(batch.seats_left(), 0);
    }

    #[test]
    fn test_days_until_departure() {
        let batch = Batch {
            id: Uuid::new_v4(),
            trek_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2025, 10, 26).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 30).unwrap(),
            price: Decimal::new(15000, 0),
            max_participants: 10,
            current_participants: 0,
            status: BatchStatus::Upcoming,
            auto_cancel_overdue: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let today = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert_eq!(batch.days_until_departure(today), 25);
    }
}

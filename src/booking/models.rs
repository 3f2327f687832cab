use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json, Type};
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, AppResult, BookingError};

/// Booking lifecycle status
///
/// pending_payment (initial)
///   -> payment_confirmed_partial | payment_completed
///   -> confirmed (terminal-success) | trek_completed (post-travel)
/// any non-terminal state -> cancelled (terminal-failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    PaymentConfirmedPartial,
    PaymentCompleted,
    Confirmed,
    TrekCompleted,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::PaymentConfirmedPartial => "payment_confirmed_partial",
            BookingStatus::PaymentCompleted => "payment_completed",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::TrekCompleted => "trek_completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed | BookingStatus::TrekCompleted | BookingStatus::Cancelled
        )
    }

    /// The explicit transition table. Anything not listed here is rejected;
    /// ad hoc status comparisons elsewhere in the codebase are a bug.
    pub fn can_transition(self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        let allowed: &[BookingStatus] = match self {
            // PendingPayment -> PendingPayment is the underpayment re-arm:
            // a verified amount below the initial minimum keeps the booking
            // pending with an updated remaining balance.
            PendingPayment => &[
                PendingPayment,
                PaymentConfirmedPartial,
                PaymentCompleted,
                Cancelled,
            ],
            PaymentConfirmedPartial => &[PaymentCompleted, Confirmed, Cancelled],
            PaymentCompleted => &[Confirmed, Cancelled],
            Confirmed => &[TrekCompleted],
            TrekCompleted | Cancelled => &[],
        };
        allowed.contains(&to)
    }

    pub fn validate_transition(self, to: BookingStatus) -> AppResult<()> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(AppError::Booking(BookingError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            }))
        }
    }

    /// States from which a cancellation (customer, admin, sweep) is valid.
    pub fn is_cancellable(self) -> bool {
        self.can_transition(BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "cancel_actor", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CancelActor {
    User,
    Admin,
    System,
}

impl CancelActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelActor::User => "user",
            CancelActor::Admin => "admin",
            CancelActor::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "refund_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Processing,
    Success,
    Failed,
}

/// Traveller details, supplied by the customer after payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub age: u8,
    pub gender: String,
}

/// Promo code applied at booking creation; usage is counted at payment
/// verification, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCodeDetails {
    pub code: String,
    pub promo_code_id: Uuid,
    pub discount_amount: Decimal,
}

/// Booking entity - one customer's claim on a batch
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trek_id: Uuid,
    pub batch_id: Uuid,
    pub number_of_participants: i32,
    pub status: BookingStatus,
    pub payment_mode: PaymentMode,
    pub total_price: Decimal,
    /// Cumulative verified payments. remaining_amount is always recomputed
    /// from total_price - amount_paid, so repeated underpayments cannot
    /// compound the balance.
    pub amount_paid: Decimal,
    pub gateway_order_id: Option<String>,

    // Partial payment sub-record (only set for PaymentMode::Partial)
    pub initial_amount: Option<Decimal>,
    pub remaining_amount: Option<Decimal>,
    pub final_payment_due_date: Option<DateTime<Utc>>,
    pub final_payment_date: Option<DateTime<Utc>>,
    pub auto_cancel_on_due_date: bool,

    /// Reservation hold deadline; unpaid bookings past this point are
    /// swept to the failed-booking archive.
    pub session_expires_at: Option<DateTime<Utc>>,
    pub participant_details: Json<Vec<Participant>>,
    pub promo_code_details: Option<Json<PromoCodeDetails>>,

    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelActor>,
    pub refund_status: Option<RefundStatus>,
    pub refund_amount: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable archive of a reservation that expired without payment.
/// Written only by the expiry sweep; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FailedBooking {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub trek_id: Uuid,
    pub batch_id: Uuid,
    pub number_of_participants: i32,
    pub payment_mode: PaymentMode,
    pub total_price: Decimal,
    pub failure_reason: String,
    pub failure_details: Option<Json<serde_json::Value>>,
    pub original_created_at: DateTime<Utc>,
    pub original_expires_at: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
    pub archived_by: String,
}

impl Booking {
    pub fn has_participant_details(&self) -> bool {
        !self.participant_details.0.is_empty()
    }

    pub fn is_session_expired(&self, now: DateTime<Utc>, fallback_hold_minutes: i64) -> bool {
        match self.session_expires_at {
            Some(expires_at) => expires_at <= now,
            None => self.created_at + chrono::Duration::minutes(fallback_hold_minutes) <= now,
        }
    }

    /// Remaining balance owed, for any payment mode.
    pub fn balance_due(&self) -> Decimal {
        (self.total_price - self.amount_paid).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_happy_paths() {
        use BookingStatus::*;

        assert!(PendingPayment.can_transition(PaymentCompleted));
        assert!(PendingPayment.can_transition(PaymentConfirmedPartial));
        assert!(PendingPayment.can_transition(PendingPayment)); // re-arm
        assert!(PaymentConfirmedPartial.can_transition(Confirmed));
        assert!(PaymentConfirmedPartial.can_transition(PaymentCompleted));
        assert!(PaymentCompleted.can_transition(Confirmed));
        assert!(Confirmed.can_transition(TrekCompleted));
    }

    #[test]
    fn test_cancellation_only_from_non_terminal() {
        use BookingStatus::*;

        assert!(PendingPayment.is_cancellable());
        assert!(PaymentConfirmedPartial.is_cancellable());
        assert!(PaymentCompleted.is_cancellable());

        assert!(!Confirmed.is_cancellable());
        assert!(!TrekCompleted.is_cancellable());
        assert!(!Cancelled.is_cancellable());

        // The cancellable set is exactly the non-terminal states
        for status in [
            PendingPayment,
            PaymentConfirmedPartial,
            PaymentCompleted,
            Confirmed,
            TrekCompleted,
            Cancelled,
        ] {
            assert_eq!(status.is_cancellable(), !status.is_terminal());
        }
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        use BookingStatus::*;

        // No reopening a settled booking
        assert!(!Confirmed.can_transition(PendingPayment));
        // No resurrecting cancelled bookings
        assert!(!Cancelled.can_transition(PendingPayment));
        assert!(!Cancelled.can_transition(Confirmed));
        // No skipping the payment stage
        assert!(!PendingPayment.can_transition(Confirmed));
        // No walking back a settlement
        assert!(!PaymentCompleted.can_transition(PendingPayment));
        assert!(!PaymentCompleted.can_transition(PaymentConfirmedPartial));

        let err = Confirmed.validate_transition(PendingPayment).unwrap_err();
        assert!(matches!(
            err,
            AppError::Booking(BookingError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_session_expiry_fallback_window() {
        let now = Utc::now();
        let mut booking = sample_booking(now - chrono::Duration::minutes(45));

        // No stamp: falls back to created_at + hold window
        booking.session_expires_at = None;
        assert!(booking.is_session_expired(now, 30));
        assert!(!booking.is_session_expired(now, 60));

        // Explicit stamp wins over the fallback
        booking.session_expires_at = Some(now + chrono::Duration::minutes(5));
        assert!(!booking.is_session_expired(now, 30));
    }

    fn sample_booking(created_at: DateTime<Utc>) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trek_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            number_of_participants: 2,
            status: BookingStatus::PendingPayment,
            payment_mode: PaymentMode::Full,
            total_price: Decimal::new(1000, 0),
            amount_paid: Decimal::ZERO,
            gateway_order_id: None,
            initial_amount: None,
            remaining_amount: None,
            final_payment_due_date: None,
            final_payment_date: None,
            auto_cancel_on_due_date: false,
            session_expires_at: None,
            participant_details: Json(vec![]),
            promo_code_details: None,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            refund_status: None,
            refund_amount: None,
            created_at,
            updated_at: created_at,
        }
    }
}

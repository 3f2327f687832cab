use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::gateway::PaymentGateway;
use super::models::{amount_from_minor, PaymentWebhookPayload};
use crate::booking::models::{Booking, BookingStatus, PaymentMode};
use crate::booking::repository::BookingRepository;
use crate::error::{AppError, AppResult, BookingError, PaymentError};
use crate::notify::{invoice, Notifier};
use crate::promo::PromoRepository;

/// What a verified payment does to a booking, decided before anything is
/// written. Pure data so the settlement arithmetic is unit-testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPlan {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub new_amount_paid: Decimal,
    pub new_remaining: Option<Decimal>,
    /// Stamp partial_payment_details.final_payment_date.
    pub stamps_final_payment: bool,
    /// Full settlement: the required payment (full, or final balance) is
    /// now verified; triggers invoice generation.
    pub settles: bool,
    pub label: &'static str,
}

/// Decide how a verified payment of `paid` applies to `booking`.
///
/// `remaining_amount` is always recomputed as `total - cumulative paid`, so
/// a customer who underpays repeatedly owes the same money each time rather
/// than a compounding balance.
pub fn plan_payment(booking: &Booking, paid: Decimal) -> AppResult<PaymentPlan> {
    let total = booking.total_price;
    let cumulative = booking.amount_paid + paid;
    let has_details = booking.has_participant_details();

    match (booking.payment_mode, booking.status) {
        (PaymentMode::Partial, BookingStatus::PaymentConfirmedPartial) => {
            let remaining = booking.balance_due();
            if paid >= remaining {
                // Final balance payment
                let to = if has_details {
                    BookingStatus::Confirmed
                } else {
                    BookingStatus::PaymentCompleted
                };
                Ok(PaymentPlan {
                    from: booking.status,
                    to,
                    new_amount_paid: cumulative,
                    new_remaining: Some(Decimal::ZERO),
                    stamps_final_payment: true,
                    settles: true,
                    label: "final_balance",
                })
            } else {
                // A tranche below the outstanding balance: bank it and stay
                // where we are.
                Ok(PaymentPlan {
                    from: booking.status,
                    to: booking.status,
                    new_amount_paid: cumulative,
                    new_remaining: Some(total - cumulative),
                    stamps_final_payment: false,
                    settles: false,
                    label: "partial_top_up",
                })
            }
        }
        (PaymentMode::Partial, BookingStatus::PendingPayment) => {
            let initial = booking.initial_amount.ok_or_else(|| {
                AppError::Internal(format!(
                    "partial booking {} has no initial_amount",
                    booking.id
                ))
            })?;

            if cumulative >= total {
                Ok(PaymentPlan {
                    from: booking.status,
                    to: BookingStatus::PaymentCompleted,
                    new_amount_paid: cumulative,
                    new_remaining: Some(Decimal::ZERO),
                    stamps_final_payment: true,
                    settles: true,
                    label: "full_settlement",
                })
            } else if cumulative >= initial {
                Ok(PaymentPlan {
                    from: booking.status,
                    to: BookingStatus::PaymentConfirmedPartial,
                    new_amount_paid: cumulative,
                    new_remaining: Some(total - cumulative),
                    stamps_final_payment: false,
                    settles: false,
                    label: "initial_confirmed",
                })
            } else {
                // Below the minimum initial tranche: the booking stays
                // pending with the shortfall reflected in the balance.
                Ok(PaymentPlan {
                    from: booking.status,
                    to: BookingStatus::PendingPayment,
                    new_amount_paid: cumulative,
                    new_remaining: Some(total - cumulative),
                    stamps_final_payment: false,
                    settles: false,
                    label: "underpayment_rearm",
                })
            }
        }
        (PaymentMode::Full, BookingStatus::PendingPayment) => {
            if cumulative >= total {
                Ok(PaymentPlan {
                    from: booking.status,
                    to: BookingStatus::PaymentCompleted,
                    new_amount_paid: cumulative,
                    new_remaining: None,
                    stamps_final_payment: false,
                    settles: true,
                    label: "full_settlement",
                })
            } else {
                warn!(
                    "Full-payment booking {} received {} of {}; staying pending",
                    booking.id, paid, total
                );
                Ok(PaymentPlan {
                    from: booking.status,
                    to: BookingStatus::PendingPayment,
                    new_amount_paid: cumulative,
                    new_remaining: None,
                    stamps_final_payment: false,
                    settles: false,
                    label: "full_underpaid",
                })
            }
        }
        // Settled, cancelled or completed bookings take no further money;
        // a redelivered event for them acknowledges and stops.
        _ => Err(PaymentError::AlreadySettled(booking.id.to_string()).into()),
    }
}

/// Payment reconciler - consumes gateway confirmation events (synchronous
/// verify call or asynchronous webhook), advances the booking state
/// machine, counts promo usage idempotently, and emits notifications.
pub struct PaymentReconciler {
    bookings: Arc<BookingRepository>,
    promos: Arc<PromoRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<Notifier>,
    /// Per-booking serialization so a duplicated callback cannot apply the
    /// same payment twice or race the auto-cancel sweep. The DB row lock is
    /// the cross-instance guard; this keeps one instance orderly.
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl PaymentReconciler {
    pub fn new(
        bookings: Arc<BookingRepository>,
        promos: Arc<PromoRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            bookings,
            promos,
            gateway,
            notifier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, booking_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(booking_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Synchronous verification path: checkout callback with a signature
    /// over "{order_id}|{payment_id}". The amount is never trusted from the
    /// client; it is fetched from the gateway.
    pub async fn verify_and_apply(
        &self,
        booking_id: Uuid,
        gateway_payment_id: &str,
        gateway_order_id: &str,
        signature: &str,
    ) -> AppResult<Booking> {
        if !self
            .gateway
            .verify_callback_signature(gateway_order_id, gateway_payment_id, signature)
        {
            warn!(
                "Rejected payment callback for booking {}: bad signature",
                booking_id
            );
            return Err(PaymentError::SignatureInvalid.into());
        }

        let payment = self.gateway.fetch_payment(gateway_payment_id).await?;
        if !payment.is_captured() {
            return Err(
                PaymentError::PaymentNotCaptured(gateway_payment_id.to_string()).into(),
            );
        }

        let amount = amount_from_minor(payment.amount)?;
        self.apply_verified(
            booking_id,
            gateway_payment_id,
            Some(gateway_order_id),
            amount,
            payment.method.as_deref(),
        )
        .await
    }

    /// Webhook path. The raw-body signature has already been checked by the
    /// handler; the payload carries the captured amount.
    pub async fn apply_webhook(&self, payload: &PaymentWebhookPayload) -> AppResult<Booking> {
        if payload.status != "captured" {
            info!(
                "Ignoring webhook {} for booking {}: status {}",
                payload.event_id, payload.booking_id, payload.status
            );
            return Err(PaymentError::PaymentNotCaptured(payload.payment_id.clone()).into());
        }

        let amount = amount_from_minor(payload.amount)?;
        self.apply_verified(
            payload.booking_id,
            &payload.payment_id,
            payload.order_id.as_deref(),
            amount,
            payload.method.as_deref(),
        )
        .await
    }

    /// The single write path for verified payments. Serialized per booking,
    /// idempotent on the gateway payment id, atomic with the promo usage
    /// count.
    async fn apply_verified(
        &self,
        booking_id: Uuid,
        gateway_payment_id: &str,
        gateway_order_id: Option<&str>,
        amount: Decimal,
        method: Option<&str>,
    ) -> AppResult<Booking> {
        let lock = self.lock_for(booking_id);
        let _guard = lock.lock().await;

        let mut tx = self.bookings.begin_tx().await?;

        let booking = self
            .bookings
            .get_for_update(&mut tx, booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        let plan = plan_payment(&booking, amount)?;

        // Idempotency gate: the payment id is the key. A redelivered event
        // fails this insert and the whole call becomes a no-op.
        let inserted = self
            .bookings
            .insert_payment_event(
                &mut tx,
                booking_id,
                gateway_payment_id,
                gateway_order_id,
                amount,
                method,
                plan.label,
            )
            .await?;

        if !inserted {
            info!(
                "Payment {} for booking {} already applied; acknowledging",
                gateway_payment_id, booking_id
            );
            return Err(PaymentError::AlreadySettled(gateway_payment_id.to_string()).into());
        }

        let final_payment_date = plan.stamps_final_payment.then(chrono::Utc::now);
        self.bookings
            .apply_payment(
                &mut tx,
                booking_id,
                plan.from,
                plan.to,
                plan.new_amount_paid,
                plan.new_remaining,
                final_payment_date,
            )
            .await?;

        // A fully paid booking whose participant details already exist goes
        // straight on to confirmed.
        let mut final_status = plan.to;
        if plan.settles
            && plan.to == BookingStatus::PaymentCompleted
            && booking.has_participant_details()
        {
            self.bookings
                .update_status(
                    &mut tx,
                    booking_id,
                    BookingStatus::PaymentCompleted,
                    BookingStatus::Confirmed,
                )
                .await?;
            final_status = BookingStatus::Confirmed;
        }

        // Promo usage rides in the same transaction as the payment event,
        // so the count moves exactly once per distinct verified payment.
        if let Some(promo) = &booking.promo_code_details {
            self.promos
                .increment_usage(&mut tx, promo.0.promo_code_id, &promo.0.code)
                .await?;
        }

        tx.commit().await?;

        info!(
            "Payment {} applied to booking {}: {} -> {} ({})",
            gateway_payment_id, booking_id, plan.from, final_status, plan.label
        );

        let updated = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        self.spawn_side_effects(updated.clone(), gateway_payment_id.to_string(), amount, plan.settles);

        Ok(updated)
    }

    /// Best-effort notifications. Failures are logged and never unwind the
    /// committed payment state.
    fn spawn_side_effects(
        &self,
        booking: Booking,
        payment_id: String,
        amount: Decimal,
        settled: bool,
    ) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier
                .try_send("payment_received", notifier.payment_received(&booking, amount))
                .await;

            if settled {
                let document = invoice::invoice(&booking, &payment_id, amount);
                notifier
                    .try_send("invoice_delivery", notifier.invoice_delivery(&booking, &document))
                    .await;
            }
        });
    }
}

/// Log-and-acknowledge helper for the webhook handler: gateway redelivery
/// only stops on a success response, so non-retryable failures must not
/// surface as errors.
pub fn is_ack_only_error(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Payment(PaymentError::AlreadySettled(_))
            | AppError::Payment(PaymentError::PaymentNotCaptured(_))
            | AppError::Booking(BookingError::NotFound(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::models::{Participant, PaymentMode};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sqlx::types::Json;

    fn partial_booking(
        status: BookingStatus,
        amount_paid: Decimal,
        with_details: bool,
    ) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trek_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            number_of_participants: 1,
            status,
            payment_mode: PaymentMode::Partial,
            total_price: dec!(1000),
            amount_paid,
            gateway_order_id: Some("order_1".into()),
            initial_amount: Some(dec!(200)),
            remaining_amount: Some(dec!(800)),
            final_payment_due_date: Some(Utc::now() + chrono::Duration::days(30)),
            final_payment_date: None,
            auto_cancel_on_due_date: true,
            session_expires_at: Some(Utc::now() + chrono::Duration::minutes(30)),
            participant_details: Json(if with_details {
                vec![Participant {
                    name: "A".into(),
                    age: 30,
                    gender: "f".into(),
                }]
            } else {
                vec![]
            }),
            promo_code_details: None,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            refund_status: None,
            refund_amount: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn full_booking(status: BookingStatus, amount_paid: Decimal) -> Booking {
        let mut b = partial_booking(status, amount_paid, false);
        b.payment_mode = PaymentMode::Full;
        b.initial_amount = None;
        b.remaining_amount = None;
        b
    }

    #[test]
    fn test_partial_payment_progression() {
        // total=1000, initial=200. Paying 150 stays pending with the
        // balance grown by the 50 shortfall.
        let booking = partial_booking(BookingStatus::PendingPayment, dec!(0), false);
        let plan = plan_payment(&booking, dec!(150)).unwrap();
        assert_eq!(plan.to, BookingStatus::PendingPayment);
        assert_eq!(plan.new_remaining, Some(dec!(850)));
        assert_eq!(plan.new_amount_paid, dec!(150));
        assert!(!plan.settles);

        // Paying the missing 50 confirms the partial with remaining 800.
        let booking = partial_booking(BookingStatus::PendingPayment, dec!(150), false);
        let plan = plan_payment(&booking, dec!(50)).unwrap();
        assert_eq!(plan.to, BookingStatus::PaymentConfirmedPartial);
        assert_eq!(plan.new_remaining, Some(dec!(800)));

        // Paying the remaining 800 without details lands on
        // payment_completed, with details on confirmed.
        let booking = partial_booking(BookingStatus::PaymentConfirmedPartial, dec!(200), false);
        let plan = plan_payment(&booking, dec!(800)).unwrap();
        assert_eq!(plan.to, BookingStatus::PaymentCompleted);
        assert_eq!(plan.new_remaining, Some(dec!(0)));
        assert!(plan.settles);
        assert!(plan.stamps_final_payment);

        let booking = partial_booking(BookingStatus::PaymentConfirmedPartial, dec!(200), true);
        let plan = plan_payment(&booking, dec!(800)).unwrap();
        assert_eq!(plan.to, BookingStatus::Confirmed);
    }

    #[test]
    fn test_repeated_underpayment_does_not_compound() {
        // First underpayment: 100 of the 200 minimum.
        let booking = partial_booking(BookingStatus::PendingPayment, dec!(0), false);
        let plan = plan_payment(&booking, dec!(100)).unwrap();
        assert_eq!(plan.new_remaining, Some(dec!(900)));

        // Second underpayment of 50: balance is total - 150, not total -
        // 150 plus a second shortfall penalty.
        let booking = partial_booking(BookingStatus::PendingPayment, dec!(100), false);
        let plan = plan_payment(&booking, dec!(50)).unwrap();
        assert_eq!(plan.to, BookingStatus::PendingPayment);
        assert_eq!(plan.new_remaining, Some(dec!(850)));
    }

    #[test]
    fn test_partial_paid_in_full_upfront() {
        let booking = partial_booking(BookingStatus::PendingPayment, dec!(0), false);
        let plan = plan_payment(&booking, dec!(1000)).unwrap();
        assert_eq!(plan.to, BookingStatus::PaymentCompleted);
        assert_eq!(plan.new_remaining, Some(dec!(0)));
        assert!(plan.settles);
    }

    #[test]
    fn test_mid_partial_top_up_stays_in_state() {
        let booking = partial_booking(BookingStatus::PaymentConfirmedPartial, dec!(200), false);
        let plan = plan_payment(&booking, dec!(300)).unwrap();
        assert_eq!(plan.from, plan.to);
        assert_eq!(plan.new_remaining, Some(dec!(500)));
        assert!(!plan.settles);
    }

    #[test]
    fn test_full_mode_settlement_and_underpayment() {
        let booking = full_booking(BookingStatus::PendingPayment, dec!(0));
        let plan = plan_payment(&booking, dec!(1000)).unwrap();
        assert_eq!(plan.to, BookingStatus::PaymentCompleted);
        assert!(plan.settles);
        assert_eq!(plan.new_remaining, None);

        let plan = plan_payment(&booking, dec!(400)).unwrap();
        assert_eq!(plan.to, BookingStatus::PendingPayment);
        assert!(!plan.settles);
    }

    #[test]
    fn test_settled_states_reject_new_money() {
        for status in [
            BookingStatus::PaymentCompleted,
            BookingStatus::Confirmed,
            BookingStatus::TrekCompleted,
            BookingStatus::Cancelled,
        ] {
            let booking = full_booking(status, dec!(1000));
            let err = plan_payment(&booking, dec!(10)).unwrap_err();
            assert!(
                matches!(err, AppError::Payment(PaymentError::AlreadySettled(_))),
                "status {:?} should be already-settled",
                status
            );
        }
    }

    #[test]
    fn test_ack_only_error_classification() {
        assert!(is_ack_only_error(
            &PaymentError::AlreadySettled("pay_1".into()).into()
        ));
        assert!(is_ack_only_error(
            &BookingError::NotFound(Uuid::new_v4()).into()
        ));
        assert!(!is_ack_only_error(&PaymentError::SignatureInvalid.into()));
    }
}

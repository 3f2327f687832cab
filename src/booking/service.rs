use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::models::{
    Booking, BookingStatus, CancelActor, FailedBooking, Participant, PaymentMode,
    PromoCodeDetails, RefundStatus,
};
use super::repository::{BookingRepository, NewBooking};
use crate::error::{AppError, AppResult, BookingError};
use crate::inventory::SeatLedger;
use crate::notify::Notifier;
use crate::payment::PaymentGateway;
use crate::promo::PromoRepository;
use crate::refund::{self, RefundInput, RefundSchedule};
use crate::treks::TrekRepository;

/// Pricing/scheduling policy knobs, lifted from Config at bootstrap.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub session_hold_minutes: i64,
    /// Initial tranche of a partial booking, percent of total.
    pub partial_initial_percent: u32,
    /// Days before departure when the remaining balance falls due.
    pub final_due_days: i64,
    /// Flat non-refundable deposit for full-payment bookings.
    pub booking_deposit: Decimal,
}

pub struct CreateBookingParams {
    pub user_id: Uuid,
    pub trek_id: Uuid,
    pub batch_id: Uuid,
    pub number_of_participants: i32,
    pub payment_mode: PaymentMode,
    pub promo_code: Option<String>,
    pub auto_cancel_on_due_date: bool,
}

/// Booking lifecycle owner. All status transitions and seat movements for
/// the request path and the sweeps funnel through here.
pub struct BookingService {
    bookings: Arc<BookingRepository>,
    treks: Arc<TrekRepository>,
    ledger: Arc<SeatLedger>,
    promos: Arc<PromoRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<Notifier>,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        bookings: Arc<BookingRepository>,
        treks: Arc<TrekRepository>,
        ledger: Arc<SeatLedger>,
        promos: Arc<PromoRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<Notifier>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            bookings,
            treks,
            ledger,
            promos,
            gateway,
            notifier,
            policy,
        }
    }

    // ========== CREATION ==========

    /// Create a booking in pending_payment with its seat reservation and
    /// session expiry. Seat claim and booking row commit in one
    /// transaction; the gateway order is registered afterwards so a slow
    /// gateway cannot hold the batch row.
    pub async fn create_booking(&self, params: CreateBookingParams) -> AppResult<Booking> {
        let batch = self
            .treks
            .get_batch(params.batch_id)
            .await?
            .ok_or(BookingError::BatchNotFound(params.batch_id))?;

        if batch.trek_id != params.trek_id {
            return Err(AppError::InvalidInput(format!(
                "batch {} does not belong to trek {}",
                params.batch_id, params.trek_id
            )));
        }
        if !batch.is_open_for_booking() {
            return Err(BookingError::BatchNotOpen(batch.id).into());
        }

        let gross = batch.price * Decimal::from(params.number_of_participants);

        let promo_details = match &params.promo_code {
            Some(code) => Some(self.price_promo(code, params.trek_id, gross).await?),
            None => None,
        };
        let total = match &promo_details {
            Some(p) => (gross - p.discount_amount).max(Decimal::ZERO),
            None => gross,
        };

        let now = Utc::now();
        let (initial_amount, remaining_amount, final_due) = match params.payment_mode {
            PaymentMode::Partial => {
                let initial = (total * Decimal::from(self.policy.partial_initial_percent)
                    / Decimal::new(100, 0))
                .round_dp(2);
                let departure = Utc
                    .from_utc_datetime(&batch.start_date.and_hms_opt(0, 0, 0).unwrap());
                let due = (departure - Duration::days(self.policy.final_due_days)).max(now);
                (Some(initial), Some(total - initial), Some(due))
            }
            PaymentMode::Full => (None, None, None),
        };

        let mut tx = self.bookings.begin_tx().await?;

        // Admission gate: atomic seat claim; CapacityExceeded aborts before
        // any booking row exists.
        let reservation = self
            .ledger
            .reserve(&mut tx, batch.id, params.number_of_participants)
            .await?;

        let booking = self
            .bookings
            .create(
                &mut tx,
                NewBooking {
                    user_id: params.user_id,
                    trek_id: params.trek_id,
                    batch_id: params.batch_id,
                    number_of_participants: params.number_of_participants,
                    payment_mode: params.payment_mode,
                    total_price: total,
                    initial_amount,
                    remaining_amount,
                    final_payment_due_date: final_due,
                    auto_cancel_on_due_date: params.auto_cancel_on_due_date,
                    session_expires_at: now
                        + Duration::minutes(self.policy.session_hold_minutes),
                    promo_code_details: promo_details,
                },
            )
            .await?;

        tx.commit().await?;

        info!(
            "Booking {} created on batch {} ({} seats, {:?})",
            booking.id, reservation.batch_id, reservation.count, params.payment_mode
        );

        // Register the gateway order for the first payable amount. On
        // failure the reservation stands and the expiry sweep reclaims it
        // if the customer never retries.
        let payable = initial_amount.unwrap_or(total);
        match self
            .gateway
            .create_order(
                payable,
                "INR",
                &booking.id.to_string(),
                serde_json::json!({ "booking_id": booking.id }),
            )
            .await
        {
            Ok(order) => {
                self.bookings.set_gateway_order(booking.id, &order.id).await?;
            }
            Err(e) => {
                error!(
                    "Gateway order creation failed for booking {}: {:?}",
                    booking.id, e
                );
                return Err(e);
            }
        }

        self.bookings
            .get(booking.id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking.id).into())
    }

    async fn price_promo(
        &self,
        code: &str,
        trek_id: Uuid,
        order_value: Decimal,
    ) -> AppResult<PromoCodeDetails> {
        let promo = self
            .promos
            .get_by_code(code)
            .await?
            .ok_or_else(|| BookingError::PromoInvalid("unknown code".to_string()))?;

        promo
            .check_applicable(trek_id, order_value, Utc::now())
            .map_err(|reason| BookingError::PromoInvalid(reason.to_string()))?;

        Ok(PromoCodeDetails {
            code: promo.code.clone(),
            promo_code_id: promo.id,
            discount_amount: promo.discount_for(order_value),
        })
    }

    // ========== CANCELLATION ==========

    /// Cancel a booking from any cancellable state: guarded transition,
    /// tiered refund recorded as processing, seat released, notification
    /// best-effort. Used by customers, admins and both sweeps.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        reason: &str,
        actor: CancelActor,
    ) -> AppResult<Booking> {
        let mut tx = self.bookings.begin_tx().await?;

        let booking = self
            .bookings
            .get_for_update(&mut tx, booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        if !booking.status.is_cancellable() {
            return Err(BookingError::InvalidStateTransition {
                from: booking.status.as_str().to_string(),
                to: BookingStatus::Cancelled.as_str().to_string(),
            }
            .into());
        }

        let batch = self
            .treks
            .get_batch(booking.batch_id)
            .await?
            .ok_or(BookingError::BatchNotFound(booking.batch_id))?;

        let deposit = booking
            .initial_amount
            .unwrap_or(self.policy.booking_deposit);
        let quote = refund::calculate(
            RefundSchedule::for_actor(actor),
            RefundInput {
                total_amount: booking.total_price,
                total_paid: booking.amount_paid,
                deposit,
                days_until_departure: batch.days_until_departure(Utc::now().date_naive()),
            },
        );

        self.bookings
            .mark_cancelled(
                &mut tx,
                booking_id,
                booking.status,
                reason,
                actor,
                quote.total(),
                RefundStatus::Processing,
            )
            .await?;

        self.ledger
            .release(&mut tx, booking.batch_id, booking.number_of_participants)
            .await?;

        tx.commit().await?;

        info!(
            "Booking {} cancelled by {} ({}); refund {} cash / {} credit",
            booking_id,
            actor.as_str(),
            reason,
            quote.cash,
            quote.credit
        );

        let updated = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        let notifier = self.notifier.clone();
        let for_email = updated.clone();
        tokio::spawn(async move {
            notifier
                .try_send(
                    "booking_cancelled",
                    notifier.booking_cancelled(&for_email, &quote),
                )
                .await;
        });

        Ok(updated)
    }

    // ========== PARTICIPANT DETAILS ==========

    /// Store traveller details after payment. A fully paid booking advances
    /// to confirmed; a partial one holds its details until the balance
    /// clears.
    pub async fn set_participant_details(
        &self,
        booking_id: Uuid,
        details: Vec<Participant>,
    ) -> AppResult<Booking> {
        let mut tx = self.bookings.begin_tx().await?;

        let booking = self
            .bookings
            .get_for_update(&mut tx, booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        if details.len() != booking.number_of_participants as usize {
            return Err(BookingError::ParticipantCountMismatch {
                expected: booking.number_of_participants,
                got: details.len(),
            }
            .into());
        }

        match booking.status {
            BookingStatus::PaymentConfirmedPartial | BookingStatus::PaymentCompleted => {}
            other => {
                return Err(AppError::BadRequest(format!(
                    "participant details cannot be supplied while booking is {}",
                    other
                )));
            }
        }

        self.bookings
            .set_participant_details(&mut tx, booking_id, &details)
            .await?;

        if booking.status == BookingStatus::PaymentCompleted {
            self.bookings
                .update_status(
                    &mut tx,
                    booking_id,
                    BookingStatus::PaymentCompleted,
                    BookingStatus::Confirmed,
                )
                .await?;
        }

        tx.commit().await?;

        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id).into())
    }

    /// Advance every confirmed booking on a completed batch to
    /// trek_completed. Invoked by the administrative batch-status flow.
    pub async fn complete_batch_bookings(&self, batch_id: Uuid) -> AppResult<u64> {
        let advanced = self.bookings.complete_for_batch(batch_id).await?;
        if advanced > 0 {
            info!(
                "Marked {} bookings trek_completed for batch {}",
                advanced, batch_id
            );
        }
        Ok(advanced)
    }

    // ========== READS ==========

    pub async fn get_booking(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id).into())
    }

    pub async fn list_user_bookings(&self, user_id: Uuid) -> AppResult<Vec<Booking>> {
        self.bookings.list_for_user(user_id).await
    }

    /// Archived reservations for a batch (expiry-sweep output).
    pub async fn list_failed_bookings(&self, batch_id: Uuid) -> AppResult<Vec<FailedBooking>> {
        self.bookings.list_failed_for_batch(batch_id).await
    }
}

use std::sync::Arc;
use tracing::{error, info};

use crate::booking::models::CancelActor;
use crate::booking::repository::BookingRepository;
use crate::booking::service::BookingService;
use crate::error::{AppError, AppResult, BookingError};

pub const CANCEL_REASON_OVERDUE: &str = "non-payment of remaining balance";

#[derive(Debug, Default, Clone, Copy)]
pub struct AutoCancelReport {
    pub examined: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

/// Auto-cancel sweep - cancels partially-paid bookings whose final balance
/// is overdue, but only where both the booking and its batch opted in.
/// Goes through the same cancel path as a customer request, so seat
/// release, refund calculation and notification all behave identically.
pub struct AutoCancelSweep {
    bookings: Arc<BookingRepository>,
    service: Arc<BookingService>,
}

impl AutoCancelSweep {
    pub fn new(bookings: Arc<BookingRepository>, service: Arc<BookingService>) -> Self {
        Self { bookings, service }
    }

    pub async fn run(&self) -> AppResult<AutoCancelReport> {
        // The selection query enforces the dual opt-in: booking-level flag
        // AND batch-level flag. A booking flag alone is not enough.
        let overdue = self.bookings.list_overdue_partials().await?;

        let mut report = AutoCancelReport {
            examined: overdue.len(),
            ..Default::default()
        };

        if overdue.is_empty() {
            return Ok(report);
        }

        info!("Auto-cancel sweep: {} overdue partial bookings", overdue.len());

        for booking in &overdue {
            match self
                .service
                .cancel(booking.id, CANCEL_REASON_OVERDUE, CancelActor::System)
                .await
            {
                Ok(_) => report.cancelled += 1,
                // Lost a race with a final-balance payment or another
                // canceller: the booking left the cancellable set, which is
                // exactly the idempotent outcome we want.
                Err(AppError::Booking(BookingError::InvalidStateTransition { .. }))
                | Err(AppError::Booking(BookingError::NotFound(_))) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    error!("Auto-cancel failed for booking {}: {:?}", booking.id, e);
                }
            }
        }

        info!(
            "Auto-cancel sweep complete: {} examined, {} cancelled, {} skipped",
            report.examined, report.cancelled, report.skipped
        );

        Ok(report)
    }
}

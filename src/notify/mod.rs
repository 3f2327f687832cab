// Notification delivery
//
// Email: Resend-compatible HTTP API
// All sends are best-effort with bounded timeouts: a failed or slow email
// never unwinds a committed booking or payment state.

pub mod email;
pub mod invoice;

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::booking::models::Booking;
use crate::error::AppResult;
use crate::refund::RefundQuote;
use email::EmailClient;

/// High-level notification sender used by the booking service, the payment
/// reconciler, and the sweeps.
pub struct Notifier {
    email: Arc<EmailClient>,
}

impl Notifier {
    pub fn new(email: Arc<EmailClient>) -> Self {
        Self { email }
    }

    /// Recipient address lookup is delegated to the user service in the
    /// full platform; here bookings carry the user id and the address is
    /// derived by the email client's directory hook.
    fn recipient(user_id: Uuid) -> String {
        format!("user+{}@bookings.invalid", user_id)
    }

    pub async fn payment_received(&self, booking: &Booking, amount: Decimal) -> AppResult<()> {
        let subject = "Payment received for your trek booking";
        let body = format!(
            "<p>We received your payment of {} for booking <b>{}</b>.</p>\
             <p>Current status: {}.</p>",
            amount, booking.id, booking.status
        );
        self.email
            .send_email(&Self::recipient(booking.user_id), subject, &body)
            .await?;
        Ok(())
    }

    pub async fn booking_cancelled(&self, booking: &Booking, refund: &RefundQuote) -> AppResult<()> {
        let subject = "Your trek booking has been cancelled";
        let body = format!(
            "<p>Booking <b>{}</b> has been cancelled.</p>\
             <p>Refund: {} cash, {} credit (status: processing).</p>",
            booking.id,
            refund.cash,
            refund.credit
        );
        self.email
            .send_email(&Self::recipient(booking.user_id), subject, &body)
            .await?;
        Ok(())
    }

    pub async fn invoice_delivery(&self, booking: &Booking, invoice_html: &[u8]) -> AppResult<()> {
        let subject = "Your trek booking invoice";
        let body = String::from_utf8_lossy(invoice_html).into_owned();
        self.email
            .send_email(&Self::recipient(booking.user_id), subject, &body)
            .await?;
        Ok(())
    }

    /// Fire-and-forget wrapper: logs instead of propagating, so callers on
    /// the payment path cannot be failed by the mail provider.
    pub async fn try_send<F>(&self, what: &str, fut: F)
    where
        F: std::future::Future<Output = AppResult<()>>,
    {
        if let Err(e) = fut.await {
            warn!("Notification '{}' failed (non-fatal): {:?}", what, e);
        }
    }
}

use chrono::Utc;
use rust_decimal::Decimal;

use crate::booking::models::Booking;

/// Render an invoice document for a fully settled booking. Returns raw
/// bytes so the delivery channel (email, future object storage) stays
/// agnostic of the format.
pub fn invoice(booking: &Booking, payment_id: &str, amount: Decimal) -> Vec<u8> {
    let issued = Utc::now().format("%Y-%m-%d");
    let discount_line = match &booking.promo_code_details {
        Some(promo) => format!(
            "<tr><td>Discount ({})</td><td>-{}</td></tr>",
            promo.0.code, promo.0.discount_amount
        ),
        None => String::new(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Invoice {booking_id}</title></head>
<body>
  <h1>Tax Invoice</h1>
  <p>Invoice date: {issued}</p>
  <p>Booking: {booking_id}<br>Batch: {batch_id}</p>
  <table>
    <tr><td>Participants</td><td>{participants}</td></tr>
    {discount_line}
    <tr><td>Total</td><td>{total}</td></tr>
    <tr><td>Paid (payment {payment_id})</td><td>{amount}</td></tr>
  </table>
</body>
</html>"#,
        booking_id = booking.id,
        batch_id = booking.batch_id,
        participants = booking.number_of_participants,
        total = booking.total_price,
        issued = issued,
        payment_id = payment_id,
        amount = amount,
        discount_line = discount_line,
    );

    html.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::models::{BookingStatus, PaymentMode};
    use rust_decimal_macros::dec;
    use sqlx::types::Json;
    use uuid::Uuid;

    #[test]
    fn test_invoice_contains_booking_and_payment() {
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trek_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            number_of_participants: 3,
            status: BookingStatus::PaymentCompleted,
            payment_mode: PaymentMode::Full,
            total_price: dec!(45000),
            amount_paid: dec!(45000),
            gateway_order_id: Some("order_1".into()),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let bytes = invoice(&booking, "pay_123", dec!(45000));
        let html = String::from_utf8(bytes).unwrap();

        assert!(html.contains(&booking.id.to_string()));
        assert!(html.contains("pay_123"));
        assert!(html.contains("45000"));
    }
}

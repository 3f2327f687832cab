use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use tracing::{error, info};
use validator::Validate;

use super::models::{
    PaymentWebhookPayload, VerifyPaymentRequest, VerifyPaymentResponse, WebhookAck,
};
use super::reconciler::is_ack_only_error;
use crate::error::{AppError, AppResult, PaymentError};
use crate::server::AppState;

const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Client-side payment verification callback
/// POST /api/v1/payments/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> AppResult<Json<VerifyPaymentResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let booking = state
        .reconciler
        .verify_and_apply(
            request.booking_id,
            &request.gateway_payment_id,
            &request.gateway_order_id,
            &request.signature,
        )
        .await?;

    Ok(Json(VerifyPaymentResponse {
        booking_id: booking.id,
        status: booking.status.as_str().to_string(),
        amount_paid: booking.amount_paid,
        remaining_amount: booking.remaining_amount,
    }))
}

/// Asynchronous gateway webhook
/// POST /api/v1/webhook/payment
///
/// The raw body is signed with the webhook secret. Conditions the gateway
/// cannot fix by retrying (unknown booking, already-applied payment,
/// uncaptured status) are logged and acknowledged with 200 so redelivery
/// stops; a bad signature is the one hard rejection.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.gateway.verify_webhook_signature(&body, signature) {
        error!("Webhook rejected: invalid signature");
        return Err(PaymentError::SignatureInvalid.into());
    }

    let payload: PaymentWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidInput(format!("invalid webhook payload: {}", e)))?;

    info!(
        "Webhook {} received for booking {} (payment {})",
        payload.event_id, payload.booking_id, payload.payment_id
    );

    match state.reconciler.apply_webhook(&payload).await {
        Ok(booking) => Ok(Json(WebhookAck {
            status: "processed".to_string(),
            message: format!("booking {} now {}", booking.id, booking.status),
        })),
        Err(e) if is_ack_only_error(&e) => {
            info!(
                "Webhook {} acknowledged without action: {}",
                payload.event_id, e
            );
            Ok(Json(WebhookAck {
                status: "acknowledged".to_string(),
                message: e.to_string(),
            }))
        }
        Err(e) => Err(e),
    }
}

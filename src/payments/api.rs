use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppResult;

use super::service::PaymentService;

/// key: payments-api -> checkout endpoints
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Amount in minor currency units (paise).
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(rename = "planId", default)]
    pub plan_id: String,
    #[serde(rename = "planType", default)]
    pub plan_type: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
}

pub async fn create_order(
    Extension(service): Extension<PaymentService>,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<Json<CreateOrderResponse>> {
    let created = service
        .create_order(
            payload.amount,
            payload.currency.as_deref(),
            &payload.plan_id,
            &payload.plan_type,
            payload.user_id.as_deref(),
        )
        .await?;

    if !created.notes.is_empty() {
        warn!(order_id = %created.order_id, notes = ?created.notes, "order created with degraded bookkeeping");
    }

    Ok(Json(CreateOrderResponse {
        success: true,
        order_id: created.order_id,
        amount: created.amount,
        currency: created.currency,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "paymentId", skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn verify_payment(
    Extension(service): Extension<PaymentService>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> AppResult<(StatusCode, Json<VerifyPaymentResponse>)> {
    let outcome = service
        .verify_payment(
            &payload.razorpay_order_id,
            &payload.razorpay_payment_id,
            &payload.razorpay_signature,
            payload.user_id.as_deref(),
        )
        .await?;

    if !outcome.verified {
        // A rejected payment, not a server fault.
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(VerifyPaymentResponse {
                success: false,
                message: None,
                payment_id: None,
                error: Some("Invalid payment signature. Payment may be fraudulent.".to_string()),
            }),
        ));
    }

    if !outcome.notes.is_empty() {
        warn!(
            order_id = %payload.razorpay_order_id,
            notes = ?outcome.notes,
            "payment verified with degraded bookkeeping"
        );
    }

    Ok((
        StatusCode::OK,
        Json(VerifyPaymentResponse {
            success: true,
            message: Some("Payment verified and subscription activated!".to_string()),
            payment_id: Some(outcome.payment_id),
            error: None,
        }),
    ))
}

use axum::{routing::post, Router};

use crate::{chat, payments};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/payments/create-order", post(payments::api::create_order))
        .route("/api/payments/verify", post(payments::api::verify_payment))
        .route("/api/ai/chat", post(chat::chat))
}

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::RazorpayConfig;
use crate::error::{AppError, AppResult};

/// A provider-side order, referenced locally only by id. Immutable once
/// created; never mutated here.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: Value,
}

/// key: payments-provider -> order API client
///
/// Thin client for the Razorpay Orders API. The base URL is explicit so
/// tests can point it at a mock server; credentials go out as Basic auth.
#[derive(Clone)]
pub struct RazorpayClient {
    base: String,
    key_id: String,
    key_secret: String,
    client: Client,
}

impl RazorpayClient {
    pub fn new(
        base: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("client build"),
        }
    }

    pub fn from_config(config: &RazorpayConfig) -> Self {
        Self::new(&config.api_base, &config.key_id, &config.key_secret)
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.key_id, self.key_secret);
        format!("Basic {}", BASE64.encode(credentials))
    }

    /// Create a provider order. A rejection reported in the response body is
    /// surfaced as a provider error; nothing is retried.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
        notes: Value,
    ) -> AppResult<ProviderOrder> {
        let url = format!("{}/v1/orders", self.base);
        let body: Value = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
                "notes": notes,
            }))
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = body.get("error").filter(|value| !value.is_null()) {
            return Err(AppError::Provider(provider_error_message(error)));
        }

        serde_json::from_value(body)
            .map_err(|err| AppError::Provider(format!("malformed order response: {err}")))
    }

    /// List recent provider orders, newest first. Used by the
    /// reconciliation sweep to spot orders with no local records.
    pub async fn list_orders(&self, count: i64) -> AppResult<Vec<ProviderOrder>> {
        let url = format!("{}/v1/orders", self.base);
        let body: Value = self
            .client
            .get(&url)
            .query(&[("count", count)])
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = body.get("error").filter(|value| !value.is_null()) {
            return Err(AppError::Provider(provider_error_message(error)));
        }

        let items = body
            .get("items")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(items)
            .map_err(|err| AppError::Provider(format!("malformed order listing: {err}")))
    }
}

fn provider_error_message(error: &Value) -> String {
    error
        .get("description")
        .and_then(Value::as_str)
        .or_else(|| error.get("code").and_then(Value::as_str))
        .unwrap_or("payment provider rejected the request")
        .to_string()
}

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::audit;
use crate::error::{AppError, AppResult};
use crate::signature;

use super::models::{
    owner_type_for, plan_unlocks, PaymentTransaction, TransactionMetadata, DEFAULT_CURRENCY,
    PAYMENT_PROVIDER, SUBSCRIPTION_TERM_DAYS,
};
use super::provider::RazorpayClient;

/// Prefix for provider receipt strings: `welist_<userId>_<epochMillis>`.
pub const RECEIPT_NAMESPACE: &str = "welist";

/// Result of order creation. `notes` carries the outcome of the best-effort
/// local bookkeeping; the order id is usable either way.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub notes: Vec<String>,
}

/// Result of payment verification. The signature check is the only step
/// that can flip `verified`; `notes` records which downstream bookkeeping
/// steps degraded.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub payment_id: String,
    pub notes: Vec<String>,
}

/// key: payments-service -> order + verification lifecycle
///
/// Pure orchestration over externally owned records: the provider owns the
/// order, the store owns subscriptions and transactions. Holds no state of
/// its own.
#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    provider: RazorpayClient,
    key_secret: String,
}

impl PaymentService {
    pub fn new(pool: PgPool, provider: RazorpayClient, key_secret: impl Into<String>) -> Self {
        Self {
            pool,
            provider,
            key_secret: key_secret.into(),
        }
    }

    /// Create a provider order plus the matching local `pending`
    /// subscription and transaction pair.
    ///
    /// Validation fails fast with no side effects. Once the provider order
    /// exists, local insert failures are logged and noted but do not fail
    /// the call: the client must still receive an order id it can verify
    /// against later, and the reconciliation sweep repairs the gap.
    pub async fn create_order(
        &self,
        amount: Option<i64>,
        currency: Option<&str>,
        plan_id: &str,
        plan_type: &str,
        user_id: Option<&str>,
    ) -> AppResult<CreatedOrder> {
        let amount = match amount {
            Some(value) if value >= 100 => value,
            _ => return Err(AppError::BadRequest("Invalid amount".to_string())),
        };
        let user_id = user_id
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::BadRequest("User ID required".to_string()))?;
        let owner_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::BadRequest("Invalid user ID".to_string()))?;

        let currency = currency
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CURRENCY);
        let receipt = format!(
            "{RECEIPT_NAMESPACE}_{user_id}_{}",
            Utc::now().timestamp_millis()
        );
        let order = self
            .provider
            .create_order(
                amount,
                currency,
                &receipt,
                json!({
                    "planId": plan_id,
                    "planType": plan_type,
                    "userId": user_id,
                }),
            )
            .await?;

        let unlocks = plan_unlocks(plan_id);
        let start = Utc::now();
        let end = start + Duration::days(SUBSCRIPTION_TERM_DAYS);
        let major_amount = amount as f64 / 100.0;
        let mut notes = Vec::new();

        let subscription_id: Option<Uuid> = match sqlx::query_scalar(
            r#"
            INSERT INTO subscriptions
                (owner_id, owner_type, plan, status, amount, currency, order_id, start_date, end_date)
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(owner_id)
        .bind(owner_type_for(plan_type))
        .bind(plan_id)
        .bind(major_amount)
        .bind(currency)
        .bind(&order.id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                error!(?err, order_id = %order.id, "failed to record pending subscription");
                notes.push("payments:subscription-record-failed".to_string());
                None
            }
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_transactions
                (user_id, subscription_id, amount, currency, payment_provider,
                 order_id, status, description, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
            "#,
        )
        .bind(owner_id)
        .bind(subscription_id)
        .bind(major_amount)
        .bind(currency)
        .bind(PAYMENT_PROVIDER)
        .bind(&order.id)
        .bind(format!("Subscription: {plan_id}"))
        .bind(json!({
            "planId": plan_id,
            "planType": plan_type,
            "unlocks": unlocks,
        }))
        .execute(&self.pool)
        .await;
        if let Err(err) = inserted {
            error!(?err, order_id = %order.id, "failed to record pending transaction");
            notes.push("payments:transaction-record-failed".to_string());
        }

        Ok(CreatedOrder {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            notes,
        })
    }

    /// Verify a completed checkout and drive the state transition.
    ///
    /// The cryptographic check is the sole gate of trust: a mismatch aborts
    /// with no mutation. Past it, the client already holds proof of payment,
    /// so every bookkeeping step is best-effort: failures are logged and
    /// noted, never escalated into a verification failure.
    pub async fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        candidate_signature: &str,
        user_id: Option<&str>,
    ) -> AppResult<VerificationOutcome> {
        if order_id.is_empty() || payment_id.is_empty() || candidate_signature.is_empty() {
            return Err(AppError::BadRequest(
                "Missing required payment fields".to_string(),
            ));
        }

        if !signature::verify(order_id, payment_id, candidate_signature, &self.key_secret) {
            warn!(%order_id, %payment_id, "invalid payment signature");
            return Ok(VerificationOutcome {
                verified: false,
                payment_id: payment_id.to_string(),
                notes: Vec::new(),
            });
        }

        let mut notes = Vec::new();

        // Transaction lookup by order id is unique; the same update with the
        // same inputs is a no-op in effect, so retries are safe.
        match sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'success', payment_id = $2, signature = $3, updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(payment_id)
        .bind(candidate_signature)
        .execute(&self.pool)
        .await
        {
            Ok(result) if result.rows_affected() == 0 => {
                warn!(%order_id, "no transaction recorded for verified order");
                notes.push("payments:transaction-missing".to_string());
            }
            Ok(_) => {}
            Err(err) => {
                error!(?err, %order_id, "failed to mark transaction successful");
                notes.push("payments:transaction-update-failed".to_string());
            }
        }

        let transaction = match sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(err) => {
                error!(?err, %order_id, "failed to load transaction after update");
                notes.push("payments:transaction-load-failed".to_string());
                None
            }
        };

        let user_uuid = match user_id.filter(|value| !value.is_empty()) {
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(user_id = raw, "unparseable user id on verification request");
                    notes.push("payments:user-id-unparseable".to_string());
                    None
                }
            },
            None => None,
        };

        if let Some(transaction) = transaction {
            let metadata = TransactionMetadata::from_value(&transaction.metadata);

            if let Some(subscription_id) = transaction.subscription_id {
                // Re-activating an already-active subscription is a no-op.
                if let Err(err) = sqlx::query(
                    r#"
                    UPDATE subscriptions
                    SET status = 'active', payment_id = $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(subscription_id)
                .bind(payment_id)
                .execute(&self.pool)
                .await
                {
                    error!(?err, %subscription_id, "failed to activate subscription");
                    notes.push("payments:subscription-activation-failed".to_string());
                }
            } else {
                notes.push("payments:subscription-missing".to_string());
            }

            // The unlock count comes from the transaction's stored metadata,
            // priced at order creation, never recomputed here.
            if let (Some(plan_id), Some(owner)) = (metadata.plan_id.as_deref(), user_uuid) {
                if let Err(err) = sqlx::query(
                    r#"
                    UPDATE users
                    SET subscription_plan = $2, unlocks_remaining = $3, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(owner)
                .bind(plan_id)
                .bind(metadata.unlocks)
                .execute(&self.pool)
                .await
                {
                    error!(?err, user_id = %owner, "failed to grant entitlements");
                    notes.push("payments:entitlement-grant-failed".to_string());
                }
            }
        }

        if let Some(owner) = user_uuid {
            if let Err(err) = audit::record_event(
                &self.pool,
                owner,
                "payment_success",
                json!({ "order_id": order_id, "payment_id": payment_id }),
            )
            .await
            {
                error!(?err, user_id = %owner, "failed to append payment audit event");
                notes.push("payments:audit-append-failed".to_string());
            }
        }

        Ok(VerificationOutcome {
            verified: true,
            payment_id: payment_id.to_string(),
            notes,
        })
    }
}

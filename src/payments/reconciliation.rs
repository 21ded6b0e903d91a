use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{
    owner_type_for, plan_unlocks, Subscription, TransactionMetadata, PAYMENT_PROVIDER,
    SUBSCRIPTION_TERM_DAYS,
};
use super::provider::RazorpayClient;
use super::service::RECEIPT_NAMESPACE;

/// What one sweep repaired.
#[derive(Debug)]
pub struct ReconciliationReport {
    pub transactions_recreated: usize,
    pub subscriptions_backfilled: usize,
}

/// How many recent provider orders one sweep inspects.
const PROVIDER_ORDER_SCAN_COUNT: i64 = 100;

/// key: payments-reconciliation -> background repair worker
///
/// Order creation deliberately keeps going when a local insert fails after
/// the provider order already exists. This sweep closes that gap on a
/// cadence: it recreates transactions missing for provider orders in our
/// receipt namespace, then backfills subscriptions for transactions that
/// lost theirs. Each tick is idempotent.
pub fn spawn(pool: PgPool, provider: RazorpayClient, interval_secs: u64) {
    let interval = TokioDuration::from_secs(interval_secs);
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            match process_tick(&pool, &provider).await {
                Ok(report)
                    if report.transactions_recreated > 0
                        || report.subscriptions_backfilled > 0 =>
                {
                    info!(
                        transactions = report.transactions_recreated,
                        subscriptions = report.subscriptions_backfilled,
                        "payment reconciliation repaired records"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(?err, "payment reconciliation tick failed"),
            }
        }
    });
}

/// key: payments-reconciliation -> tick handler
pub async fn process_tick(pool: &PgPool, provider: &RazorpayClient) -> Result<ReconciliationReport> {
    let transactions_recreated = recreate_missing_transactions(pool, provider).await?;
    let subscriptions_backfilled = backfill_missing_subscriptions(pool).await?;
    Ok(ReconciliationReport {
        transactions_recreated,
        subscriptions_backfilled,
    })
}

async fn recreate_missing_transactions(pool: &PgPool, provider: &RazorpayClient) -> Result<usize> {
    let orders = provider.list_orders(PROVIDER_ORDER_SCAN_COUNT).await?;
    let mut recreated = 0;

    for order in orders {
        let ours = order
            .receipt
            .as_deref()
            .map(|receipt| receipt.starts_with(&format!("{RECEIPT_NAMESPACE}_")))
            .unwrap_or(false);
        if !ours {
            continue;
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM payment_transactions WHERE order_id = $1)",
        )
        .bind(&order.id)
        .fetch_one(pool)
        .await?;
        if exists {
            continue;
        }

        let plan_id = order.notes.get("planId").and_then(Value::as_str);
        let plan_type = order
            .notes
            .get("planType")
            .and_then(Value::as_str)
            .unwrap_or("");
        let user_id = order
            .notes
            .get("userId")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok());
        let (Some(plan_id), Some(user_id)) = (plan_id, user_id) else {
            warn!(order_id = %order.id, "provider order lacks usable notes; skipping");
            continue;
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_transactions
                (user_id, amount, currency, payment_provider, order_id,
                 status, description, metadata)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(order.amount as f64 / 100.0)
        .bind(&order.currency)
        .bind(PAYMENT_PROVIDER)
        .bind(&order.id)
        .bind(format!("Subscription: {plan_id}"))
        .bind(json!({
            "planId": plan_id,
            "planType": plan_type,
            "unlocks": plan_unlocks(plan_id),
        }))
        .execute(pool)
        .await;

        match inserted {
            Ok(result) if result.rows_affected() > 0 => {
                info!(order_id = %order.id, "recreated missing transaction record");
                recreated += 1;
            }
            Ok(_) => {}
            Err(err) => warn!(?err, order_id = %order.id, "failed to recreate transaction"),
        }
    }

    Ok(recreated)
}

#[derive(Debug, FromRow)]
struct OrphanedTransaction {
    id: Uuid,
    user_id: Uuid,
    order_id: String,
    amount: f64,
    currency: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

async fn backfill_missing_subscriptions(pool: &PgPool) -> Result<usize> {
    let orphans = sqlx::query_as::<_, OrphanedTransaction>(
        r#"
        SELECT id, user_id, order_id, amount, currency, status, metadata, created_at
        FROM payment_transactions
        WHERE subscription_id IS NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut backfilled = 0;

    for transaction in orphans {
        let metadata = TransactionMetadata::from_value(&transaction.metadata);
        let Some(plan_id) = metadata.plan_id.as_deref() else {
            warn!(order_id = %transaction.order_id, "transaction metadata lacks plan id; skipping");
            continue;
        };
        let plan_type = metadata.plan_type.as_deref().unwrap_or("");
        // A transaction already marked paid activates its rebuilt subscription.
        let status = if transaction.status == "success" {
            "active"
        } else {
            "pending"
        };
        let start = transaction.created_at;
        let end = start + Duration::days(SUBSCRIPTION_TERM_DAYS);

        let insert = sqlx::query(
            r#"
            INSERT INTO subscriptions
                (owner_id, owner_type, plan, status, amount, currency, order_id, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(transaction.user_id)
        .bind(owner_type_for(plan_type))
        .bind(plan_id)
        .bind(status)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(&transaction.order_id)
        .bind(start)
        .bind(end)
        .execute(pool)
        .await;
        if let Err(err) = insert {
            warn!(?err, order_id = %transaction.order_id, "failed to rebuild subscription");
            continue;
        }

        // Link whichever subscription now owns the order id, whether this
        // tick inserted it or a concurrent verification did.
        let subscription =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE order_id = $1")
                .bind(&transaction.order_id)
                .fetch_optional(pool)
                .await;
        match subscription {
            Ok(Some(subscription)) => {
                if let Err(err) =
                    sqlx::query("UPDATE payment_transactions SET subscription_id = $1 WHERE id = $2")
                        .bind(subscription.id)
                        .bind(transaction.id)
                        .execute(pool)
                        .await
                {
                    warn!(?err, order_id = %transaction.order_id, "failed to link rebuilt subscription");
                    continue;
                }
                info!(order_id = %transaction.order_id, "backfilled missing subscription");
                backfilled += 1;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(?err, order_id = %transaction.order_id, "failed to look up rebuilt subscription")
            }
        }
    }

    Ok(backfilled)
}

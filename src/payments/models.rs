use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Provider name recorded on every transaction.
pub const PAYMENT_PROVIDER: &str = "razorpay";

/// Fixed subscription term granted per successful checkout.
pub const SUBSCRIPTION_TERM_DAYS: i64 = 30;

pub const DEFAULT_CURRENCY: &str = "INR";

/// key: payments-models -> subscription record
///
/// Local record of a purchased plan and its validity window. Created
/// `pending` at order-creation time; flips to `active` exactly once, driven
/// by a signature-verified payment for its order id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_type: String,
    pub plan: String,
    pub status: String,
    pub amount: f64,
    pub currency: String,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: payments-models -> transaction record
///
/// Local record of one payment attempt. Unique per provider order id;
/// verification locates the row to update through that key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub payment_provider: String,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub status: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lenient view of the metadata blob stored on a transaction. The unlock
/// count is priced at order creation and replayed verbatim at verification,
/// so later plan-table changes cannot reprice a recorded transaction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionMetadata {
    #[serde(rename = "planId", default)]
    pub plan_id: Option<String>,
    #[serde(rename = "planType", default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub unlocks: i32,
}

impl TransactionMetadata {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Unlock allowance per plan. Unknown plan ids grant nothing.
pub fn plan_unlocks(plan_id: &str) -> i32 {
    match plan_id {
        "basic" => 3,
        "plus" => 8,
        "pro" => 15,
        "starter" | "business" => 0,
        _ => 0,
    }
}

/// Partner checkouts subscribe the professional profile; everything else
/// subscribes the user.
pub fn owner_type_for(plan_type: &str) -> &'static str {
    if plan_type == "partner" {
        "professional"
    } else {
        "user"
    }
}

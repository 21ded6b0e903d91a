use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

/// Outcome of the daily AI quota check.
#[derive(Clone, Copy, Debug)]
pub struct QuotaStatus {
    pub can_use: bool,
    pub remaining: i32,
    pub is_paid: bool,
}

/// key: quota-gate -> daily free-tier AI limit
///
/// Decides whether a caller may invoke the AI path today. Unauthenticated
/// callers are always allowed with the full nominal limit (there is no
/// identity to track). Paid users are never blocked. Consumption is a
/// separate step taken only after a successful AI response, so a failed AI
/// call costs nothing.
#[derive(Clone)]
pub struct QuotaGate {
    pool: PgPool,
    daily_limit: i32,
}

impl QuotaGate {
    pub fn new(pool: PgPool, daily_limit: i32) -> Self {
        Self { pool, daily_limit }
    }

    pub fn daily_limit(&self) -> i32 {
        self.daily_limit
    }

    /// Check the caller's standing for today. Any failure to load the user
    /// or the counter degrades to the free-tier defaults rather than
    /// blocking the request.
    pub async fn check(&self, user_id: Option<Uuid>) -> QuotaStatus {
        let allowed_default = QuotaStatus {
            can_use: true,
            remaining: self.daily_limit,
            is_paid: false,
        };

        let Some(user_id) = user_id else {
            return allowed_default;
        };

        let row = sqlx::query(
            r#"
            SELECT
                u.subscription_plan IS NOT NULL AS is_paid,
                COALESCE(a.used_count, 0) AS used_count
            FROM users u
            LEFT JOIN ai_usage a
                ON a.user_id = u.id AND a.usage_date = CURRENT_DATE
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(Some(row)) => {
                let is_paid: bool = row.get("is_paid");
                let used: i32 = row.get("used_count");
                let remaining = (self.daily_limit - used).max(0);
                QuotaStatus {
                    can_use: is_paid || used < self.daily_limit,
                    remaining,
                    is_paid,
                }
            }
            Ok(None) => allowed_default,
            Err(err) => {
                warn!(?err, %user_id, "quota lookup failed; allowing request");
                allowed_default
            }
        }
    }

    /// Atomically count one use for today. Returns the new counter value.
    pub async fn consume(&self, user_id: Uuid) -> Result<i32, sqlx::Error> {
        let used: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO ai_usage (user_id, usage_date, used_count)
            VALUES ($1, CURRENT_DATE, 1)
            ON CONFLICT (user_id, usage_date)
            DO UPDATE SET used_count = ai_usage.used_count + 1
            RETURNING used_count
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(used)
    }
}

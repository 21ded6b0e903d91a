use httpmock::prelude::*;
use serde_json::json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use welist_backend::error::AppError;
use welist_backend::payments::{PaymentService, RazorpayClient};
use welist_backend::signature;

const KEY_SECRET: &str = "test_key_secret";

async fn seed_user(pool: &PgPool, email: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO users (email) VALUES ($1) RETURNING id")
        .bind(email)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn service_for(pool: &PgPool, server: &MockServer) -> PaymentService {
    let provider = RazorpayClient::new(server.base_url(), "rzp_test_key", KEY_SECRET);
    PaymentService::new(pool.clone(), provider, KEY_SECRET)
}

fn mock_order_created<'a>(server: &'a MockServer, order_id: &str, amount: i64) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(POST).path("/v1/orders");
        then.status(200).json_body(json!({
            "id": order_id,
            "amount": amount,
            "currency": "INR",
            "receipt": "welist_ignored",
            "notes": {},
        }));
    })
}

// key: payments-tests -> order creation records
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn create_order_records_pending_pair(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "buyer@example.com").await;

    let server = MockServer::start_async().await;
    let order_mock = mock_order_created(&server, "order_100", 500);
    let service = service_for(&pool, &server);

    let created = service
        .create_order(
            Some(500),
            None,
            "basic",
            "user",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();
    order_mock.assert();
    assert_eq!(created.order_id, "order_100");
    assert_eq!(created.amount, 500);
    assert_eq!(created.currency, "INR");
    assert!(created.notes.is_empty(), "no degraded bookkeeping expected");

    let subscription = sqlx::query(
        "SELECT owner_id, owner_type, plan, status, amount, currency FROM subscriptions WHERE order_id = $1",
    )
    .bind("order_100")
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(subscription.get::<Uuid, _>("owner_id"), user_id);
    assert_eq!(subscription.get::<String, _>("owner_type"), "user");
    assert_eq!(subscription.get::<String, _>("plan"), "basic");
    assert_eq!(subscription.get::<String, _>("status"), "pending");
    assert_eq!(subscription.get::<f64, _>("amount"), 5.0);
    assert_eq!(subscription.get::<String, _>("currency"), "INR");

    let transaction = sqlx::query(
        "SELECT subscription_id, status, payment_provider, metadata FROM payment_transactions WHERE order_id = $1",
    )
    .bind("order_100")
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(transaction.get::<Option<Uuid>, _>("subscription_id").is_some());
    assert_eq!(transaction.get::<String, _>("status"), "pending");
    assert_eq!(transaction.get::<String, _>("payment_provider"), "razorpay");
    let metadata: serde_json::Value = transaction.get("metadata");
    assert_eq!(metadata["planId"], "basic");
    assert_eq!(metadata["unlocks"], 3);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn create_order_validates_inputs_without_side_effects(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "validator@example.com").await;

    let server = MockServer::start_async().await;
    let order_mock = mock_order_created(&server, "order_unused", 100);
    let service = service_for(&pool, &server);

    let too_small = service
        .create_order(Some(99), None, "basic", "user", Some(&user_id.to_string()))
        .await;
    assert!(matches!(too_small, Err(AppError::BadRequest(_))));

    let missing_amount = service
        .create_order(None, None, "basic", "user", Some(&user_id.to_string()))
        .await;
    assert!(matches!(missing_amount, Err(AppError::BadRequest(_))));

    let missing_user = service
        .create_order(Some(500), None, "basic", "user", None)
        .await;
    assert!(matches!(missing_user, Err(AppError::BadRequest(_))));

    order_mock.assert_hits(0);
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orders, 0, "failed validation must not create records");

    // The floor itself is accepted.
    let at_floor = service
        .create_order(Some(100), None, "basic", "user", Some(&user_id.to_string()))
        .await;
    assert!(at_floor.is_ok());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn provider_rejection_creates_nothing(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "rejected@example.com").await;

    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/v1/orders");
        then.status(400).json_body(json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "Order amount exceeds limit" }
        }));
    });
    let service = service_for(&pool, &server);

    let result = service
        .create_order(Some(500), None, "basic", "user", Some(&user_id.to_string()))
        .await;
    match result {
        Err(AppError::Provider(message)) => assert_eq!(message, "Order amount exceeds limit"),
        other => panic!("expected provider error, got {other:?}"),
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn partner_plans_subscribe_the_professional(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "partner@example.com").await;

    let server = MockServer::start_async().await;
    let _order_mock = mock_order_created(&server, "order_partner", 900);
    let service = service_for(&pool, &server);

    service
        .create_order(
            Some(900),
            None,
            "starter",
            "partner",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();

    let owner_type: String =
        sqlx::query_scalar("SELECT owner_type FROM subscriptions WHERE order_id = $1")
            .bind("order_partner")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(owner_type, "professional");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_plan_prices_zero_unlocks(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "unknown-plan@example.com").await;

    let server = MockServer::start_async().await;
    let _order_mock = mock_order_created(&server, "order_unknown", 500);
    let service = service_for(&pool, &server);

    service
        .create_order(
            Some(500),
            None,
            "no-such-plan",
            "user",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();

    let metadata: serde_json::Value =
        sqlx::query_scalar("SELECT metadata FROM payment_transactions WHERE order_id = $1")
            .bind("order_unknown")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(metadata["unlocks"], 0);
}

// key: payments-tests -> verification lifecycle
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn verified_payment_activates_subscription_and_grants_unlocks(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "happy-path@example.com").await;

    let server = MockServer::start_async().await;
    let _order_mock = mock_order_created(&server, "order_e2e", 500);
    let service = service_for(&pool, &server);

    let created = service
        .create_order(
            Some(500),
            None,
            "basic",
            "user",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();

    let sig = signature::expected_signature(&created.order_id, "pay_42", KEY_SECRET);
    let outcome = service
        .verify_payment(&created.order_id, "pay_42", &sig, Some(&user_id.to_string()))
        .await
        .unwrap();
    assert!(outcome.verified);
    assert_eq!(outcome.payment_id, "pay_42");
    assert!(outcome.notes.is_empty(), "no degraded steps expected: {:?}", outcome.notes);

    let transaction = sqlx::query(
        "SELECT status, payment_id, signature FROM payment_transactions WHERE order_id = $1",
    )
    .bind(&created.order_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(transaction.get::<String, _>("status"), "success");
    assert_eq!(transaction.get::<Option<String>, _>("payment_id").as_deref(), Some("pay_42"));
    assert_eq!(transaction.get::<Option<String>, _>("signature").as_deref(), Some(sig.as_str()));

    let subscription = sqlx::query("SELECT status, payment_id FROM subscriptions WHERE order_id = $1")
        .bind(&created.order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(subscription.get::<String, _>("status"), "active");
    assert_eq!(subscription.get::<Option<String>, _>("payment_id").as_deref(), Some("pay_42"));

    let user = sqlx::query("SELECT subscription_plan, unlocks_remaining FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(user.get::<Option<String>, _>("subscription_plan").as_deref(), Some("basic"));
    assert_eq!(user.get::<i32, _>("unlocks_remaining"), 3);

    let events: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE user_id = $1 AND event_type = 'payment_success'")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(events, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn verification_is_idempotent_under_retry(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "retry@example.com").await;

    let server = MockServer::start_async().await;
    let _order_mock = mock_order_created(&server, "order_retry", 500);
    let service = service_for(&pool, &server);

    let created = service
        .create_order(
            Some(500),
            None,
            "basic",
            "user",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();

    let sig = signature::expected_signature(&created.order_id, "pay_77", KEY_SECRET);
    let first = service
        .verify_payment(&created.order_id, "pay_77", &sig, Some(&user_id.to_string()))
        .await
        .unwrap();
    assert!(first.verified);

    // Spend an unlock between retries to prove the second pass does not
    // re-grant beyond the first.
    sqlx::query("UPDATE users SET unlocks_remaining = unlocks_remaining - 1 WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let second = service
        .verify_payment(&created.order_id, "pay_77", &sig, Some(&user_id.to_string()))
        .await
        .unwrap();
    assert!(second.verified);

    let status: String = sqlx::query_scalar("SELECT status FROM subscriptions WHERE order_id = $1")
        .bind(&created.order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");

    // Replaying the stored metadata restores the priced grant; it never
    // compounds it.
    let unlocks: i32 = sqlx::query_scalar("SELECT unlocks_remaining FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(unlocks, 3);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn wrong_signature_rejects_and_mutates_nothing(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "fraud@example.com").await;

    let server = MockServer::start_async().await;
    let _order_mock = mock_order_created(&server, "order_fraud", 500);
    let service = service_for(&pool, &server);

    let created = service
        .create_order(
            Some(500),
            None,
            "basic",
            "user",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();

    let outcome = service
        .verify_payment(
            &created.order_id,
            "pay_1",
            "deadbeef",
            Some(&user_id.to_string()),
        )
        .await
        .unwrap();
    assert!(!outcome.verified);

    let tx_status: String =
        sqlx::query_scalar("SELECT status FROM payment_transactions WHERE order_id = $1")
            .bind(&created.order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(tx_status, "pending");

    let sub_status: String = sqlx::query_scalar("SELECT status FROM subscriptions WHERE order_id = $1")
        .bind(&created.order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(sub_status, "pending");

    let unlocks: i32 = sqlx::query_scalar("SELECT unlocks_remaining FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(unlocks, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn verification_requires_all_identifiers(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let server = MockServer::start_async().await;
    let service = service_for(&pool, &server);

    let result = service.verify_payment("order_x", "", "sig", None).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

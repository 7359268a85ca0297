//! Store integration tests against a live PostgreSQL.
//!
//! Ignored by default: point DATABASE_URL at a scratch database and run
//! `cargo test -p payment-relay -- --ignored`.

use chrono::{Duration, Utc};
use payment_relay::models::{Cancellation, Payment};
use payment_relay::services::Database;
use uuid::Uuid;

async fn store() -> Database {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for store tests");
    let db = Database::new(&url, 5, 1).await.expect("failed to connect");
    db.run_migrations().await.expect("failed to run migrations");
    db
}

fn payment(buyer: &str, order_name: &str) -> Payment {
    Payment {
        payment_key: format!("pk_{}", Uuid::new_v4()),
        order_id: format!("order_{}", Uuid::new_v4()),
        order_name: order_name.to_string(),
        total_amount: 1000,
        requested_at: Utc::now(),
        approved_at: Utc::now(),
        buyer: buyer.to_string(),
    }
}

fn cancellation_for(payment: &Payment, reason: &str) -> Cancellation {
    Cancellation {
        payment_key: payment.payment_key.clone(),
        order_id: payment.order_id.clone(),
        order_name: payment.order_name.clone(),
        status: "CANCELED".to_string(),
        requested_at: payment.requested_at,
        approved_at: Utc::now(),
        cancel_reason: reason.to_string(),
        cancel_amount: payment.total_amount,
        buyer: payment.buyer.clone(),
    }
}

fn unique_buyer() -> String {
    format!("buyer_{}", Uuid::new_v4())
}

async fn payments_count(db: &Database, payment_key: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE payment_key = $1")
        .bind(payment_key)
        .fetch_one(db.pool())
        .await
        .expect("payments count query failed")
}

async fn cancellations_count(db: &Database, payment_key: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM cancellations WHERE payment_key = $1")
        .bind(payment_key)
        .fetch_one(db.pool())
        .await
        .expect("cancellations count query failed")
}

#[tokio::test]
#[ignore]
async fn reconfirming_a_payment_inserts_exactly_one_row() {
    let db = store().await;
    let payment = payment(&unique_buyer(), "coffee beans");

    assert!(db.record_payment(&payment).await.expect("first insert"));
    assert!(!db.record_payment(&payment).await.expect("second insert"));

    assert_eq!(payments_count(&db, &payment.payment_key).await, 1);
}

#[tokio::test]
#[ignore]
async fn uncommitted_cancel_leaves_both_tables_untouched() {
    let db = store().await;
    let payment = payment(&unique_buyer(), "coffee beans");
    db.record_payment(&payment).await.expect("insert payment");

    {
        let mut tx = db.begin().await.expect("begin");
        let locked = db
            .lock_payment_for_cancel(&mut tx, &payment.buyer, &payment.order_name)
            .await
            .expect("lookup")
            .expect("payment should be found");
        db.insert_cancellation(&mut tx, &cancellation_for(&locked, "changed mind"))
            .await
            .expect("insert cancellation");
        let deleted = db
            .delete_payment(&mut tx, &locked.payment_key)
            .await
            .expect("delete payment");
        assert_eq!(deleted, 1);
        // Dropped without commit: both writes must vanish.
    }

    assert_eq!(payments_count(&db, &payment.payment_key).await, 1);
    assert_eq!(cancellations_count(&db, &payment.payment_key).await, 0);
}

#[tokio::test]
#[ignore]
async fn committed_cancel_moves_the_row() {
    let db = store().await;
    let payment = payment(&unique_buyer(), "coffee beans");
    db.record_payment(&payment).await.expect("insert payment");

    let mut tx = db.begin().await.expect("begin");
    let locked = db
        .lock_payment_for_cancel(&mut tx, &payment.buyer, &payment.order_name)
        .await
        .expect("lookup")
        .expect("payment should be found");
    db.insert_cancellation(&mut tx, &cancellation_for(&locked, "changed mind"))
        .await
        .expect("insert cancellation");
    let deleted = db
        .delete_payment(&mut tx, &locked.payment_key)
        .await
        .expect("delete payment");
    assert_eq!(deleted, 1);
    tx.commit().await.expect("commit");

    assert_eq!(payments_count(&db, &payment.payment_key).await, 0);
    assert_eq!(cancellations_count(&db, &payment.payment_key).await, 1);
}

#[tokio::test]
#[ignore]
async fn cancel_lookup_picks_the_most_recent_payment() {
    let db = store().await;
    let buyer = unique_buyer();

    let mut older = payment(&buyer, "coffee beans");
    older.approved_at = Utc::now() - Duration::hours(1);
    let newer = payment(&buyer, "coffee beans");

    db.record_payment(&older).await.expect("insert older");
    db.record_payment(&newer).await.expect("insert newer");

    let mut tx = db.begin().await.expect("begin");
    let locked = db
        .lock_payment_for_cancel(&mut tx, &buyer, "coffee beans")
        .await
        .expect("lookup")
        .expect("payment should be found");
    assert_eq!(locked.payment_key, newer.payment_key);
}

//! Payment store on PostgreSQL.
//!
//! Two tables partition the lifecycle of a payment key: `payments`
//! holds active confirmed payments, `cancellations` holds the terminal
//! records. Under correct operation a key is never in both at once;
//! the cancel transaction moves a row from one table to the other
//! atomically.

use crate::models::{Cancellation, Payment, PurchaseRow};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "payment-relay"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Confirm / verify write path
    // -------------------------------------------------------------------------

    /// Record a verified payment.
    ///
    /// Idempotent: re-confirming an already-recorded payment key is a
    /// silent no-op (`ON CONFLICT DO NOTHING`). Returns whether a row
    /// was actually inserted. Single statement, so no explicit
    /// transaction is needed.
    #[instrument(skip(self, payment), fields(payment_key = %payment.payment_key))]
    pub async fn record_payment(&self, payment: &Payment) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO payments (payment_key, order_id, order_name, total_amount, requested_at, approved_at, buyer)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (payment_key) DO NOTHING
            "#,
        )
        .bind(&payment.payment_key)
        .bind(&payment.order_id)
        .bind(&payment.order_name)
        .bind(payment.total_amount)
        .bind(payment.requested_at)
        .bind(payment.approved_at)
        .bind(&payment.buyer)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e))
        })?;

        timer.observe_duration();

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!(payment_key = %payment.payment_key, "Payment recorded");
        } else {
            info!(payment_key = %payment.payment_key, "Payment already recorded, no-op");
        }
        Ok(inserted)
    }

    // -------------------------------------------------------------------------
    // Purchase history
    // -------------------------------------------------------------------------

    /// All active payments for a buyer, most recent approval first.
    #[instrument(skip(self), fields(buyer = %buyer))]
    pub async fn purchase_history(&self, buyer: &str) -> Result<Vec<PurchaseRow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["purchase_history"])
            .start_timer();

        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT order_name, total_amount, approved_at
            FROM payments
            WHERE buyer = $1
            ORDER BY approved_at DESC
            "#,
        )
        .bind(buyer)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list purchases: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Cancel transaction
    // -------------------------------------------------------------------------
    //
    // The cancel handler owns the transaction; the methods below run
    // inside it. Either the cancellation insert and the payment delete
    // both commit, or neither does.

    /// Begin the connection-scoped cancel transaction.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Look up and row-lock the payment to cancel.
    ///
    /// Callers only know (buyer, order_name), not the payment key. A
    /// buyer reordering under the same name makes that pair ambiguous;
    /// the most recently approved payment is picked, deterministically.
    /// `FOR UPDATE` serializes concurrent cancels of the same row: the
    /// loser re-runs the lookup after the winner's delete commits and
    /// finds nothing.
    #[instrument(skip(self, tx), fields(buyer = %buyer, order_name = %order_name))]
    pub async fn lock_payment_for_cancel(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        buyer: &str,
        order_name: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_payment_for_cancel"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_key, order_id, order_name, total_amount, requested_at, approved_at, buyer
            FROM payments
            WHERE buyer = $1 AND order_name = $2
            ORDER BY approved_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(buyer)
        .bind(order_name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to look up payment: {}", e))
        })?;

        timer.observe_duration();
        Ok(payment)
    }

    /// Insert the terminal cancellation record.
    #[instrument(skip(self, tx, cancellation), fields(payment_key = %cancellation.payment_key))]
    pub async fn insert_cancellation(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        cancellation: &Cancellation,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_cancellation"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO cancellations (
                payment_key, order_id, order_name, status, requested_at, approved_at,
                cancel_reason, cancel_amount, buyer
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&cancellation.payment_key)
        .bind(&cancellation.order_id)
        .bind(&cancellation.order_name)
        .bind(&cancellation.status)
        .bind(cancellation.requested_at)
        .bind(cancellation.approved_at)
        .bind(&cancellation.cancel_reason)
        .bind(cancellation.cancel_amount)
        .bind(&cancellation.buyer)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert cancellation: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    /// Remove the active payment row inside the cancel transaction.
    /// Returns the number of rows deleted; the handler treats 0 as a
    /// reason to roll back.
    #[instrument(skip(self, tx), fields(payment_key = %payment_key))]
    pub async fn delete_payment(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        payment_key: &str,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payment"])
            .start_timer();

        let result = sqlx::query("DELETE FROM payments WHERE payment_key = $1")
            .bind(payment_key)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment: {}", e))
            })?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }
}

//! Database service for etransfer-service.

use crate::matching::engine::{MatchStore, Settlement};
use crate::matching::policy::MatchPolicy;
use crate::models::{
    Invoice, InvoiceStatus, Payment, PaymentStatus, ScoredCandidate, TransferNotification,
    PAYMENT_METHOD_ETRANSFER,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use platform_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "payment_id, organization_id, invoice_id, amount, method, status, \
     provider_message_id, sender_name, sender_email, match_score, provenance, \
     transfer_timestamp, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "etransfer-service"))]
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
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(600))
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
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
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

    // =========================================================================
    // Payment Read Operations
    // =========================================================================

    #[instrument(skip(self), fields(organization_id = %organization_id, payment_id = %payment_id))]
    pub async fn get_payment(
        &self,
        organization_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE organization_id = $1 AND payment_id = $2
            "#,
        ))
        .bind(organization_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_payments(
        &self,
        organization_id: Uuid,
        status: Option<PaymentStatus>,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<Payment>, Option<String>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;
        let status_str = status.map(|s| s.as_str().to_string());

        let payments = if let Some(cursor) = page_token {
            sqlx::query_as::<_, Payment>(&format!(
                r#"
                SELECT {PAYMENT_COLUMNS}
                FROM payments
                WHERE organization_id = $1 AND payment_id > $2
                  AND ($3::text IS NULL OR status = $3)
                ORDER BY payment_id
                LIMIT $4
                "#,
            ))
            .bind(organization_id)
            .bind(cursor)
            .bind(&status_str)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Payment>(&format!(
                r#"
                SELECT {PAYMENT_COLUMNS}
                FROM payments
                WHERE organization_id = $1
                  AND ($2::text IS NULL OR status = $2)
                ORDER BY payment_id
                LIMIT $3
                "#,
            ))
            .bind(organization_id)
            .bind(&status_str)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        let has_more = payments.len() > limit as usize;
        let mut payments = payments;
        if has_more {
            payments.pop();
        }
        let next_token = if has_more {
            payments.last().map(|p| p.payment_id.to_string())
        } else {
            None
        };

        Ok((payments, next_token))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl MatchStore for Database {
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn find_open_invoices(
        &self,
        organization_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_open_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, organization_id, invoice_number, status, balance,
                   customer_name, customer_email, created_utc, updated_utc
            FROM invoices
            WHERE organization_id = $1
              AND status = ANY($2)
              AND balance > 0
              AND created_utc >= $3
              AND created_utc <= $4
            ORDER BY created_utc DESC
            "#,
        )
        .bind(organization_id)
        .bind(InvoiceStatus::owing_strs())
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find open invoices: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoices)
    }

    #[instrument(
        skip(self, notification),
        fields(
            organization_id = %organization_id,
            provider_message_id = %notification.provider_message_id,
        )
    )]
    async fn find_duplicate(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        window_secs: i64,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_duplicate"])
            .start_timer();

        let window = Duration::seconds(window_secs);
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE organization_id = $1
              AND method = $2
              AND provider_message_id = $3
              AND amount = $4
              AND transfer_timestamp BETWEEN $5 AND $6
            "#,
        ))
        .bind(organization_id)
        .bind(PAYMENT_METHOD_ETRANSFER)
        .bind(&notification.provider_message_id)
        .bind(notification.amount)
        .bind(notification.transfer_timestamp - window)
        .bind(notification.transfer_timestamp + window)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check for duplicate: {}", e))
        })?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn load_policy(&self, organization_id: Uuid) -> Result<Option<MatchPolicy>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_policy"])
            .start_timer();

        let overrides = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT overrides
            FROM match_policies
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load match policy: {}", e))
        })?;

        timer.observe_duration();

        overrides
            .map(|value| {
                serde_json::from_value::<MatchPolicy>(value).map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Invalid match policy overrides: {}",
                        e
                    ))
                })
            })
            .transpose()
    }

    #[instrument(
        skip(self, notification, best, provenance),
        fields(
            organization_id = %organization_id,
            invoice_id = %best.invoice_id,
            provider_message_id = %notification.provider_message_id,
        )
    )]
    async fn settle_auto(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        best: &ScoredCandidate,
        provenance: serde_json::Value,
    ) -> Result<Settlement, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_auto"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // The unique index on (organization_id, provider_message_id) closes
        // the duplicate check-then-create race: a concurrent delivery of the
        // same message surfaces here as a unique violation.
        let inserted = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (payment_id, organization_id, invoice_id, amount, method,
                                  status, provider_message_id, sender_name, sender_email,
                                  match_score, provenance, transfer_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(best.invoice_id)
        .bind(notification.amount)
        .bind(PAYMENT_METHOD_ETRANSFER)
        .bind(PaymentStatus::Completed.as_str())
        .bind(&notification.provider_message_id)
        .bind(&notification.sender_name)
        .bind(&notification.sender_email)
        .bind(best.score)
        .bind(provenance)
        .bind(notification.transfer_timestamp)
        .fetch_one(&mut *tx)
        .await;

        let payment = match inserted {
            Ok(payment) => payment,
            Err(e) if is_unique_violation(&e) => {
                timer.observe_duration();
                return Ok(Settlement::DuplicateMessage);
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create payment: {}",
                    e
                )));
            }
        };

        // Single atomic read-modify-write: concurrent split payments to the
        // same invoice serialize on the row lock and each apply exactly once.
        let updated = sqlx::query(
            r#"
            UPDATE invoices
            SET balance = balance - $3,
                status = CASE WHEN balance - $3 <= 0 THEN 'paid' ELSE status END,
                updated_utc = NOW()
            WHERE organization_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(best.invoice_id)
        .bind(notification.amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice balance: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Matched invoice no longer exists"
            )));
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit settlement: {}", e))
        })?;

        timer.observe_duration();
        info!(payment_id = %payment.payment_id, "Payment auto-applied");

        Ok(Settlement::Applied(payment))
    }

    #[instrument(
        skip(self, notification, best, provenance),
        fields(
            organization_id = %organization_id,
            provider_message_id = %notification.provider_message_id,
        )
    )]
    async fn park_for_review(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        best: Option<&ScoredCandidate>,
        provenance: serde_json::Value,
    ) -> Result<Settlement, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["park_for_review"])
            .start_timer();

        let inserted = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (payment_id, organization_id, invoice_id, amount, method,
                                  status, provider_message_id, sender_name, sender_email,
                                  match_score, provenance, transfer_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(best.map(|c| c.invoice_id))
        .bind(notification.amount)
        .bind(PAYMENT_METHOD_ETRANSFER)
        .bind(PaymentStatus::PendingReview.as_str())
        .bind(&notification.provider_message_id)
        .bind(&notification.sender_name)
        .bind(&notification.sender_email)
        .bind(best.map(|c| c.score).unwrap_or(0))
        .bind(provenance)
        .bind(notification.transfer_timestamp)
        .fetch_one(&self.pool)
        .await;

        timer.observe_duration();

        match inserted {
            Ok(payment) => {
                info!(payment_id = %payment.payment_id, "Payment parked for review");
                Ok(Settlement::Parked(payment))
            }
            Err(e) if is_unique_violation(&e) => Ok(Settlement::DuplicateMessage),
            Err(e) => Err(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to create review payment: {}",
                e
            ))),
        }
    }
}

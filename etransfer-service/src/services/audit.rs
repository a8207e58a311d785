//! Audit sink: durable trail of engine decisions.
//!
//! Fire-and-forget from the engine's perspective: the caller logs a failed
//! record and moves on; an audit outage never blocks or reverses a
//! settlement.

use crate::matching::engine::AuditSink;
use async_trait::async_trait;
use platform_core::error::AppError;
use sqlx::postgres::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Postgres-backed audit sink writing to `audit_events`.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    #[instrument(skip(self, changes, context), fields(action = %action, entity_id = %entity_id))]
    async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        changes: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (audit_id, action, entity_type, entity_id, changes, context)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(changes)
        .bind(context)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record audit event: {}", e))
        })?;

        Ok(())
    }
}

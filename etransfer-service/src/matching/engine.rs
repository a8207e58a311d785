//! Match engine orchestration: validate, suppress duplicates, score, decide,
//! settle.
//!
//! The engine itself is pure between its two seams: `MatchStore` (durable
//! invoices, payments, policies) and `AuditSink` (fire-and-forget audit
//! trail). Both are traits so the engine runs against Postgres in production
//! and an in-memory fake in tests.

use crate::matching::candidates::filter_candidates;
use crate::matching::policy::MatchPolicy;
use crate::matching::scoring::rank_candidates;
use crate::models::{
    Invoice, MatchConfidence, MatchOutcome, Payment, ScoredCandidate, TransferNotification,
};
use crate::services::metrics::record_match_outcome;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use platform_core::error::AppError;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a settlement write.
#[derive(Debug)]
pub enum Settlement {
    /// Completed payment created and invoice balance decremented.
    Applied(Payment),
    /// Pending-review payment created; no invoice touched.
    Parked(Payment),
    /// The insert collided with an existing payment for the same provider
    /// message id: a concurrent delivery won the race.
    DuplicateMessage,
}

/// Narrow repository seam over the invoices/payments/policies storage.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Open invoices for the organization: owing status, balance > 0,
    /// created inside `[window_start, window_end]`, most recent first.
    async fn find_open_invoices(
        &self,
        organization_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError>;

    /// An existing e-transfer payment with the same amount, the same
    /// provider message id, and a transfer timestamp within
    /// `window_secs` of the notification's.
    async fn find_duplicate(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        window_secs: i64,
    ) -> Result<Option<Payment>, AppError>;

    /// Per-organization policy overrides, if any were configured.
    async fn load_policy(&self, organization_id: Uuid) -> Result<Option<MatchPolicy>, AppError>;

    /// Atomically create a completed payment and decrement the matched
    /// invoice's balance (flipping it to paid at zero) in one unit of work.
    async fn settle_auto(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        best: &ScoredCandidate,
        provenance: serde_json::Value,
    ) -> Result<Settlement, AppError>;

    /// Create a pending-review payment referencing the top candidate when
    /// there is one. Never mutates any invoice.
    async fn park_for_review(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        best: Option<&ScoredCandidate>,
        provenance: serde_json::Value,
    ) -> Result<Settlement, AppError>;
}

/// Audit trail collaborator. Failures are logged and never propagate into
/// the financial write path.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        changes: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<(), AppError>;
}

pub struct MatchEngine {
    store: Arc<dyn MatchStore>,
    audit: Arc<dyn AuditSink>,
}

impl MatchEngine {
    pub fn new(store: Arc<dyn MatchStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Match one transfer notification against the organization's open
    /// invoices and settle the result.
    #[instrument(
        skip(self, notification),
        fields(
            organization_id = %organization_id,
            provider_message_id = %notification.provider_message_id,
        )
    )]
    pub async fn process(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
    ) -> Result<MatchOutcome, AppError> {
        validate_notification(notification)?;

        let policy = self
            .store
            .load_policy(organization_id)
            .await?
            .unwrap_or_default();

        if let Some(existing) = self
            .store
            .find_duplicate(organization_id, notification, policy.duplicate_window_secs)
            .await?
        {
            info!(
                payment_id = %existing.payment_id,
                "Transfer already settled; rejecting duplicate delivery"
            );
            record_match_outcome("duplicate");
            return Ok(MatchOutcome::duplicate());
        }

        let window_start = notification.transfer_timestamp - Duration::days(policy.lookback_days);
        let open = self
            .store
            .find_open_invoices(organization_id, window_start, notification.transfer_timestamp)
            .await?;
        let candidates = filter_candidates(open, notification.amount, &policy);
        let ranked = rank_candidates(&candidates, notification, &policy);

        let best = ranked.first().cloned();
        let score = best.as_ref().map(|c| c.score).unwrap_or(0);
        let confidence = policy.classify(score);
        let requires_review = policy.requires_review(notification.amount, &ranked);
        let provenance = provenance_snapshot(notification, &ranked, policy.provenance_limit);

        let settlement = if requires_review {
            self.store
                .park_for_review(organization_id, notification, best.as_ref(), provenance)
                .await?
        } else {
            // requires_review can only be false when a candidate cleared the
            // auto-match bar.
            let top = best.as_ref().ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("auto-apply decided with no candidate"))
            })?;
            self.store
                .settle_auto(organization_id, notification, top, provenance)
                .await?
        };

        let payment = match settlement {
            Settlement::Applied(payment) => {
                info!(
                    payment_id = %payment.payment_id,
                    invoice_id = ?payment.invoice_id,
                    score,
                    "Transfer auto-applied"
                );
                record_match_outcome("auto_applied");
                self.audit_settlement("payment.auto_matched", &payment, best.as_ref(), confidence)
                    .await;
                Some(payment)
            }
            Settlement::Parked(payment) => {
                info!(
                    payment_id = %payment.payment_id,
                    invoice_id = ?payment.invoice_id,
                    score,
                    "Transfer parked for manual review"
                );
                record_match_outcome("pending_review");
                self.audit_settlement(
                    "payment.parked_for_review",
                    &payment,
                    best.as_ref(),
                    confidence,
                )
                .await;
                Some(payment)
            }
            Settlement::DuplicateMessage => {
                info!("Concurrent delivery already settled this message id");
                record_match_outcome("duplicate");
                return Ok(MatchOutcome::duplicate());
            }
        };

        Ok(MatchOutcome {
            confidence,
            score,
            best,
            candidates: ranked,
            requires_review,
            duplicate: false,
            payment,
        })
    }

    async fn audit_settlement(
        &self,
        action: &str,
        payment: &Payment,
        best: Option<&ScoredCandidate>,
        confidence: MatchConfidence,
    ) {
        let changes = serde_json::json!({
            "invoice_id": payment.invoice_id,
            "amount": payment.amount,
            "status": payment.status,
            "match_score": payment.match_score,
            "reasons": best.map(|c| c.reasons.clone()).unwrap_or_default(),
        });
        let context = serde_json::json!({
            "organization_id": payment.organization_id,
            "provider_message_id": payment.provider_message_id,
            "confidence": confidence.as_str(),
        });

        // The audit trail must never block or reverse the financial write.
        if let Err(e) = self
            .audit
            .record(action, "payment", &payment.payment_id.to_string(), changes, context)
            .await
        {
            warn!(
                error = %e,
                action,
                payment_id = %payment.payment_id,
                "Audit sink failed; settlement stands"
            );
        }
    }
}

/// Reject malformed notifications before any matching work.
fn validate_notification(notification: &TransferNotification) -> Result<(), AppError> {
    if notification.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Transfer amount must be positive"
        )));
    }
    if notification.provider_message_id.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Provider message id is required"
        )));
    }
    if notification.sender_name.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Sender name is required"
        )));
    }
    if notification.sender_email.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Sender email is required"
        )));
    }
    Ok(())
}

/// Denormalized reviewer snapshot stored with the payment: the sender
/// identity plus up to `limit` ranked candidates.
fn provenance_snapshot(
    notification: &TransferNotification,
    ranked: &[ScoredCandidate],
    limit: usize,
) -> serde_json::Value {
    let alternates: Vec<&ScoredCandidate> = ranked.iter().take(limit).collect();
    serde_json::json!({
        "provider_message_id": notification.provider_message_id,
        "sender_name": notification.sender_name,
        "sender_email": notification.sender_email,
        "alternates": alternates,
    })
}

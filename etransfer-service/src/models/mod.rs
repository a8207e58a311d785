//! Domain models for etransfer-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Transfer Notification
// ============================================================================

/// Structured funds-transfer notification produced by the ingestion
/// collaborator (email parser or provider webhook). The engine never sees
/// raw bank payloads.
#[derive(Debug, Clone)]
pub struct TransferNotification {
    pub sender_name: String,
    pub sender_email: String,
    pub amount: Decimal,
    pub reference_text: Option<String>,
    pub transfer_timestamp: DateTime<Utc>,
    /// Globally unique per provider per organization; the idempotency key.
    pub provider_message_id: String,
}

// ============================================================================
// Invoice Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    PartiallyPaid,
    Overdue,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::PartiallyPaid => "partially_paid",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "viewed" => Self::Viewed,
            "partially_paid" => Self::PartiallyPaid,
            "overdue" => Self::Overdue,
            "paid" => Self::Paid,
            "void" => Self::Void,
            _ => Self::Draft,
        }
    }

    /// Statuses in which an invoice still owes money and can receive a
    /// matched payment.
    pub fn owing() -> &'static [InvoiceStatus] {
        &[
            Self::Sent,
            Self::Viewed,
            Self::PartiallyPaid,
            Self::Overdue,
        ]
    }

    pub fn owing_strs() -> Vec<String> {
        Self::owing().iter().map(|s| s.as_str().to_string()).collect()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub invoice_number: String,
    pub status: String,
    /// Outstanding amount; only decreases, and only inside the transaction
    /// that makes the corresponding payment durable.
    pub balance: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

// ============================================================================
// Payment Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    PendingReview,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::PendingReview,
        }
    }
}

pub const PAYMENT_METHOD_ETRANSFER: &str = "etransfer";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub organization_id: Uuid,
    /// Absent when the transfer could not be matched to any invoice.
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub provider_message_id: String,
    pub sender_name: String,
    pub sender_email: String,
    pub match_score: i32,
    /// Denormalized snapshot of the ranked candidates for the reviewer UI.
    /// Not the source of truth: the ranking is recomputable from the
    /// candidate finder and scoring engine at any time.
    pub provenance: serde_json::Value,
    pub transfer_timestamp: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Match Models
// ============================================================================

/// Discretized classification derived from a numeric score. Pure function of
/// the score via `MatchPolicy` thresholds; never set independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    High,
    Medium,
    Low,
    None,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

/// An open invoice scored against a transfer notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub invoice_balance: Decimal,
    /// Sum of the weighted signals. Unbounded above by construction: a
    /// perfect reference + amount + identity + email + recency candidate
    /// sums past 100. Kept uncapped for compatibility with the historical
    /// scoring behavior.
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Result of running the engine over one notification.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub confidence: MatchConfidence,
    pub score: i32,
    pub best: Option<ScoredCandidate>,
    /// Full ranked list, best first.
    pub candidates: Vec<ScoredCandidate>,
    pub requires_review: bool,
    /// The notification was already settled (same provider message id);
    /// no payment was created for this delivery.
    pub duplicate: bool,
    pub payment: Option<Payment>,
}

impl MatchOutcome {
    /// Outcome for a re-delivered notification that already produced a
    /// payment. Surfaces for review, creates nothing.
    pub fn duplicate() -> Self {
        Self {
            confidence: MatchConfidence::None,
            score: 0,
            best: None,
            candidates: Vec::new(),
            requires_review: true,
            duplicate: true,
            payment: None,
        }
    }
}

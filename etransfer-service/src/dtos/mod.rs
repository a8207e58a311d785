//! Request/response DTOs for the HTTP surface.

use crate::models::{MatchOutcome, Payment, ScoredCandidate, TransferNotification};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Incoming transfer notification, as produced by the ingestion
/// collaborator. Amount positivity is enforced by the engine itself.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MatchTransferRequest {
    #[validate(length(min = 1, message = "Sender name is required"))]
    pub sender_name: String,
    #[validate(email(message = "Invalid sender email"))]
    pub sender_email: String,
    pub amount: Decimal,
    pub reference_text: Option<String>,
    pub transfer_timestamp: DateTime<Utc>,
    #[validate(length(min = 1, message = "Provider message id is required"))]
    pub provider_message_id: String,
}

impl From<MatchTransferRequest> for TransferNotification {
    fn from(req: MatchTransferRequest) -> Self {
        Self {
            sender_name: req.sender_name,
            sender_email: req.sender_email,
            amount: req.amount,
            reference_text: req.reference_text,
            transfer_timestamp: req.transfer_timestamp,
            provider_message_id: req.provider_message_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CandidateResponse {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub score: i32,
    pub reasons: Vec<String>,
}

impl From<ScoredCandidate> for CandidateResponse {
    fn from(c: ScoredCandidate) -> Self {
        Self {
            invoice_id: c.invoice_id,
            invoice_number: c.invoice_number,
            score: c.score,
            reasons: c.reasons,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub status: String,
    pub provider_message_id: String,
    pub match_score: i32,
    pub created_utc: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            payment_id: p.payment_id,
            invoice_id: p.invoice_id,
            amount: p.amount,
            status: p.status,
            provider_message_id: p.provider_message_id,
            match_score: p.match_score,
            created_utc: p.created_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MatchOutcomeResponse {
    pub confidence: String,
    pub score: i32,
    pub requires_review: bool,
    pub duplicate: bool,
    pub best_invoice_id: Option<Uuid>,
    pub candidates: Vec<CandidateResponse>,
    pub payment: Option<PaymentResponse>,
}

impl From<MatchOutcome> for MatchOutcomeResponse {
    fn from(outcome: MatchOutcome) -> Self {
        Self {
            confidence: outcome.confidence.as_str().to_string(),
            score: outcome.score,
            requires_review: outcome.requires_review,
            duplicate: outcome.duplicate,
            best_invoice_id: outcome.best.as_ref().map(|c| c.invoice_id),
            candidates: outcome
                .candidates
                .into_iter()
                .map(CandidateResponse::from)
                .collect(),
            payment: outcome.payment.map(PaymentResponse::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub status: Option<String>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ListPaymentsResponse {
    pub payments: Vec<PaymentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

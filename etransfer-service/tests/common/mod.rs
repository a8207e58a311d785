//! Common test utilities: an in-memory match store and audit sinks.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use etransfer_service::matching::engine::{AuditSink, MatchStore, Settlement};
use etransfer_service::matching::{MatchEngine, MatchPolicy};
use etransfer_service::models::{
    Invoice, InvoiceStatus, Payment, PaymentStatus, ScoredCandidate, TransferNotification,
    PAYMENT_METHOD_ETRANSFER,
};
use platform_core::error::AppError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,etransfer_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory stand-in for the Postgres store. Mirrors its semantics: the
/// owing/balance/window candidate query, the (organization, message id)
/// uniqueness guarantee, and the atomic settle.
#[derive(Default)]
pub struct InMemoryStore {
    pub invoices: Mutex<Vec<Invoice>>,
    pub payments: Mutex<Vec<Payment>>,
    pub policies: Mutex<HashMap<Uuid, MatchPolicy>>,
}

impl InMemoryStore {
    pub fn with_invoices(invoices: Vec<Invoice>) -> Arc<Self> {
        Arc::new(Self {
            invoices: Mutex::new(invoices),
            ..Default::default()
        })
    }

    pub fn invoice(&self, invoice_id: Uuid) -> Invoice {
        self.invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .cloned()
            .expect("invoice not found")
    }

    pub fn payments_snapshot(&self) -> Vec<Payment> {
        self.payments.lock().unwrap().clone()
    }

    fn make_payment(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        invoice_id: Option<Uuid>,
        status: PaymentStatus,
        score: i32,
        provenance: serde_json::Value,
    ) -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            organization_id,
            invoice_id,
            amount: notification.amount,
            method: PAYMENT_METHOD_ETRANSFER.to_string(),
            status: status.as_str().to_string(),
            provider_message_id: notification.provider_message_id.clone(),
            sender_name: notification.sender_name.clone(),
            sender_email: notification.sender_email.clone(),
            match_score: score,
            provenance,
            transfer_timestamp: notification.transfer_timestamp,
            created_utc: Utc::now(),
        }
    }

    fn message_already_settled(&self, organization_id: Uuid, provider_message_id: &str) -> bool {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .any(|p| {
                p.organization_id == organization_id
                    && p.provider_message_id == provider_message_id
            })
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn find_open_invoices(
        &self,
        organization_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        let owing = InvoiceStatus::owing_strs();
        let mut invoices: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .filter(|i| {
                i.organization_id == organization_id
                    && owing.contains(&i.status)
                    && i.balance > Decimal::ZERO
                    && i.created_utc >= window_start
                    && i.created_utc <= window_end
            })
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(invoices)
    }

    async fn find_duplicate(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        window_secs: i64,
    ) -> Result<Option<Payment>, AppError> {
        let window = Duration::seconds(window_secs);
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                p.organization_id == organization_id
                    && p.method == PAYMENT_METHOD_ETRANSFER
                    && p.provider_message_id == notification.provider_message_id
                    && p.amount == notification.amount
                    && (p.transfer_timestamp - notification.transfer_timestamp).abs() <= window
            })
            .cloned())
    }

    async fn load_policy(&self, organization_id: Uuid) -> Result<Option<MatchPolicy>, AppError> {
        Ok(self.policies.lock().unwrap().get(&organization_id).cloned())
    }

    async fn settle_auto(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        best: &ScoredCandidate,
        provenance: serde_json::Value,
    ) -> Result<Settlement, AppError> {
        if self.message_already_settled(organization_id, &notification.provider_message_id) {
            return Ok(Settlement::DuplicateMessage);
        }

        let payment = self.make_payment(
            organization_id,
            notification,
            Some(best.invoice_id),
            PaymentStatus::Completed,
            best.score,
            provenance,
        );

        {
            let mut invoices = self.invoices.lock().unwrap();
            let invoice = invoices
                .iter_mut()
                .find(|i| i.organization_id == organization_id && i.invoice_id == best.invoice_id)
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Matched invoice no longer exists"))
                })?;
            invoice.balance -= notification.amount;
            if invoice.balance <= Decimal::ZERO {
                invoice.status = InvoiceStatus::Paid.as_str().to_string();
            }
            invoice.updated_utc = Utc::now();
        }

        self.payments.lock().unwrap().push(payment.clone());
        Ok(Settlement::Applied(payment))
    }

    async fn park_for_review(
        &self,
        organization_id: Uuid,
        notification: &TransferNotification,
        best: Option<&ScoredCandidate>,
        provenance: serde_json::Value,
    ) -> Result<Settlement, AppError> {
        if self.message_already_settled(organization_id, &notification.provider_message_id) {
            return Ok(Settlement::DuplicateMessage);
        }

        let payment = self.make_payment(
            organization_id,
            notification,
            best.map(|c| c.invoice_id),
            PaymentStatus::PendingReview,
            best.map(|c| c.score).unwrap_or(0),
            provenance,
        );
        self.payments.lock().unwrap().push(payment.clone());
        Ok(Settlement::Parked(payment))
    }
}

/// Audit sink that records every event for assertions.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub events: Mutex<Vec<AuditEvent>>,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub changes: serde_json::Value,
    pub context: serde_json::Value,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        changes: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<(), AppError> {
        self.events.lock().unwrap().push(AuditEvent {
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            changes,
            context,
        });
        Ok(())
    }
}

/// Audit sink that always fails, for proving settlements still stand.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(
        &self,
        _action: &str,
        _entity_type: &str,
        _entity_id: &str,
        _changes: serde_json::Value,
        _context: serde_json::Value,
    ) -> Result<(), AppError> {
        Err(AppError::DatabaseError(anyhow::anyhow!(
            "audit storage unavailable"
        )))
    }
}

pub fn engine(store: Arc<InMemoryStore>, audit: Arc<dyn AuditSink>) -> MatchEngine {
    init_tracing();
    MatchEngine::new(store, audit)
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// An open invoice `age_days` old relative to `now`.
pub fn invoice(
    organization_id: Uuid,
    number: &str,
    balance: &str,
    customer_name: &str,
    customer_email: &str,
    age_days: i64,
    now: DateTime<Utc>,
) -> Invoice {
    Invoice {
        invoice_id: Uuid::new_v4(),
        organization_id,
        invoice_number: number.to_string(),
        status: InvoiceStatus::Sent.as_str().to_string(),
        balance: dec(balance),
        customer_name: customer_name.to_string(),
        customer_email: customer_email.to_string(),
        created_utc: now - Duration::days(age_days),
        updated_utc: now - Duration::days(age_days),
    }
}

pub fn notification(
    amount: &str,
    reference: Option<&str>,
    sender_name: &str,
    sender_email: &str,
    message_id: &str,
    timestamp: DateTime<Utc>,
) -> TransferNotification {
    TransferNotification {
        sender_name: sender_name.to_string(),
        sender_email: sender_email.to_string(),
        amount: dec(amount),
        reference_text: reference.map(|s| s.to_string()),
        transfer_timestamp: timestamp,
        provider_message_id: message_id.to_string(),
    }
}

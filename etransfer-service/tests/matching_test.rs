//! Engine scenario tests: confidence classification, review policy, and
//! outcome shapes, driven through the in-memory store.

mod common;

use common::{dec, engine, invoice, notification, FailingAuditSink, InMemoryStore, RecordingAuditSink};
use chrono::Utc;
use etransfer_service::models::{MatchConfidence, PaymentStatus};
use platform_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn exact_match_auto_applies_and_pays_off_invoice() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let inv = invoice(org, "INV-1042", "1130.00", "Jane Doe", "jane@acme.ca", 3, now);
    let invoice_id = inv.invoice_id;
    let store = InMemoryStore::with_invoices(vec![inv]);
    let audit = Arc::new(RecordingAuditSink::default());
    let engine = engine(store.clone(), audit.clone());

    let n = notification(
        "1130.00",
        Some("e-Transfer for INV-1042"),
        "Jane Doe",
        "jane@acme.ca",
        "msg-a",
        now,
    );
    let outcome = engine.process(org, &n).await.unwrap();

    assert!(outcome.score >= 90);
    assert_eq!(outcome.confidence, MatchConfidence::High);
    assert!(!outcome.requires_review);
    assert!(!outcome.duplicate);

    let payment = outcome.payment.expect("payment created");
    assert_eq!(payment.status, PaymentStatus::Completed.as_str());
    assert_eq!(payment.invoice_id, Some(invoice_id));

    let settled = store.invoice(invoice_id);
    assert_eq!(settled.balance, dec("0.00"));
    assert_eq!(settled.status, "paid");

    let events = audit.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "payment.auto_matched");
    assert_eq!(events[0].entity_type, "payment");
}

#[tokio::test]
async fn amount_outside_every_band_parks_unmatched() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let inv = invoice(org, "INV-1042", "1130.00", "Jane Doe", "jane@acme.ca", 3, now);
    let invoice_id = inv.invoice_id;
    let store = InMemoryStore::with_invoices(vec![inv]);
    let engine = engine(store.clone(), Arc::new(RecordingAuditSink::default()));

    // $50 off a $1130 balance is ~4.4%: outside the $1 tolerance and the 2%
    // band, so the invoice is not even a candidate.
    let n = notification(
        "1180.00",
        None,
        "Unknown Sender",
        "unknown@elsewhere.com",
        "msg-b",
        now,
    );
    let outcome = engine.process(org, &n).await.unwrap();

    assert_eq!(outcome.score, 0);
    assert_eq!(outcome.confidence, MatchConfidence::None);
    assert!(outcome.requires_review);
    assert!(outcome.candidates.is_empty());

    // Never silently dropped: a pending-review payment carries the transfer.
    let payment = outcome.payment.expect("parked payment");
    assert_eq!(payment.status, PaymentStatus::PendingReview.as_str());
    assert_eq!(payment.invoice_id, None);

    // No invoice mutation on the review path.
    let untouched = store.invoice(invoice_id);
    assert_eq!(untouched.balance, dec("1130.00"));
    assert_eq!(untouched.status, "sent");
}

#[tokio::test]
async fn two_credible_candidates_force_review_despite_high_best_score() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    // Both invoice numbers contain the reference "INV-100"; the younger one
    // outranks only through the recency bonus.
    let inv1 = invoice(org, "INV-1001", "500.00", "Jane Doe", "jane@acme.ca", 3, now);
    let inv2 = invoice(org, "INV-1002", "500.00", "Jane Doe", "jane@acme.ca", 10, now);
    let (id1, id2) = (inv1.invoice_id, inv2.invoice_id);
    let store = InMemoryStore::with_invoices(vec![inv1, inv2]);
    let engine = engine(store.clone(), Arc::new(RecordingAuditSink::default()));

    let n = notification(
        "500.00",
        Some("INV-100"),
        "Jane Doe",
        "jane@acme.ca",
        "msg-c",
        now,
    );
    let outcome = engine.process(org, &n).await.unwrap();

    assert_eq!(outcome.candidates.len(), 2);
    let best = outcome.best.as_ref().unwrap();
    assert!(best.score >= 85, "best clears the auto-match bar on its own");
    assert!(outcome.candidates[1].score >= 70);
    assert!(best.score - outcome.candidates[1].score < 10);

    // Genuine ambiguity wins over the auto-match threshold.
    assert!(outcome.requires_review);

    let payment = outcome.payment.expect("parked payment");
    assert_eq!(payment.status, PaymentStatus::PendingReview.as_str());
    assert_eq!(payment.invoice_id, Some(best.invoice_id));

    assert_eq!(store.invoice(id1).balance, dec("500.00"));
    assert_eq!(store.invoice(id2).balance, dec("500.00"));
}

#[tokio::test]
async fn high_value_transfer_requires_review_even_when_perfect() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let inv = invoice(org, "INV-2000", "6000.00", "Jane Doe", "jane@acme.ca", 3, now);
    let invoice_id = inv.invoice_id;
    let store = InMemoryStore::with_invoices(vec![inv]);
    let engine = engine(store.clone(), Arc::new(RecordingAuditSink::default()));

    let n = notification(
        "6000.00",
        Some("INV-2000"),
        "Jane Doe",
        "jane@acme.ca",
        "msg-d",
        now,
    );
    let outcome = engine.process(org, &n).await.unwrap();

    assert!(outcome.score >= 90);
    assert_eq!(outcome.confidence, MatchConfidence::High);
    assert!(outcome.requires_review, "high value alone forces review");

    let payment = outcome.payment.expect("parked payment");
    assert_eq!(payment.status, PaymentStatus::PendingReview.as_str());
    assert_eq!(payment.invoice_id, Some(invoice_id));
    assert_eq!(store.invoice(invoice_id).balance, dec("6000.00"));
}

#[tokio::test]
async fn provenance_snapshot_is_capped_at_five_candidates() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let invoices: Vec<_> = (0..7)
        .map(|i| {
            invoice(
                org,
                &format!("INV-{i}"),
                "100.00",
                "Jane Doe",
                "jane@acme.ca",
                3,
                now,
            )
        })
        .collect();
    let store = InMemoryStore::with_invoices(invoices);
    let engine = engine(store.clone(), Arc::new(RecordingAuditSink::default()));

    let n = notification("100.00", None, "Jane Doe", "jane@acme.ca", "msg-e", now);
    let outcome = engine.process(org, &n).await.unwrap();

    // Seven identical scores: ambiguous, parked for review.
    assert!(outcome.requires_review);
    assert_eq!(outcome.candidates.len(), 7);

    let payment = outcome.payment.expect("parked payment");
    let alternates = payment.provenance["alternates"].as_array().unwrap();
    assert_eq!(alternates.len(), 5);
}

#[tokio::test]
async fn malformed_notifications_are_rejected_before_matching() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let store = InMemoryStore::with_invoices(Vec::new());
    let engine = engine(store.clone(), Arc::new(RecordingAuditSink::default()));

    for amount in ["0.00", "-10.00"] {
        let n = notification(amount, None, "Jane Doe", "jane@acme.ca", "msg-f", now);
        let err = engine.process(org, &n).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "amount {amount}");
    }

    let n = notification("10.00", None, "Jane Doe", "jane@acme.ca", "   ", now);
    assert!(engine.process(org, &n).await.is_err());

    // Nothing was written for any rejected notification.
    assert!(store.payments_snapshot().is_empty());
}

#[tokio::test]
async fn organization_policy_overrides_apply() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let inv = invoice(org, "INV-1042", "1130.00", "Jane Doe", "jane@acme.ca", 3, now);
    let invoice_id = inv.invoice_id;
    let store = InMemoryStore::with_invoices(vec![inv]);

    // A cautious organization that never auto-applies.
    let strict = etransfer_service::matching::MatchPolicy {
        auto_match_threshold: i32::MAX,
        ..Default::default()
    };
    store.policies.lock().unwrap().insert(org, strict);

    let engine = engine(store.clone(), Arc::new(RecordingAuditSink::default()));
    let n = notification(
        "1130.00",
        Some("INV-1042"),
        "Jane Doe",
        "jane@acme.ca",
        "msg-h",
        now,
    );
    let outcome = engine.process(org, &n).await.unwrap();

    assert_eq!(outcome.confidence, MatchConfidence::High);
    assert!(outcome.requires_review);
    assert_eq!(
        outcome.payment.unwrap().status,
        PaymentStatus::PendingReview.as_str()
    );
    assert_eq!(store.invoice(invoice_id).balance, dec("1130.00"));
}

#[tokio::test]
async fn audit_failure_never_blocks_settlement() {
    let org = Uuid::new_v4();
    let now = Utc::now();
    let inv = invoice(org, "INV-1042", "1130.00", "Jane Doe", "jane@acme.ca", 3, now);
    let invoice_id = inv.invoice_id;
    let store = InMemoryStore::with_invoices(vec![inv]);
    let engine = engine(store.clone(), Arc::new(FailingAuditSink));

    let n = notification(
        "1130.00",
        Some("INV-1042"),
        "Jane Doe",
        "jane@acme.ca",
        "msg-g",
        now,
    );
    let outcome = engine.process(org, &n).await.unwrap();

    assert!(outcome.payment.is_some());
    assert_eq!(store.invoice(invoice_id).balance, dec("0.00"));
}

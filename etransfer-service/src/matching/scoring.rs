//! Weighted multi-signal scoring of candidate invoices.
//!
//! Pure and deterministic: given the same notification, invoice, and policy
//! the same score and reasons come out. Every contributing signal appends a
//! human-readable reason used by the audit trail and the review UI.

use crate::matching::policy::MatchPolicy;
use crate::matching::similarity::{name_similarity, normalize, strip_whitespace};
use crate::models::{Invoice, ScoredCandidate, TransferNotification};
use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Score one candidate invoice against a notification.
pub fn score_invoice(
    invoice: &Invoice,
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> ScoredCandidate {
    let mut score = 0;
    let mut reasons = Vec::new();

    for signal in [
        reference_signal(invoice, notification, policy),
        amount_signal(invoice, notification, policy),
        identity_signal(invoice, notification, policy),
        email_signal(invoice, notification, policy),
        recency_signal(invoice, notification, policy),
    ]
    .into_iter()
    .flatten()
    {
        score += signal.0;
        reasons.push(signal.1);
    }

    ScoredCandidate {
        invoice_id: invoice.invoice_id,
        invoice_number: invoice.invoice_number.clone(),
        invoice_balance: invoice.balance,
        score,
        reasons,
    }
}

/// Score every candidate and rank best-first. The sort is stable, so equal
/// scores keep the finder's most-recent-first order.
pub fn rank_candidates(
    invoices: &[Invoice],
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = invoices
        .iter()
        .map(|invoice| score_invoice(invoice, notification, policy))
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

fn reference_signal(
    invoice: &Invoice,
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> Option<(i32, String)> {
    let text = notification.reference_text.as_deref()?;
    let reference = normalize(text);
    let number = normalize(&invoice.invoice_number);
    if reference.is_empty() || number.is_empty() {
        return None;
    }

    if reference.contains(&number) || number.contains(&reference) {
        return Some((
            policy.reference_exact_points,
            format!(
                "Reference text contains invoice number {}",
                invoice.invoice_number
            ),
        ));
    }

    let squeezed_reference = strip_whitespace(&reference);
    let squeezed_number = strip_whitespace(&number);
    if !squeezed_reference.is_empty()
        && !squeezed_number.is_empty()
        && (squeezed_reference.contains(&squeezed_number)
            || squeezed_number.contains(&squeezed_reference))
    {
        return Some((
            policy.reference_loose_points,
            format!(
                "Reference text matches invoice number {} ignoring whitespace",
                invoice.invoice_number
            ),
        ));
    }

    None
}

fn amount_signal(
    invoice: &Invoice,
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> Option<(i32, String)> {
    let diff = (notification.amount - invoice.balance).abs();

    if diff.is_zero() {
        return Some((
            policy.amount_exact_points,
            "Amount matches invoice balance exactly".to_string(),
        ));
    }
    if diff <= policy.amount_cent_band {
        return Some((
            policy.amount_cent_points,
            format!("Amount within ${} of invoice balance", policy.amount_cent_band),
        ));
    }
    if diff <= policy.amount_close_band {
        return Some((
            policy.amount_close_points,
            format!(
                "Amount within ${} of invoice balance",
                policy.amount_close_band
            ),
        ));
    }
    if diff <= policy.amount_near_band {
        return Some((
            policy.amount_near_points,
            format!(
                "Amount within ${} of invoice balance",
                policy.amount_near_band
            ),
        ));
    }

    // Inside the percent band the points taper linearly to zero at the edge.
    if invoice.balance > Decimal::ZERO {
        let pct = diff / invoice.balance;
        if pct < policy.amount_percent_band {
            let ratio = pct / policy.amount_percent_band;
            let points = (Decimal::from(policy.amount_percent_max_points)
                * (Decimal::ONE - ratio))
                .round()
                .to_i32()
                .unwrap_or(0);
            if points > 0 {
                let pct_display = (pct * Decimal::from(100)).round_dp(1);
                return Some((
                    points,
                    format!("Amount within {pct_display}% of invoice balance"),
                ));
            }
        }
    }

    None
}

fn identity_signal(
    invoice: &Invoice,
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> Option<(i32, String)> {
    // Blank names must not ride the similarity("", "") == 1 edge case.
    if normalize(&notification.sender_name).is_empty()
        || normalize(&invoice.customer_name).is_empty()
    {
        return None;
    }

    let similarity = name_similarity(&notification.sender_name, &invoice.customer_name);
    let points = if similarity > policy.identity_strong_cutoff {
        policy.identity_strong_points
    } else if similarity > policy.identity_good_cutoff {
        policy.identity_good_points
    } else if similarity > policy.identity_weak_cutoff {
        policy.identity_weak_points
    } else {
        return None;
    };

    Some((
        points,
        format!(
            "Sender name matches customer '{}' (similarity {:.2})",
            invoice.customer_name, similarity
        ),
    ))
}

fn email_signal(
    invoice: &Invoice,
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> Option<(i32, String)> {
    let sender = normalize(&notification.sender_email);
    let customer = normalize(&invoice.customer_email);
    if sender.is_empty() || customer.is_empty() {
        return None;
    }

    if sender == customer {
        return Some((
            policy.email_exact_points,
            "Sender email matches customer email".to_string(),
        ));
    }

    let sender_domain = sender.split_once('@').map(|(_, d)| d)?;
    let customer_domain = customer.split_once('@').map(|(_, d)| d)?;
    if !sender_domain.is_empty() && sender_domain == customer_domain {
        return Some((
            policy.email_domain_points,
            format!("Sender email domain matches customer domain {sender_domain}"),
        ));
    }

    None
}

fn recency_signal(
    invoice: &Invoice,
    notification: &TransferNotification,
    policy: &MatchPolicy,
) -> Option<(i32, String)> {
    let age = notification.transfer_timestamp - invoice.created_utc;
    if age < Duration::zero() {
        return None;
    }

    if age <= Duration::days(policy.recency_week_days) {
        return Some((
            policy.recency_week_points,
            format!(
                "Invoice created within {} days of transfer",
                policy.recency_week_days
            ),
        ));
    }
    if age <= Duration::days(policy.recency_fortnight_days) {
        return Some((
            policy.recency_fortnight_points,
            format!(
                "Invoice created within {} days of transfer",
                policy.recency_fortnight_days
            ),
        ));
    }

    None
}

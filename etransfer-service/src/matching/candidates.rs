//! Candidate finder: narrow the organization's open invoices to the short
//! list a transfer could plausibly pay.
//!
//! The repository supplies open invoices (owing status, balance > 0, created
//! inside the lookback window, most recent first); this filter applies the
//! amount bands and caps the list. Pure; no side effects.

use crate::matching::policy::MatchPolicy;
use crate::models::Invoice;
use rust_decimal::Decimal;

/// Keep invoices whose balance is exactly the transfer amount, within the
/// absolute tolerance (processor rounding and fees), or within the percent
/// band (partial payments). Order is preserved; at most
/// `policy.max_candidates` survive.
pub fn filter_candidates(
    invoices: Vec<Invoice>,
    amount: Decimal,
    policy: &MatchPolicy,
) -> Vec<Invoice> {
    let mut candidates: Vec<Invoice> = invoices
        .into_iter()
        .filter(|invoice| {
            if invoice.balance <= Decimal::ZERO {
                return false;
            }
            let diff = (invoice.balance - amount).abs();
            diff <= policy.amount_close_band || diff / invoice.balance <= policy.amount_percent_band
        })
        .collect();
    candidates.truncate(policy.max_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn invoice(balance: &str) -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            invoice_number: "INV-1".to_string(),
            status: "sent".to_string(),
            balance: Decimal::from_str(balance).unwrap(),
            customer_name: "Jane Doe".to_string(),
            customer_email: "jane@acme.ca".to_string(),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn keeps_exact_tolerance_and_percent_band_balances() {
        let policy = MatchPolicy::default();
        let amount = Decimal::from_str("1000.00").unwrap();
        let invoices = vec![
            invoice("1000.00"), // exact
            invoice("1000.75"), // inside ±$1
            invoice("1015.00"), // 1.5% off, inside ±2%
            invoice("1100.00"), // ~9% off, out
            invoice("500.00"),  // out
        ];

        let kept = filter_candidates(invoices, amount, &policy);
        let balances: Vec<String> = kept.iter().map(|i| i.balance.to_string()).collect();
        assert_eq!(balances, vec!["1000.00", "1000.75", "1015.00"]);
    }

    #[test]
    fn zero_balance_is_never_a_candidate() {
        let policy = MatchPolicy::default();
        let kept = filter_candidates(vec![invoice("0.00")], Decimal::ZERO, &policy);
        assert!(kept.is_empty());
    }

    #[test]
    fn list_is_capped_and_order_preserved() {
        let policy = MatchPolicy::default();
        let amount = Decimal::from_str("100.00").unwrap();
        let invoices: Vec<Invoice> = (0..30).map(|_| invoice("100.00")).collect();
        let ids: Vec<Uuid> = invoices.iter().map(|i| i.invoice_id).collect();

        let kept = filter_candidates(invoices, amount, &policy);
        assert_eq!(kept.len(), policy.max_candidates);
        let kept_ids: Vec<Uuid> = kept.iter().map(|i| i.invoice_id).collect();
        assert_eq!(kept_ids, ids[..policy.max_candidates]);
    }
}

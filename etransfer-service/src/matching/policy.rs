//! Match policy: every scoring weight, band, and threshold the engine uses.
//!
//! These values are business policy, not algorithmic necessities. Each
//! organization may override any subset through a `match_policies` row; the
//! defaults reproduce the platform-wide behavior exactly.

use crate::models::{MatchConfidence, ScoredCandidate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    // Reference signal.
    pub reference_exact_points: i32,
    pub reference_loose_points: i32,

    // Amount signal.
    pub amount_exact_points: i32,
    pub amount_cent_points: i32,
    pub amount_close_points: i32,
    pub amount_near_points: i32,
    /// Maximum points for a difference inside the percent band, scaled down
    /// linearly to zero at the band edge.
    pub amount_percent_max_points: i32,
    pub amount_cent_band: Decimal,
    pub amount_close_band: Decimal,
    pub amount_near_band: Decimal,
    /// Relative difference band, as a fraction of the invoice balance.
    pub amount_percent_band: Decimal,

    // Identity signal.
    pub identity_strong_points: i32,
    pub identity_good_points: i32,
    pub identity_weak_points: i32,
    pub identity_strong_cutoff: f64,
    pub identity_good_cutoff: f64,
    pub identity_weak_cutoff: f64,

    // Email signal.
    pub email_exact_points: i32,
    pub email_domain_points: i32,

    // Recency signal.
    pub recency_week_points: i32,
    pub recency_fortnight_points: i32,
    pub recency_week_days: i64,
    pub recency_fortnight_days: i64,

    // Candidate finder.
    pub lookback_days: i64,
    pub max_candidates: usize,

    // Confidence classification.
    pub high_confidence: i32,
    pub medium_confidence: i32,

    // Review policy.
    pub auto_match_threshold: i32,
    pub high_value_threshold: Decimal,
    pub ambiguity_gap: i32,

    // Duplicate detection.
    pub duplicate_window_secs: i64,

    // Review provenance snapshot size.
    pub provenance_limit: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            reference_exact_points: 50,
            reference_loose_points: 40,

            amount_exact_points: 40,
            amount_cent_points: 38,
            amount_close_points: 30,
            amount_near_points: 15,
            amount_percent_max_points: 20,
            amount_cent_band: Decimal::new(1, 2),
            amount_close_band: Decimal::ONE,
            amount_near_band: Decimal::from(10),
            amount_percent_band: Decimal::new(2, 2),

            identity_strong_points: 30,
            identity_good_points: 20,
            identity_weak_points: 10,
            identity_strong_cutoff: 0.9,
            identity_good_cutoff: 0.7,
            identity_weak_cutoff: 0.5,

            email_exact_points: 20,
            email_domain_points: 10,

            recency_week_points: 10,
            recency_fortnight_points: 5,
            recency_week_days: 7,
            recency_fortnight_days: 14,

            lookback_days: 30,
            max_candidates: 20,

            high_confidence: 90,
            medium_confidence: 70,

            auto_match_threshold: 85,
            high_value_threshold: Decimal::from(5000),
            ambiguity_gap: 10,

            duplicate_window_secs: 60,

            provenance_limit: 5,
        }
    }
}

impl MatchPolicy {
    /// Classify a score. Pure; the only way confidence is ever derived.
    pub fn classify(&self, score: i32) -> MatchConfidence {
        if score >= self.high_confidence {
            MatchConfidence::High
        } else if score >= self.medium_confidence {
            MatchConfidence::Medium
        } else if score > 0 {
            MatchConfidence::Low
        } else {
            MatchConfidence::None
        }
    }

    /// Decide whether a human must approve before funds are applied.
    ///
    /// `ranked` must be sorted best-first. Review is forced when the best
    /// score misses the auto-match bar, when the transfer is high-value
    /// regardless of score, or when two candidates are both credible and
    /// too close to call.
    pub fn requires_review(&self, amount: Decimal, ranked: &[ScoredCandidate]) -> bool {
        let best = ranked.first().map(|c| c.score).unwrap_or(0);
        if best < self.auto_match_threshold {
            return true;
        }
        if amount > self.high_value_threshold {
            return true;
        }
        if let [first, second, ..] = ranked {
            if first.score >= self.medium_confidence
                && second.score >= self.medium_confidence
                && first.score - second.score < self.ambiguity_gap
            {
                return true;
            }
        }
        false
    }
}

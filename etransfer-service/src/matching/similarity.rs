//! Text normalization and fuzzy identity similarity.

use strsim::normalized_levenshtein;

/// Case-folded, trimmed form used for reference and identity comparison.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Remove every whitespace character, for the loose reference comparison
/// ("INV 2041" vs "INV2041").
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Normalized Levenshtein similarity over case-folded input:
/// `1 - distance / max(len(a), len(b))`, defined as 1.0 when both sides
/// are empty.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&normalize(a), &normalize(b))
}

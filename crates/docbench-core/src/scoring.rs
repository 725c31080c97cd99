//! Leaf text normalization and fuzzy scoring.
//!
//! ## Normalization
//!
//! 1. Lowercase
//! 2. Separators (`/`, `,`, `;`, `|`) become a space
//! 3. Anything that is not `a-z`, `0-9` or whitespace is removed
//! 4. Whitespace runs collapse to one space, ends are trimmed
//!
//! ## Score
//!
//! Empty prediction scores `0.0`, identical normalized text scores `1.0`,
//! otherwise the token-level [`SequenceMatcher`] ratio.

use crate::matcher::SequenceMatcher;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tolerance applied to every threshold comparison.
pub const SCORE_EPSILON: f64 = 1e-9;

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[/,;|]").expect("separator pattern is compile-time constant"));

static DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9\s]").expect("character class pattern is compile-time constant")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is compile-time constant"));

/// Canonical form used for comparison. Idempotent.
#[must_use = "returns normalized text"]
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let lowered = text.to_lowercase();
    let spaced = SEPARATORS.replace_all(&lowered, " ");
    let stripped = DISALLOWED.replace_all(&spaced, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Similarity between a ground-truth and a predicted string, in `[0, 1]`.
///
/// Not rounded; see [`round_score`].
#[must_use = "returns similarity score"]
pub fn compute_score(gt: &str, pred: &str) -> f64 {
    if pred.is_empty() {
        return 0.0;
    }

    let gt_norm = normalize_text(gt);
    let pred_norm = normalize_text(pred);
    if gt_norm == pred_norm {
        return 1.0;
    }

    let gt_tokens: Vec<&str> = gt_norm.split_whitespace().collect();
    let pred_tokens: Vec<&str> = pred_norm.split_whitespace().collect();

    if gt_tokens.is_empty() {
        return if pred_tokens.is_empty() { 1.0 } else { 0.0 };
    }

    SequenceMatcher::new(&gt_tokens, &pred_tokens).ratio()
}

/// Round to 4 decimal digits for storage and display.
#[inline]
#[must_use = "returns rounded score"]
pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// `score >= threshold`, tolerant of rounding noise.
#[inline]
#[must_use = "checks score against threshold"]
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score - threshold > -SCORE_EPSILON
}

/// `score > threshold`, tolerant of rounding noise.
#[inline]
#[must_use = "checks score against threshold"]
pub fn exceeds_threshold(score: f64, threshold: f64) -> bool {
    score - threshold > SCORE_EPSILON
}

//! Running accuracy and latency metrics across processed documents.
//!
//! One [`MetricsAggregator`] owns the [`MetricsState`] of a session. Each
//! processed document contributes:
//!
//! - one classification verdict, from the `document_type` field score
//! - one correct/incorrect tally per scored field
//! - one entry in the accuracy series (fraction of correct fields)
//! - one processing time, recorded separately by the caller
//!
//! ## Snapshots
//!
//! [`MetricsState::to_snapshot`] renders the state as a JSON object using the
//! dashboard keys. [`merge_snapshot`] folds a fresh snapshot into a long-lived
//! aggregate: numbers add, arrays concatenate, anything else is replaced.
//! Merging the same snapshot twice counts it twice.

// Clippy pedantic allows:
// - Means and percentages use f64 from usize/u64
#![allow(clippy::cast_precision_loss)]

use crate::config::EvaluationConfig;
use crate::error::{BenchError, Result};
use crate::evaluator::EvaluationResult;
use crate::scoring::{exceeds_threshold, meets_threshold, round_score};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Field whose score decides the classification verdict.
pub const DOCUMENT_TYPE_FIELD: &str = "document_type";

/// Cumulative counters and series for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsState {
    /// Documents passed through [`MetricsAggregator::update_metrics`]
    pub total_docs: u64,
    /// Documents whose `document_type` score exceeded the classification threshold
    pub correct_classification: u64,
    /// Documents whose `document_type` score did not
    pub incorrect_classification: u64,
    /// Fields scoring at or above the field threshold
    pub correct_predictions: u64,
    /// Fields scoring below it
    pub incorrect_predictions: u64,
    /// Predictions that were not structured JSON
    pub llm_failures: u64,
    /// Per-document fraction of correct fields
    #[serde(rename = "accuracy", alias = "accuracy_series")]
    pub accuracy_series: Vec<f64>,
    /// Per-document processing time in seconds
    pub processing_times: Vec<f64>,
}

impl MetricsState {
    /// Render as a JSON object with the dashboard keys.
    #[must_use = "returns the metrics snapshot"]
    pub fn to_snapshot(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // a struct of counters and float vectors always serializes to an object
            _ => Map::new(),
        }
    }

    /// Read a snapshot back. Missing keys default to zero or empty.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::JsonError`] when a known key holds the wrong type
    /// (for example a negative count or a string where a series is expected).
    pub fn from_snapshot(snapshot: &Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(snapshot.clone()))?)
    }
}

/// Fold `update` into `aggregate`, key by key.
///
/// - both numbers: summed (integer sums stay integers)
/// - both arrays: `update` appended to `aggregate`
/// - key only in `update`: inserted
/// - any other combination: `update` replaces the old value
pub fn merge_snapshot(aggregate: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (key, new) in update {
        let merged = match (aggregate.remove(key), new) {
            (Some(Value::Number(old)), Value::Number(new)) => Value::Number(add_numbers(&old, new)),
            (Some(Value::Array(mut old)), Value::Array(new)) => {
                old.extend(new.iter().cloned());
                Value::Array(old)
            }
            _ => new.clone(),
        };
        aggregate.insert(key.clone(), merged);
    }
}

fn add_numbers(a: &Number, b: &Number) -> Number {
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        if let Some(sum) = x.checked_add(y) {
            return Number::from(sum);
        }
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Number::from(sum);
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).unwrap_or_else(|| Number::from(0))
}

/// `true` when a prediction is usable structured output.
///
/// Objects and arrays qualify. A string qualifies when, with any Markdown
/// code fence removed, it parses as a JSON object or array. Everything else,
/// `null` included, counts as a model failure.
#[must_use = "checks whether the prediction is structured JSON"]
pub fn is_structured_prediction(prediction: &Value) -> bool {
    match prediction {
        Value::Object(_) | Value::Array(_) => true,
        Value::String(text) => matches!(
            serde_json::from_str::<Value>(strip_code_fence(text)),
            Ok(Value::Object(_) | Value::Array(_))
        ),
        _ => false,
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
#[must_use = "returns the text without code fences"]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") up to the first newline
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// What one document contributed to the metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentTally {
    /// `document_type` cleared the classification threshold
    pub classification_correct: bool,
    /// Fields at or above the field threshold
    pub correct_fields: usize,
    /// Fields with a numeric score
    pub total_fields: usize,
    /// `correct_fields / total_fields`, `0.0` when no field was scored
    pub accuracy: f64,
}

/// Folds per-document evaluation results into a [`MetricsState`].
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    state: MetricsState,
    config: EvaluationConfig,
}

impl MetricsAggregator {
    /// Start from zeroed metrics.
    #[must_use = "creates a metrics aggregator"]
    pub fn new(config: EvaluationConfig) -> Self {
        Self::with_state(MetricsState::default(), config)
    }

    /// Continue from existing metrics.
    #[must_use = "creates a metrics aggregator"]
    pub const fn with_state(state: MetricsState, config: EvaluationConfig) -> Self {
        Self { state, config }
    }

    /// Current metrics.
    #[inline]
    #[must_use = "returns the metrics state"]
    pub const fn state(&self) -> &MetricsState {
        &self.state
    }

    /// Thresholds in use.
    #[inline]
    #[must_use = "returns the evaluation config"]
    pub const fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Give up the aggregator and keep its metrics.
    #[inline]
    #[must_use = "returns the metrics state"]
    pub fn into_state(self) -> MetricsState {
        self.state
    }

    /// Zero every counter and series.
    pub fn reset(&mut self) {
        self.state = MetricsState::default();
    }

    /// Append one processing time in seconds.
    pub fn record_processing(&mut self, elapsed_seconds: f64) {
        self.state.processing_times.push(elapsed_seconds);
    }

    /// Fold one document into the metrics.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::MissingField`] when `result` has no
    /// `document_type` record. Nothing is counted in that case.
    pub fn update_metrics(
        &mut self,
        prediction: &Value,
        result: &EvaluationResult,
    ) -> Result<DocumentTally> {
        let doc_type = result
            .get(DOCUMENT_TYPE_FIELD)
            .ok_or_else(|| BenchError::MissingField(DOCUMENT_TYPE_FIELD.to_string()))?;

        let classification_correct = doc_type
            .score
            .is_some_and(|score| exceeds_threshold(score, self.config.classification_threshold));
        if classification_correct {
            self.state.correct_classification += 1;
        } else {
            self.state.incorrect_classification += 1;
        }

        self.state.total_docs += 1;

        if !is_structured_prediction(prediction) {
            self.state.llm_failures += 1;
        }

        let (correct_fields, total_fields, accuracy) = self.mark_by_score(result);

        debug!(
            classification_correct,
            correct_fields, total_fields, "Updated metrics"
        );

        Ok(DocumentTally {
            classification_correct,
            correct_fields,
            total_fields,
            accuracy,
        })
    }

    /// Tally every scored field and append the document accuracy.
    ///
    /// Records without a numeric score (the evaluation error record) are not
    /// inspected. Returns `(correct, inspected, accuracy)`.
    pub fn mark_by_score(&mut self, result: &EvaluationResult) -> (usize, usize, f64) {
        let mut total = 0usize;
        let mut correct = 0usize;

        for (_, score) in result.scored() {
            total += 1;
            if meets_threshold(score, self.config.field_threshold) {
                correct += 1;
                self.state.correct_predictions += 1;
            } else {
                self.state.incorrect_predictions += 1;
            }
        }

        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        self.state.accuracy_series.push(accuracy);
        (correct, total, accuracy)
    }

    /// Derived values for display.
    #[must_use = "returns the metrics summary"]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_state(&self.state)
    }
}

/// Display values derived from a [`MetricsState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Documents processed
    pub total_docs: u64,
    /// Mean processing time in seconds (0 when none recorded)
    pub avg_processing_time: f64,
    /// `round(mean(accuracy), 4) * 100` (0 when none recorded)
    pub avg_accuracy_percent: f64,
    /// Share of documents classified correctly, in percent
    pub classification_accuracy_percent: f64,
    /// Share of fields predicted correctly, in percent
    pub field_accuracy_percent: f64,
    /// Fields at or above the field threshold
    pub correct_predictions: u64,
    /// Fields below it
    pub incorrect_predictions: u64,
    /// Predictions that were not structured JSON
    pub llm_failures: u64,
}

impl MetricsSummary {
    /// Compute the summary of `state`.
    #[must_use = "computes the metrics summary"]
    pub fn from_state(state: &MetricsState) -> Self {
        let classified = state.correct_classification + state.incorrect_classification;
        let fields = state.correct_predictions + state.incorrect_predictions;

        Self {
            total_docs: state.total_docs,
            avg_processing_time: mean(&state.processing_times),
            avg_accuracy_percent: round_score(mean(&state.accuracy_series)) * 100.0,
            classification_accuracy_percent: percent(state.correct_classification, classified),
            field_accuracy_percent: percent(state.correct_predictions, fields),
            correct_predictions: state.correct_predictions,
            incorrect_predictions: state.incorrect_predictions,
            llm_failures: state.llm_failures,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use serde_json::json;

    fn evaluate(gt: &Value, pred: &Value) -> EvaluationResult {
        Evaluator::new().evaluate_json(gt, pred)
    }

    #[test]
    fn test_perfect_document() {
        let gt = json!({"document_type": "INVOICE", "total": "42", "seller": {"name": "Acme"}});
        let mut agg = MetricsAggregator::new(EvaluationConfig::default());

        let tally = agg.update_metrics(&gt, &evaluate(&gt, &gt)).unwrap();
        assert!(tally.classification_correct);
        assert_eq!(tally.correct_fields, 3);
        assert_eq!(tally.total_fields, 3);

        let state = agg.state();
        assert_eq!(state.total_docs, 1);
        assert_eq!(state.correct_classification, 1);
        assert_eq!(state.correct_predictions, 3);
        assert_eq!(state.incorrect_predictions, 0);
        assert_eq!(state.llm_failures, 0);
        assert_eq!(state.accuracy_series, vec![1.0]);
    }

    #[test]
    fn test_missing_document_type_leaves_state_untouched() {
        let gt = json!({"total": "42"});
        let mut agg = MetricsAggregator::new(EvaluationConfig::default());

        let err = agg.update_metrics(&gt, &evaluate(&gt, &gt)).unwrap_err();
        assert!(matches!(err, BenchError::MissingField(ref f) if f == "document_type"));
        assert_eq!(agg.state(), &MetricsState::default());
    }

    #[test]
    fn test_classification_threshold_is_strict() {
        let config = EvaluationConfig {
            classification_threshold: 0.5,
            field_threshold: 0.75,
        };
        let gt = json!({"document_type": "GAS BILL"});
        // one of two ground-truth tokens matches: 2 * 1 / 3
        let pred = json!({"document_type": "GAS"});
        let result = evaluate(&gt, &pred);
        assert!((result.get("document_type").unwrap().score.unwrap() - 2.0 / 3.0).abs() < 0.001);

        let mut agg = MetricsAggregator::new(config);
        agg.update_metrics(&pred, &result).unwrap();
        assert_eq!(agg.state().correct_classification, 1);

        let mut strict = MetricsAggregator::new(EvaluationConfig {
            classification_threshold: 0.6667,
            field_threshold: 0.75,
        });
        strict.update_metrics(&pred, &result).unwrap();
        assert_eq!(strict.state().incorrect_classification, 1);
    }

    #[test]
    fn test_field_threshold_is_inclusive() {
        let gt = json!({"document_type": "INVOICE", "address": "Main Street, Apt 4"});
        let pred = json!({"document_type": "INVOICE", "address": "Main St Apt 4"});
        let result = evaluate(&gt, &pred);
        assert_eq!(result.get("address").unwrap().score, Some(0.75));

        let mut agg = MetricsAggregator::new(EvaluationConfig::default());
        let tally = agg.update_metrics(&pred, &result).unwrap();
        assert_eq!(tally.correct_fields, 2);
        assert_eq!(agg.state().accuracy_series, vec![1.0]);
    }

    #[test]
    fn test_unstructured_prediction_counts_llm_failure() {
        let gt = json!({"document_type": "INVOICE"});
        let mut agg = MetricsAggregator::new(EvaluationConfig::default());

        agg.update_metrics(&Value::Null, &evaluate(&gt, &Value::Null))
            .unwrap();
        agg.update_metrics(&json!("sorry, I cannot read this"), &evaluate(&gt, &Value::Null))
            .unwrap();
        agg.update_metrics(&json!("```json\n{\"document_type\": \"INVOICE\"}\n```"), &evaluate(&gt, &gt))
            .unwrap();

        let state = agg.state();
        assert_eq!(state.total_docs, 3);
        assert_eq!(state.llm_failures, 2);
        assert_eq!(state.incorrect_classification, 2);
        assert_eq!(state.correct_classification, 1);
    }

    #[test]
    fn test_error_result_is_not_scored() {
        let mut agg = MetricsAggregator::new(EvaluationConfig::default());
        let (correct, total, accuracy) = agg.mark_by_score(&EvaluationResult::failure("boom"));
        assert_eq!((correct, total), (0, 0));
        assert_eq!(accuracy, 0.0);
        assert_eq!(agg.state().accuracy_series, vec![0.0]);
        assert_eq!(agg.state().correct_predictions + agg.state().incorrect_predictions, 0);
    }

    #[test]
    fn test_record_processing_and_reset() {
        let mut agg = MetricsAggregator::new(EvaluationConfig::default());
        agg.record_processing(1.5);
        agg.record_processing(2.5);
        assert_eq!(agg.state().processing_times, vec![1.5, 2.5]);
        assert!((agg.summary().avg_processing_time - 2.0).abs() < 0.001);

        agg.reset();
        assert_eq!(agg.state(), &MetricsState::default());
    }

    #[test]
    fn test_summary_of_empty_state() {
        let summary = MetricsSummary::from_state(&MetricsState::default());
        assert_eq!(summary.avg_processing_time, 0.0);
        assert_eq!(summary.avg_accuracy_percent, 0.0);
        assert_eq!(summary.classification_accuracy_percent, 0.0);
    }

    #[test]
    fn test_summary_rounds_accuracy_before_percent() {
        let state = MetricsState {
            accuracy_series: vec![1.0, 2.0 / 3.0, 0.0],
            ..MetricsState::default()
        };
        let summary = MetricsSummary::from_state(&state);
        // mean 0.55555.. -> 0.5556 -> 55.56
        assert!((summary.avg_accuracy_percent - 55.56).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_uses_dashboard_keys() {
        let state = MetricsState {
            total_docs: 2,
            accuracy_series: vec![0.5, 1.0],
            ..MetricsState::default()
        };
        let snapshot = state.to_snapshot();
        assert_eq!(snapshot["total_docs"], json!(2));
        assert_eq!(snapshot["accuracy"], json!([0.5, 1.0]));
        assert!(!snapshot.contains_key("accuracy_series"));
        assert_eq!(MetricsState::from_snapshot(&snapshot).unwrap(), state);
    }

    #[test]
    fn test_from_snapshot_accepts_long_series_name() {
        let mut map = Map::new();
        map.insert("accuracy_series".to_string(), json!([0.25]));
        let state = MetricsState::from_snapshot(&map).unwrap();
        assert_eq!(state.accuracy_series, vec![0.25]);
        assert_eq!(state.total_docs, 0);
    }

    #[test]
    fn test_merge_snapshot_semantics() {
        let mut aggregate = json!({
            "total_docs": 2,
            "accuracy": [1.0],
            "label": "old",
            "mixed": [1],
            "avg": 0.5
        })
        .as_object()
        .cloned()
        .unwrap();
        let update = json!({
            "total_docs": 3,
            "accuracy": [0.5, 0.0],
            "label": "new",
            "mixed": 7,
            "avg": 0.25,
            "fresh": true
        })
        .as_object()
        .cloned()
        .unwrap();

        merge_snapshot(&mut aggregate, &update);

        assert_eq!(aggregate["total_docs"], json!(5));
        assert!(aggregate["total_docs"].is_u64());
        assert_eq!(aggregate["accuracy"], json!([1.0, 0.5, 0.0]));
        assert_eq!(aggregate["label"], json!("new"));
        assert_eq!(aggregate["mixed"], json!(7));
        assert_eq!(aggregate["avg"], json!(0.75));
        assert_eq!(aggregate["fresh"], json!(true));
    }

    #[test]
    fn test_merge_snapshot_twice_double_counts() {
        let update = MetricsState {
            total_docs: 1,
            processing_times: vec![0.5],
            ..MetricsState::default()
        }
        .to_snapshot();
        let mut aggregate = Map::new();
        merge_snapshot(&mut aggregate, &update);
        merge_snapshot(&mut aggregate, &update);

        let state = MetricsState::from_snapshot(&aggregate).unwrap();
        assert_eq!(state.total_docs, 2);
        assert_eq!(state.processing_times, vec![0.5, 0.5]);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_is_structured_prediction() {
        assert!(is_structured_prediction(&json!({"a": 1})));
        assert!(is_structured_prediction(&json!([1, 2])));
        assert!(is_structured_prediction(&json!("{\"a\": 1}")));
        assert!(!is_structured_prediction(&json!("\"just a string\"")));
        assert!(!is_structured_prediction(&json!(42)));
        assert!(!is_structured_prediction(&Value::Null));
    }
}

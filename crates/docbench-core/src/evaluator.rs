//! Recursive structural evaluation of a prediction against ground truth.
//!
//! The ground-truth tree alone decides which fields exist. Every ground-truth
//! leaf produces exactly one [`FieldRecord`] keyed by its field path:
//!
//! - object keys join with `.` (`seller.address.city`)
//! - array positions append `[i]` (`line_items[0].amount`)
//!
//! A prediction that is missing a key, has a shorter array, or has a
//! different container kind at some position simply yields absent values
//! (score `0.0`) for the affected fields. Extra prediction keys and extra
//! trailing array elements are ignored.
//!
//! ## Example
//!
//! ```
//! use docbench_core::Evaluator;
//! use serde_json::json;
//!
//! let gt = json!({"document_type": "INVOICE", "seller": {"name": "Acme Corp"}});
//! let pred = json!({"document_type": "invoice", "seller": {"name": "ACME corp."}});
//!
//! let result = Evaluator::new().evaluate_json(&gt, &pred);
//! assert_eq!(result.len(), 2);
//! assert_eq!(result.get("document_type").unwrap().score, Some(1.0));
//! assert_eq!(result.get("seller.name").unwrap().score, Some(1.0));
//! ```

// Clippy pedantic allows:
// - Mean score for logging uses f64 from usize
#![allow(clippy::cast_precision_loss)]

use crate::node::{canonical_cmp, Node};
use crate::scoring::{compute_score, round_score};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Key of the single record returned when evaluation cannot run.
pub const EVALUATE_ERROR_KEY: &str = "evaluate error";

/// Deepest ground-truth nesting the evaluator will walk.
pub const MAX_DEPTH: usize = 128;

/// Comparison of one ground-truth leaf with the predicted value at the same path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Ground-truth value
    pub gt_text: Value,
    /// Predicted value, `None` when the prediction has nothing at this path.
    /// An explicit `null` is kept as `Some(Value::Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub llm_text: Option<Value>,
    /// Similarity in `[0, 1]`, rounded to 4 decimals. `None` only on the error record.
    pub score: Option<f64>,
    /// Failure description, only on the error record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Any value that is present, `null` included, reads back as `Some`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl FieldRecord {
    fn scored(gt_text: Value, llm_text: Option<Value>, score: f64) -> Self {
        Self {
            gt_text,
            llm_text,
            score: Some(score),
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            gt_text: Value::Null,
            llm_text: None,
            score: None,
            error: Some(message),
        }
    }
}

/// Flat `field path → record` mapping for one document, in ground-truth order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationResult {
    fields: IndexMap<String, FieldRecord>,
}

impl EvaluationResult {
    /// Record for `path`, if the ground truth has such a leaf.
    #[inline]
    #[must_use = "returns the record for a path"]
    pub fn get(&self, path: &str) -> Option<&FieldRecord> {
        self.fields.get(path)
    }

    /// All `(path, record)` pairs in ground-truth order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldRecord)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All field paths in ground-truth order.
    #[inline]
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Records that carry a numeric score.
    #[inline]
    pub fn scored(&self) -> impl Iterator<Item = (&str, f64)> {
        self.iter()
            .filter_map(|(path, record)| record.score.map(|s| (path, s)))
    }

    /// Number of records.
    #[inline]
    #[must_use = "returns record count"]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` when no record was produced.
    #[inline]
    #[must_use = "checks whether the result is empty"]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The failure message when this is an error result.
    #[must_use = "returns the evaluation error, if any"]
    pub fn error(&self) -> Option<&str> {
        self.fields
            .get(EVALUATE_ERROR_KEY)
            .and_then(|record| record.error.as_deref())
    }

    /// Single-record result describing why evaluation could not run.
    #[must_use = "creates an error result"]
    pub fn failure(message: impl Into<String>) -> Self {
        let mut fields = IndexMap::with_capacity(1);
        fields.insert(
            EVALUATE_ERROR_KEY.to_string(),
            FieldRecord::failure(message.into()),
        );
        Self { fields }
    }

    fn insert(&mut self, path: String, record: FieldRecord) {
        self.fields.insert(path, record);
    }
}

/// Walks ground truth and prediction in lockstep and scores every leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Create an evaluator.
    #[inline]
    #[must_use = "creates an evaluator"]
    pub const fn new() -> Self {
        Self
    }

    /// Score `prediction` against `ground_truth`.
    ///
    /// Never fails: when the ground truth cannot be walked the result holds a
    /// single record under [`EVALUATE_ERROR_KEY`].
    #[must_use = "returns the evaluation result"]
    pub fn evaluate(&self, ground_truth: &Node, prediction: Option<&Node>) -> EvaluationResult {
        let mut result = EvaluationResult::default();

        if let Err(message) = compare(ground_truth, prediction, "", 0, &mut result) {
            warn!(error = %message, "Evaluation aborted");
            return EvaluationResult::failure(message);
        }

        if result.is_empty() {
            debug!("Ground truth has no leaf fields");
        } else {
            let mean = result.scored().map(|(_, s)| s).sum::<f64>() / result.len() as f64;
            debug!(fields = result.len(), mean_score = mean, "Evaluated document");
        }
        result
    }

    /// Score two JSON values. A `null` prediction is treated as absent.
    #[must_use = "returns the evaluation result"]
    pub fn evaluate_json(&self, ground_truth: &Value, prediction: &Value) -> EvaluationResult {
        let gt = Node::from(ground_truth);
        let pred = (!prediction.is_null()).then(|| Node::from(prediction));
        self.evaluate(&gt, pred.as_ref())
    }

    /// Score two JSON texts.
    ///
    /// Unparseable ground truth yields the error result; an unparseable
    /// prediction is treated as absent.
    #[must_use = "returns the evaluation result"]
    pub fn evaluate_str(&self, ground_truth: &str, prediction: &str) -> EvaluationResult {
        let gt = match Node::from_json_str(ground_truth) {
            Ok(node) => node,
            Err(e) => {
                warn!(error = %e, "Ground truth is not valid JSON");
                return EvaluationResult::failure(format!("invalid ground truth JSON: {e}"));
            }
        };
        let pred = Node::from_json_str(prediction).ok();
        self.evaluate(&gt, pred.as_ref())
    }
}

fn compare(
    gt: &Node,
    pred: Option<&Node>,
    prefix: &str,
    depth: usize,
    result: &mut EvaluationResult,
) -> Result<(), String> {
    if depth > MAX_DEPTH {
        return Err(format!(
            "ground truth nesting exceeds {MAX_DEPTH} levels at '{prefix}'"
        ));
    }

    match gt {
        Node::Object(fields) => {
            let pred_fields = match pred {
                Some(Node::Object(map)) => Some(map),
                _ => None,
            };
            for (key, value) in fields {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let pred_value = pred_fields.and_then(|map| map.get(key));
                compare(value, pred_value, &path, depth + 1, result)?;
            }
        }
        Node::Array(items) => {
            let gt_items: Vec<&Node> = items.iter().collect();
            let pred_items = sequence_of(pred);
            compare_sequence(&gt_items, pred_items.as_deref(), prefix, depth, result)?;
        }
        Node::Set(members) => {
            let mut pred_members: Vec<&Node> = match pred {
                Some(Node::Set(items) | Node::Array(items)) => items.iter().collect(),
                _ => Vec::new(),
            };
            pred_members.sort_by(|a, b| canonical_cmp(a, b));
            let mut gt_members: Vec<&Node> = members.iter().collect();
            gt_members.sort_by(|a, b| canonical_cmp(a, b));
            compare_sequence(
                &gt_members,
                Some(pred_members.as_slice()),
                prefix,
                depth,
                result,
            )?;
        }
        Node::Leaf(leaf) => {
            let pred_text = pred
                .filter(|node| !node.is_empty_value())
                .map(Node::score_text)
                .unwrap_or_default();
            let score = round_score(compute_score(&leaf.text(), &pred_text));
            result.insert(
                prefix.to_string(),
                FieldRecord::scored(leaf.to_json(), pred.map(Node::to_json), score),
            );
        }
    }
    Ok(())
}

fn sequence_of(pred: Option<&Node>) -> Option<Vec<&Node>> {
    match pred {
        Some(Node::Array(items) | Node::Set(items)) => Some(items.iter().collect()),
        _ => None,
    }
}

fn compare_sequence(
    items: &[&Node],
    pred_items: Option<&[&Node]>,
    prefix: &str,
    depth: usize,
    result: &mut EvaluationResult,
) -> Result<(), String> {
    for (idx, item) in items.iter().enumerate() {
        let path = format!("{prefix}[{idx}]");
        let pred_item = pred_items.and_then(|p| p.get(idx)).copied();
        compare(item, pred_item, &path, depth + 1, result)?;
    }
    Ok(())
}

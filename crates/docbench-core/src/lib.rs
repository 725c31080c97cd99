//! # docbench-core
//!
//! Structural evaluation and metrics aggregation for document extraction
//! benchmarks.
//!
//! A vision model reads a scanned document and returns JSON. This crate scores
//! that prediction against a human-authored ground truth, field by field, and
//! folds the scores into running session metrics.
//!
//! ## Overview
//!
//! The benchmark workflow:
//! 1. Derive an extraction schema from the ground truth ([`extract_schema`])
//! 2. Ask a [`DocumentExtractor`] for a prediction
//! 3. Align prediction and ground truth, scoring every leaf ([`Evaluator`])
//! 4. Update classification, field and latency metrics ([`MetricsAggregator`])
//! 5. Export rows as CSV or render a Markdown report ([`report`])
//!
//! ## Example Usage
//!
//! ```
//! use docbench_core::{EvaluationConfig, Evaluator, MetricsAggregator};
//! use serde_json::json;
//!
//! let gt = json!({"document_type": "INVOICE", "seller": {"name": "Acme Corp"}});
//! let pred = json!({"document_type": "Invoice", "seller": {"name": "Acme"}});
//!
//! let result = Evaluator::new().evaluate_json(&gt, &pred);
//! let mut metrics = MetricsAggregator::new(EvaluationConfig::default());
//! let tally = metrics.update_metrics(&pred, &result)?;
//!
//! assert!(tally.classification_correct);
//! assert_eq!(tally.correct_fields, 1);
//! assert_eq!(metrics.state().accuracy_series, vec![0.5]);
//! # Ok::<(), docbench_core::BenchError>(())
//! ```
//!
//! ## Modules
//!
//! - [`node`] - JSON tree model with an explicit unordered set kind
//! - [`matcher`] - Longest-matching-block sequence alignment
//! - [`scoring`] - Text normalization and leaf similarity
//! - [`evaluator`] - Recursive ground-truth driven evaluation
//! - [`metrics`] - Session metrics, summaries and snapshot merging
//! - [`schema`] - Extraction schema and model prompt
//! - [`report`] - CSV export and Markdown reports
//! - [`pipeline`] - Per-document orchestration over a pluggable extractor
//! - [`session`] - Explicit per-session state
//!
//! ## Scoring
//!
//! Leaves are compared as normalized text: lowercase, separators to spaces,
//! punctuation removed. Identical text scores 1.0, otherwise the token-level
//! matching ratio `2 * M / T`. Scores are stored rounded to 4 decimals.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod metrics;
pub mod node;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod scoring;
pub mod session;

pub use config::EvaluationConfig;
pub use error::{BenchError, Result};
pub use evaluator::{EvaluationResult, Evaluator, FieldRecord, EVALUATE_ERROR_KEY};
pub use metrics::{
    is_structured_prediction, merge_snapshot, DocumentTally, MetricsAggregator, MetricsState,
    MetricsSummary,
};
pub use node::{Leaf, Node};
pub use pipeline::{
    find_ground_truth, pair_documents, parse_model_reply, validate_document, BatchFailure,
    BatchReport, DocumentExtractor, DocumentJob, DocumentOutcome, ExtractionRequest, Pipeline,
    ReplayExtractor,
};
pub use report::{field_rows, render_summary, write_csv, FieldRow};
pub use schema::{build_extraction_prompt, extract_schema};
pub use scoring::{compute_score, normalize_text};
pub use session::Session;

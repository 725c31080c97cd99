//! Error types for benchmark evaluation and orchestration.
//!
//! Evaluation itself never fails (see [`crate::evaluator`]); these errors come
//! from the layers around it: configuration, file I/O, the extraction
//! collaborator, and contract violations detected by the metrics aggregator.

use thiserror::Error;

/// Error types that can occur while running a benchmark.
///
/// # Examples
///
/// ```
/// use docbench_core::{BenchError, EvaluationConfig};
///
/// let config = EvaluationConfig {
///     classification_threshold: 1.5,
///     field_threshold: 0.75,
/// };
///
/// match config.validate() {
///     Err(BenchError::Config(msg)) => assert!(msg.contains("classification_threshold")),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum BenchError {
    /// File I/O error.
    ///
    /// Reading ground-truth files, recorded predictions, or writing exports.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// CSV export error.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A field the pipeline contract requires is missing from an evaluation result.
    ///
    /// Ground truth must always carry `document_type`; its absence means the
    /// upstream schema is misconfigured, not that one document is bad.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Input document rejected before extraction (wrong type, unpaired file).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The extraction collaborator could not produce a prediction.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A document failed somewhere in the processing pipeline.
    #[error("Pipeline error: {file}: {message}")]
    Pipeline {
        /// Name of the document being processed
        file: String,
        /// What went wrong
        message: String,
    },
}

/// Type alias for [`Result<T, BenchError>`].
pub type Result<T> = std::result::Result<T, BenchError>;

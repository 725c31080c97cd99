//! Document processing pipeline.
//!
//! For each document:
//!
//! 1. Validate the input image
//! 2. Derive the extraction schema and prompt from ground truth
//! 3. Ask the [`DocumentExtractor`] for a prediction
//! 4. Evaluate the prediction against ground truth
//! 5. Update session metrics and record the processing time
//!
//! Documents run strictly one after another. A failed document never stops
//! the batch; it is reported in [`BatchReport::failures`].
//!
//! ## Example
//!
//! ```no_run
//! use docbench_core::{DocumentJob, EvaluationConfig, Pipeline, ReplayExtractor, Session};
//!
//! # async fn example() -> docbench_core::Result<()> {
//! let pipeline = Pipeline::new(ReplayExtractor::new("predictions/"));
//! let mut session = Session::new(EvaluationConfig::from_env());
//!
//! let job = DocumentJob::load("scans/invoice_01.jpg", "truth/invoice_01.json")?;
//! let report = pipeline.run_batch(&mut session, &[job]).await;
//! println!("{} processed, {} failed", report.outcomes.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{BenchError, Result};
use crate::evaluator::{EvaluationResult, Evaluator};
use crate::metrics::strip_code_fence;
use crate::schema::{build_extraction_prompt, extract_schema};
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Image extensions accepted by [`validate_document`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Everything the extractor gets for one document.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Document image
    pub image: PathBuf,
    /// Instruction text
    pub prompt: String,
    /// Shape the prediction should follow
    pub schema: Value,
}

/// Produces a structured prediction for a document image.
///
/// Implementations wrap a model provider. A returned `Value::String` is
/// treated as a raw model reply and parsed with [`parse_model_reply`].
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// Extract a prediction for `request.image`.
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value>;
}

/// Serves predictions recorded earlier, one JSON file per document.
///
/// The prediction for `scans/invoice_01.jpg` is read from
/// `<dir>/invoice_01.json`.
#[derive(Debug, Clone)]
pub struct ReplayExtractor {
    dir: PathBuf,
}

impl ReplayExtractor {
    /// Replay predictions from `dir`.
    #[must_use = "creates a replay extractor"]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the prediction for `image` is expected.
    #[must_use = "returns the prediction path"]
    pub fn prediction_path(&self, image: &Path) -> PathBuf {
        let mut name = image.file_stem().unwrap_or_default().to_os_string();
        name.push(".json");
        self.dir.join(name)
    }
}

#[async_trait]
impl DocumentExtractor for ReplayExtractor {
    fn name(&self) -> &str {
        "replay"
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<Value> {
        let path = self.prediction_path(&request.image);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            BenchError::Extraction(format!("no recorded prediction at {}: {e}", path.display()))
        })?;
        // recorded replies may be raw model text; keep them as strings
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Parse a model reply, tolerating a surrounding Markdown code fence.
///
/// # Errors
///
/// Returns [`BenchError::JsonError`] when the reply is not JSON.
pub fn parse_model_reply(reply: &str) -> Result<Value> {
    Ok(serde_json::from_str(strip_code_fence(reply))?)
}

/// Accept only JPG/JPEG images (extension checked case-insensitively).
///
/// # Errors
///
/// Returns [`BenchError::InvalidInput`] for any other file.
pub fn validate_document(path: &Path) -> Result<()> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| ext.eq_ignore_ascii_case(s))
        });
    if supported {
        Ok(())
    } else {
        Err(BenchError::InvalidInput(format!(
            "{} is not a JPG/JPEG file",
            file_name(path)
        )))
    }
}

/// Ground-truth file in `ground_truths` with the same stem as `image`.
///
/// # Errors
///
/// Returns [`BenchError::InvalidInput`] naming the image when no file matches.
pub fn find_ground_truth(image: &Path, ground_truths: &[PathBuf]) -> Result<PathBuf> {
    image
        .file_stem()
        .and_then(|stem| ground_truths.iter().find(|gt| gt.file_stem() == Some(stem)))
        .cloned()
        .ok_or_else(|| {
            BenchError::InvalidInput(format!(
                "No matching ground truth found for {}",
                file_name(image)
            ))
        })
}

/// Pair each image with the ground-truth file that has the same stem.
///
/// Pairs follow the order of `images`. Use [`find_ground_truth`] to pair one
/// image at a time when unmatched images should be skipped instead.
///
/// # Errors
///
/// Returns [`BenchError::InvalidInput`] naming the first image without a
/// ground-truth partner.
pub fn pair_documents(
    images: &[PathBuf],
    ground_truths: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>> {
    images
        .iter()
        .map(|image| Ok((image.clone(), find_ground_truth(image, ground_truths)?)))
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// One document to process.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    /// Document image
    pub image: PathBuf,
    /// Ground truth for the image
    pub ground_truth: Value,
    /// Optional OCR extract passed to the model as a hint
    pub ocr_text: Option<String>,
}

impl DocumentJob {
    /// Job with in-memory ground truth.
    #[must_use = "creates a document job"]
    pub fn new(image: impl Into<PathBuf>, ground_truth: Value) -> Self {
        Self {
            image: image.into(),
            ground_truth,
            ocr_text: None,
        }
    }

    /// Job whose ground truth is read from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not JSON.
    pub fn load(image: impl Into<PathBuf>, ground_truth: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(ground_truth.as_ref())?;
        Ok(Self::new(image, serde_json::from_str(&text)?))
    }

    /// Attach an OCR extract.
    #[must_use = "returns the job with OCR text"]
    pub fn with_ocr_text(mut self, ocr_text: impl Into<String>) -> Self {
        self.ocr_text = Some(ocr_text.into());
        self
    }

    /// Image file name, used to identify the document in reports.
    #[must_use = "returns the document name"]
    pub fn file_name(&self) -> String {
        file_name(&self.image)
    }
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Image file name
    pub file_name: String,
    /// Field-by-field evaluation
    pub result: EvaluationResult,
    /// Seconds spent on the document, rounded to 2 decimals
    pub processing_time: f64,
}

/// A document that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Image file name
    pub file_name: String,
    /// What went wrong
    pub error: String,
}

/// Outcome of [`Pipeline::run_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Processed documents, in input order
    pub outcomes: Vec<DocumentOutcome>,
    /// Documents that failed, in input order
    pub failures: Vec<BatchFailure>,
}

/// Runs documents through extraction, evaluation and metrics.
#[derive(Debug, Clone)]
pub struct Pipeline<E> {
    extractor: E,
    evaluator: Evaluator,
}

impl<E: DocumentExtractor> Pipeline<E> {
    /// Pipeline backed by `extractor`.
    #[must_use = "creates a pipeline"]
    pub const fn new(extractor: E) -> Self {
        Self {
            extractor,
            evaluator: Evaluator::new(),
        }
    }

    /// The extractor in use.
    #[inline]
    #[must_use = "returns the extractor"]
    pub const fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Process one document and record it in `session`.
    ///
    /// An extractor failure is not fatal: it is logged and the document is
    /// evaluated against an absent prediction, which counts as an LLM failure.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Pipeline`] when the image is rejected or the
    /// ground truth has no `document_type` field.
    pub async fn process_document(
        &self,
        session: &mut Session,
        job: &DocumentJob,
    ) -> Result<DocumentOutcome> {
        let file = job.file_name();
        let pipeline_error = |e: BenchError| BenchError::Pipeline {
            file: file.clone(),
            message: e.to_string(),
        };

        let start = Instant::now();
        validate_document(&job.image).map_err(pipeline_error)?;

        let schema = extract_schema(&job.ground_truth);
        let request = ExtractionRequest {
            image: job.image.clone(),
            prompt: build_extraction_prompt(&schema, job.ocr_text.as_deref()),
            schema,
        };

        info!(file = %file, extractor = self.extractor.name(), "Running extractor");
        let prediction = match self.extractor.extract(&request).await {
            Ok(value) => value,
            Err(e) => {
                warn!(file = %file, error = %e, "Extraction failed, scoring as absent");
                Value::Null
            }
        };

        let parsed = match &prediction {
            Value::String(reply) => parse_model_reply(reply).unwrap_or(Value::Null),
            other => other.clone(),
        };
        let result = self.evaluator.evaluate_json(&job.ground_truth, &parsed);

        session
            .aggregator
            .update_metrics(&prediction, &result)
            .map_err(pipeline_error)?;
        let elapsed = start.elapsed().as_secs_f64();
        session.aggregator.record_processing(elapsed);

        let outcome = DocumentOutcome {
            file_name: file.clone(),
            result,
            processing_time: (elapsed * 100.0).round() / 100.0,
        };
        info!(
            file = %file,
            fields = outcome.result.len(),
            seconds = outcome.processing_time,
            "Processed document"
        );
        session.outcomes.push(outcome.clone());
        Ok(outcome)
    }

    /// Process `jobs` one after another.
    ///
    /// Failures are collected per document; the remaining documents still run.
    pub async fn run_batch(&self, session: &mut Session, jobs: &[DocumentJob]) -> BatchReport {
        let mut report = BatchReport::default();
        for job in jobs {
            match self.process_document(session, job).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(error = %e, "Document failed");
                    report.failures.push(BatchFailure {
                        file_name: job.file_name(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            processed = report.outcomes.len(),
            failed = report.failures.len(),
            "Batch complete"
        );
        report
    }
}

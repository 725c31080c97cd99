//! Tabular export and Markdown reports.
//!
//! - [`field_rows`] / [`write_csv`]: one row per field with the columns
//!   `field,gt_text,llm_text,score`
//! - [`field_rows_from_json`]: rows from a previously exported result, skipping
//!   malformed entries one by one
//! - [`group_by_section`]: fields grouped under their first path segment
//! - [`render_summary`]: Markdown report for a batch

use crate::evaluator::{EvaluationResult, FieldRecord};
use crate::metrics::MetricsSummary;
use crate::pipeline::DocumentOutcome;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::io::Write;
use tracing::warn;

/// Sub-key used for top-level fields in [`group_by_section`].
pub const SELF_KEY: &str = "_self";

/// One exported field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRow {
    /// Field path
    pub field: String,
    /// Ground-truth text
    pub gt_text: String,
    /// Predicted text, empty when absent
    pub llm_text: String,
    /// Score, empty on the error record
    pub score: Option<f64>,
}

impl FieldRow {
    fn from_record(field: &str, record: &FieldRecord) -> Self {
        Self {
            field: field.to_string(),
            gt_text: display_text(&record.gt_text),
            llm_text: record.llm_text.as_ref().map(display_text).unwrap_or_default(),
            score: record.score,
        }
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows for every record of `result`, in path order.
#[must_use = "returns export rows"]
pub fn field_rows(result: &EvaluationResult) -> Vec<FieldRow> {
    result
        .iter()
        .map(|(field, record)| FieldRow::from_record(field, record))
        .collect()
}

/// Rows from an exported result (`{"path": {"gt_text": .., "llm_text": .., "score": ..}}`).
///
/// Entries that are not objects are skipped with a warning; a root that is
/// not an object yields no rows.
#[must_use = "returns export rows"]
pub fn field_rows_from_json(result: &Value) -> Vec<FieldRow> {
    let Some(entries) = result.as_object() else {
        warn!("Evaluation result is not an object, nothing to export");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|(field, entry)| {
            let Some(record) = entry.as_object() else {
                warn!(field = %field, "Skipping malformed result entry");
                return None;
            };
            let text = |key: &str| record.get(key).map(display_text).unwrap_or_default();
            Some(FieldRow {
                field: field.clone(),
                gt_text: text("gt_text"),
                llm_text: text("llm_text"),
                score: record.get("score").and_then(Value::as_f64),
            })
        })
        .collect()
}

/// Write `rows` as CSV with the header `field,gt_text,llm_text,score`.
///
/// # Errors
///
/// Returns [`crate::BenchError::CsvError`] when a row cannot be written, or
/// [`crate::BenchError::IoError`] when flushing fails.
pub fn write_csv<W: Write>(rows: &[FieldRow], writer: W) -> crate::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv_writer.write_record(["field", "gt_text", "llm_text", "score"])?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Group records by their first `.`-separated path segment.
///
/// `seller.address.city` lands in section `seller` under `address.city`;
/// a top-level field lands in its own section under [`SELF_KEY`].
#[must_use = "returns grouped records"]
pub fn group_by_section(
    result: &EvaluationResult,
) -> IndexMap<String, IndexMap<String, &FieldRecord>> {
    let mut grouped: IndexMap<String, IndexMap<String, &FieldRecord>> = IndexMap::new();
    for (path, record) in result.iter() {
        let (section, sub_key) = path.split_once('.').unwrap_or((path, SELF_KEY));
        grouped
            .entry(section.to_string())
            .or_default()
            .insert(sub_key.to_string(), record);
    }
    grouped
}

/// Markdown report for a batch: totals, then one row per document.
#[must_use = "generates the batch report"]
pub fn render_summary(summary: &MetricsSummary, outcomes: &[DocumentOutcome]) -> String {
    let mut report = String::new();

    report.push_str("# Document Extraction Benchmark Report\n\n");
    let _ = writeln!(
        report,
        "Generated: {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    report.push_str("## Summary\n\n");
    let _ = writeln!(report, "- Documents: {}", summary.total_docs);
    let _ = writeln!(
        report,
        "- Average Accuracy: {:.2}%",
        summary.avg_accuracy_percent
    );
    let _ = writeln!(
        report,
        "- Classification Accuracy: {:.1}%",
        summary.classification_accuracy_percent
    );
    let _ = writeln!(
        report,
        "- Field Accuracy: {:.1}% ({} correct, {} incorrect)",
        summary.field_accuracy_percent, summary.correct_predictions, summary.incorrect_predictions
    );
    let _ = writeln!(report, "- LLM Failures: {}", summary.llm_failures);
    let _ = writeln!(
        report,
        "- Average Processing Time: {:.2}s",
        summary.avg_processing_time
    );

    if outcomes.is_empty() {
        return report;
    }

    report.push_str("\n## Documents\n\n");
    report.push_str("| File | Fields | Mean Score | Time (s) |\n");
    report.push_str("|------|--------|------------|----------|\n");
    for outcome in outcomes {
        let scores: Vec<f64> = outcome.result.scored().map(|(_, s)| s).collect();
        let mean = if scores.is_empty() {
            "-".to_string()
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            format!("{mean:.4}")
        };
        let _ = writeln!(
            report,
            "| {} | {} | {} | {:.2} |",
            outcome.file_name,
            outcome.result.len(),
            mean,
            outcome.processing_time
        );
    }

    report
}

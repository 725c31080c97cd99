//! Integration tests for the full benchmark flow
//!
//! Ground truth and predictions go through the pipeline, the metrics and the
//! exports the way a batch run uses them.

use async_trait::async_trait;
use docbench_core::{
    field_rows, pair_documents, render_summary, write_csv, BenchError, DocumentExtractor,
    DocumentJob, EvaluationConfig, Evaluator, ExtractionRequest, MetricsAggregator,
    MetricsState, MetricsSummary, Pipeline, ReplayExtractor, Session,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// Serves predictions keyed by image file name.
struct MapExtractor {
    replies: HashMap<String, Value>,
}

#[async_trait]
impl DocumentExtractor for MapExtractor {
    fn name(&self) -> &str {
        "map"
    }

    async fn extract(&self, request: &ExtractionRequest) -> docbench_core::Result<Value> {
        let name = request
            .image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.replies
            .get(name)
            .cloned()
            .ok_or_else(|| BenchError::Extraction(format!("no reply for {name}")))
    }
}

#[test]
fn test_invoice_amount_scenario() {
    let gt = json!({"document_type": "INVOICE", "amount": "100.00"});
    let pred = json!({"document_type": "INVOICE", "amount": "100"});

    let result = Evaluator::new().evaluate_json(&gt, &pred);
    assert_eq!(result.get("document_type").unwrap().score, Some(1.0));

    // "100.00" normalizes to the single token "10000", which shares nothing with "100"
    let amount = result.get("amount").unwrap().score.unwrap();
    assert!(amount < 1.0);
    assert_eq!(amount, 0.0);

    let mut metrics = MetricsAggregator::new(EvaluationConfig::default());
    metrics.update_metrics(&pred, &result).unwrap();

    let state = metrics.state();
    assert_eq!(state.total_docs, 1);
    assert_eq!(state.correct_classification, 1);
    assert_eq!(state.correct_predictions, 1);
    assert_eq!(state.incorrect_predictions, 1);
    assert_eq!(state.accuracy_series, vec![0.5]);
}

#[test]
fn test_address_scenario_clears_field_threshold() {
    let gt = json!({"document_type": "RECEIPT", "address": "Main Street, Apt 4"});
    let pred = json!({"document_type": "receipt", "address": "Main St Apt 4"});

    let result = Evaluator::new().evaluate_json(&gt, &pred);
    let score = result.get("address").unwrap().score.unwrap();
    assert!(score > 0.5 && score < 1.0);

    let mut metrics = MetricsAggregator::new(EvaluationConfig::default());
    let tally = metrics.update_metrics(&pred, &result).unwrap();
    assert_eq!(tally.correct_fields, 2);

    let mut strict = MetricsAggregator::new(EvaluationConfig {
        classification_threshold: 0.8,
        field_threshold: 0.9,
    });
    let tally = strict.update_metrics(&pred, &result).unwrap();
    assert_eq!(tally.correct_fields, 1);
    assert_eq!(strict.state().accuracy_series, vec![0.5]);
}

#[tokio::test]
async fn test_batch_end_to_end() {
    let invoice_gt = json!({
        "document_type": "INVOICE",
        "invoice_number": "INV-0042",
        "seller": {"name": "Acme Corp", "address": "12 Rue de Rivoli, Paris"},
        "line_items": [
            {"description": "Widget", "amount": "10.00"},
            {"description": "Gadget", "amount": "5.50"}
        ]
    });
    let receipt_gt = json!({"document_type": "RECEIPT", "total": "7.20"});

    let mut replies = HashMap::new();
    replies.insert("invoice.jpg".to_string(), invoice_gt.clone());
    replies.insert(
        "receipt.jpg".to_string(),
        json!("```json\n{\"document_type\": \"invoice\", \"total\": \"7.20\"}\n```"),
    );
    let pipeline = Pipeline::new(MapExtractor { replies });

    let jobs = vec![
        DocumentJob::new("invoice.jpg", invoice_gt),
        DocumentJob::new("receipt.jpg", receipt_gt),
        DocumentJob::new("missing.jpg", json!({"document_type": "CHECK"})),
    ];

    let mut session = Session::new(EvaluationConfig::default());
    let report = pipeline.run_batch(&mut session, &jobs).await;

    assert_eq!(report.outcomes.len(), 3);
    assert!(report.failures.is_empty());
    assert_eq!(report.outcomes[0].result.len(), 8);

    let state = session.aggregator.state();
    assert_eq!(state.total_docs, 3);
    assert_eq!(state.correct_classification, 1);
    assert_eq!(state.incorrect_classification, 2);
    assert_eq!(state.llm_failures, 1);
    assert_eq!(state.correct_predictions, 9);
    assert_eq!(state.incorrect_predictions, 2);
    assert_eq!(state.accuracy_series, vec![1.0, 0.5, 0.0]);
    assert_eq!(state.processing_times.len(), 3);

    let summary = MetricsSummary::from_state(state);
    assert!((summary.avg_accuracy_percent - 50.0).abs() < 0.001);

    let markdown = render_summary(&summary, &session.outcomes);
    assert!(markdown.contains("| invoice.jpg | 8 |"));
    assert!(markdown.contains("- LLM Failures: 1"));
}

#[tokio::test]
async fn test_session_sync_accumulates_batches() {
    let gt = json!({"document_type": "PAYSLIP", "net": "2 500"});
    let mut replies = HashMap::new();
    replies.insert("a.jpg".to_string(), gt.clone());
    replies.insert("b.jpg".to_string(), gt.clone());
    let pipeline = Pipeline::new(MapExtractor { replies });
    let mut session = Session::new(EvaluationConfig::default());

    pipeline
        .run_batch(&mut session, &[DocumentJob::new("a.jpg", gt.clone())])
        .await;
    session.sync();
    pipeline
        .run_batch(&mut session, &[DocumentJob::new("b.jpg", gt)])
        .await;
    session.sync();

    let total = MetricsState::from_snapshot(&session.aggregate_snapshot).unwrap();
    assert_eq!(total.total_docs, 2);
    assert_eq!(total.correct_predictions, 4);
    assert_eq!(total.accuracy_series, vec![1.0, 1.0]);
    assert_eq!(session.outcomes.len(), 2);
    assert_eq!(session.aggregator.state().total_docs, 0);
}

#[tokio::test]
async fn test_replay_from_directories() {
    let root = tempfile::tempdir().unwrap();
    let truth_dir = root.path().join("truth");
    let pred_dir = root.path().join("predictions");
    std::fs::create_dir_all(&truth_dir).unwrap();
    std::fs::create_dir_all(&pred_dir).unwrap();

    std::fs::write(
        truth_dir.join("bill.json"),
        r#"{"document_type": "WATER BILL", "account": "77-1234"}"#,
    )
    .unwrap();
    std::fs::write(
        pred_dir.join("bill.json"),
        r#"{"document_type": "Water Bill", "account": "771234"}"#,
    )
    .unwrap();

    let images = vec![PathBuf::from("scans/bill.jpg")];
    let truths = vec![truth_dir.join("bill.json")];
    let pairs = pair_documents(&images, &truths).unwrap();
    let jobs: Vec<DocumentJob> = pairs
        .iter()
        .map(|(image, gt)| DocumentJob::load(image, gt).unwrap())
        .collect();

    let pipeline = Pipeline::new(ReplayExtractor::new(&pred_dir));
    let mut session = Session::new(EvaluationConfig::default());
    let report = pipeline.run_batch(&mut session, &jobs).await;

    assert_eq!(report.outcomes.len(), 1);
    let result = &report.outcomes[0].result;
    assert_eq!(result.get("document_type").unwrap().score, Some(1.0));
    assert_eq!(result.get("account").unwrap().score, Some(1.0));

    let mut csv = Vec::new();
    write_csv(&field_rows(result), &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.starts_with("field,gt_text,llm_text,score\n"));
    assert!(csv.contains("account,77-1234,771234,1.0"));
}

//! Per-user session context.
//!
//! A [`Session`] is owned by whoever drives the pipeline and passed to it by
//! mutable reference. It holds the metrics aggregator, the documents processed
//! so far, and a long-lived aggregate snapshot that [`Session::sync`] folds
//! each batch into.

use crate::config::EvaluationConfig;
use crate::metrics::{merge_snapshot, MetricsAggregator, MetricsState};
use crate::pipeline::DocumentOutcome;
use serde_json::{Map, Value};
use tracing::debug;

/// State of one benchmarking session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Metrics of documents processed since the last sync
    pub aggregator: MetricsAggregator,
    /// Documents processed in this session, in processing order
    pub outcomes: Vec<DocumentOutcome>,
    /// Cumulative metrics snapshot across syncs
    pub aggregate_snapshot: Map<String, Value>,
}

impl Session {
    /// Empty session using `config` thresholds.
    #[must_use = "creates a session"]
    pub fn new(config: EvaluationConfig) -> Self {
        Self {
            aggregator: MetricsAggregator::new(config),
            outcomes: Vec::new(),
            aggregate_snapshot: Map::new(),
        }
    }

    /// Session continuing from a previously saved aggregate snapshot.
    #[must_use = "creates a session"]
    pub fn with_aggregate(config: EvaluationConfig, aggregate_snapshot: Map<String, Value>) -> Self {
        Self {
            aggregate_snapshot,
            ..Self::new(config)
        }
    }

    /// Forget processed documents. Metrics are kept.
    pub fn reset(&mut self) {
        self.outcomes.clear();
    }

    /// Zero the current metrics. Documents and the aggregate are kept.
    pub fn reset_metrics(&mut self) {
        self.aggregator.reset();
    }

    /// Fold the current metrics into the aggregate snapshot and start a
    /// fresh batch. Returns the metrics that were folded in.
    pub fn sync(&mut self) -> MetricsState {
        let batch = self.aggregator.state().clone();
        merge_snapshot(&mut self.aggregate_snapshot, &batch.to_snapshot());
        self.aggregator.reset();
        debug!(documents = batch.total_docs, "Synced batch metrics into aggregate");
        batch
    }
}

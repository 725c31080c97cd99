//! Document extraction benchmark CLI
//!
//! Scores model predictions against ground truth and tracks accuracy metrics.

// Clippy pedantic allows:
// - Percentages and means use f64 from usize
// - clap requires owned arguments in command handlers
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, CONFIG_FILE_NAME};
use docbench_core::{
    build_extraction_prompt, extract_schema, field_rows, find_ground_truth, merge_snapshot,
    render_summary, validate_document, write_csv, BatchFailure, BenchError, DocumentJob,
    EvaluationConfig, EvaluationResult, Evaluator, MetricsState, MetricsSummary, Pipeline,
    ReplayExtractor, Session,
};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "docbench",
    about = "Benchmark structured document extraction against ground truth",
    long_about = "Score model predictions against human-authored ground truth, field by field,\n\
                  and track classification, field accuracy and latency metrics.\n\
                  \n\
                  Defaults can be set via .docbench.toml configuration file.",
    version
)]
struct Args {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Score `document_type` must exceed to count as correctly classified
    #[arg(long, global = true)]
    classification_threshold: Option<f64>,

    /// Score a field must reach to count as correct
    #[arg(long, global = true)]
    field_threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate one prediction against its ground truth
    Evaluate {
        /// Ground-truth JSON file
        #[arg(long)]
        ground_truth: PathBuf,

        /// Predicted JSON file (raw model replies with code fences are accepted)
        #[arg(long)]
        prediction: PathBuf,

        /// Write the field table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the evaluation result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a directory of documents against recorded predictions
    Batch {
        /// Directory of JPG/JPEG document images
        #[arg(long)]
        documents: PathBuf,

        /// Directory of ground-truth JSON files, one per image stem
        #[arg(long)]
        ground_truth: PathBuf,

        /// Directory of recorded predictions, one per image stem
        #[arg(long)]
        predictions: PathBuf,

        /// Directory for per-document CSV files, results and report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cumulative metrics file to fold this batch into
        #[arg(long)]
        merge_into: Option<PathBuf>,
    },

    /// Print the extraction schema derived from a ground-truth file
    Schema {
        /// Ground-truth JSON file
        #[arg(long)]
        ground_truth: PathBuf,

        /// Print the full model prompt instead of the schema
        #[arg(long)]
        prompt: bool,

        /// Text file with an OCR extract to include in the prompt
        #[arg(long, requires = "prompt")]
        ocr_text: Option<PathBuf>,
    },

    /// Fold metrics snapshots into a cumulative metrics file
    Merge {
        /// Cumulative metrics file (created when missing)
        #[arg(long)]
        into: PathBuf,

        /// Snapshots to add
        #[arg(required = true)]
        snapshots: Vec<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the resolved thresholds
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let directive = if args.verbose {
        "docbench=debug"
    } else {
        "docbench=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().expect("directive is compile-time constant")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::discover();
    let thresholds =
        config.evaluation_config(args.classification_threshold, args.field_threshold)?;

    match args.command {
        Commands::Evaluate {
            ground_truth,
            prediction,
            csv,
            json,
        } => evaluate_command(&ground_truth, &prediction, csv.as_deref(), json, &thresholds),
        Commands::Batch {
            documents,
            ground_truth,
            predictions,
            output,
            merge_into,
        } => {
            let batch_defaults = config.batch.clone().unwrap_or_default();
            batch_command(
                &documents,
                &ground_truth,
                &predictions,
                output.or(batch_defaults.output).as_deref(),
                merge_into.or(batch_defaults.merge_into).as_deref(),
                thresholds,
            )
            .await
        }
        Commands::Schema {
            ground_truth,
            prompt,
            ocr_text,
        } => schema_command(&ground_truth, prompt, ocr_text.as_deref()),
        Commands::Merge { into, snapshots } => merge_command(&into, &snapshots),
        Commands::Config {
            action: ConfigAction::Show,
        } => config_show(&thresholds),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn evaluate_command(
    ground_truth: &Path,
    prediction: &Path,
    csv: Option<&Path>,
    json: bool,
    thresholds: &EvaluationConfig,
) -> Result<()> {
    let gt = read_json(ground_truth)?;
    let pred_text = fs::read_to_string(prediction)
        .with_context(|| format!("Failed to read {}", prediction.display()))?;
    let pred = docbench_core::parse_model_reply(&pred_text).unwrap_or_else(|e| {
        warn!(error = %e, "Prediction is not valid JSON, scoring as absent");
        Value::Null
    });

    let result = Evaluator::new().evaluate_json(&gt, &pred);

    if let Some(path) = csv {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_csv(&field_rows(&result), file)?;
        info!(path = %path.display(), "Wrote CSV");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, thresholds);
    }
    Ok(())
}

fn print_result(result: &EvaluationResult, thresholds: &EvaluationConfig) {
    if let Some(error) = result.error() {
        eprintln!("{} {}", "Error:".red().bold(), error);
        return;
    }

    for row in field_rows(result) {
        let score = row.score.unwrap_or(0.0);
        let score_text = format!("{score:.4}");
        let score_text = if docbench_core::scoring::meets_threshold(score, thresholds.field_threshold)
        {
            score_text.green()
        } else {
            score_text.red()
        };
        println!(
            "{}  {}  gt={:?} llm={:?}",
            score_text,
            row.field.bold(),
            row.gt_text,
            row.llm_text
        );
    }

    let scored: Vec<f64> = result.scored().map(|(_, s)| s).collect();
    if !scored.is_empty() {
        let mean = scored.iter().sum::<f64>() / scored.len() as f64;
        println!("\n{} {} fields, mean score {:.4}", "Summary:".cyan().bold(), scored.len(), mean);
    }
}

/// Files in `dir` (non-recursive), sorted by name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn batch_command(
    documents: &Path,
    ground_truth: &Path,
    predictions: &Path,
    output: Option<&Path>,
    merge_into: Option<&Path>,
    thresholds: EvaluationConfig,
) -> Result<()> {
    let (images, skipped): (Vec<PathBuf>, Vec<PathBuf>) = list_files(documents)?
        .into_iter()
        .partition(|path| validate_document(path).is_ok());
    for path in &skipped {
        warn!(file = %path.display(), "Skipping non-JPG file");
    }
    if images.is_empty() {
        bail!("No JPG/JPEG documents found in {}", documents.display());
    }

    let truths: Vec<PathBuf> = list_files(ground_truth)?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();

    // Unpaired images and unreadable ground truth are reported, not fatal
    let mut jobs = Vec::with_capacity(images.len());
    let mut load_failures = Vec::new();
    for image in &images {
        let job = find_ground_truth(image, &truths).and_then(|gt| {
            DocumentJob::load(image, &gt).map_err(|e| {
                BenchError::InvalidInput(format!(
                    "Failed to load ground truth {}: {e}",
                    gt.display()
                ))
            })
        });
        match job {
            Ok(job) => jobs.push(job),
            Err(e) => {
                let file_name = image.file_name().map_or_else(
                    || image.display().to_string(),
                    |n| n.to_string_lossy().into_owned(),
                );
                warn!(file = %file_name, error = %e, "Skipping document");
                load_failures.push(BatchFailure {
                    file_name,
                    error: e.to_string(),
                });
            }
        }
    }

    let pipeline = Pipeline::new(ReplayExtractor::new(predictions));
    let mut session = match merge_into {
        Some(path) if path.exists() => {
            let existing = read_json(path)?;
            let Value::Object(snapshot) = existing else {
                bail!("{} does not hold a metrics object", path.display());
            };
            Session::with_aggregate(thresholds, snapshot)
        }
        _ => Session::new(thresholds),
    };

    let mut report = pipeline.run_batch(&mut session, &jobs).await;
    load_failures.append(&mut report.failures);
    report.failures = load_failures;

    for outcome in &report.outcomes {
        println!(
            "{} {} ({} fields, {:.2}s)",
            "✓".green().bold(),
            outcome.file_name,
            outcome.result.len(),
            outcome.processing_time
        );
    }
    for failure in &report.failures {
        println!("{} {}: {}", "✗".red().bold(), failure.file_name, failure.error);
    }

    let summary = MetricsSummary::from_state(session.aggregator.state());
    println!(
        "\n{} {} documents, {:.2}% average accuracy, {} LLM failures",
        "Summary:".cyan().bold(),
        summary.total_docs,
        summary.avg_accuracy_percent,
        summary.llm_failures
    );

    if let Some(dir) = output {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        for outcome in &report.outcomes {
            let stem = Path::new(&outcome.file_name)
                .file_stem()
                .map_or_else(|| outcome.file_name.clone(), |s| s.to_string_lossy().into_owned());
            let path = dir.join(format!("{stem}.csv"));
            let file = fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_csv(&field_rows(&outcome.result), file)?;
        }
        write_json(&dir.join("results.json"), &report)?;
        write_json(&dir.join("metrics.json"), &session.aggregator.state().to_snapshot())?;
        fs::write(dir.join("report.md"), render_summary(&summary, &session.outcomes))
            .with_context(|| format!("Failed to write report in {}", dir.display()))?;
        info!(dir = %dir.display(), "Wrote batch output");
    }

    if let Some(path) = merge_into {
        session.sync();
        write_json(path, &session.aggregate_snapshot)?;
        info!(path = %path.display(), "Merged batch metrics");
    }

    Ok(())
}

fn schema_command(ground_truth: &Path, prompt: bool, ocr_text: Option<&Path>) -> Result<()> {
    let schema = extract_schema(&read_json(ground_truth)?);
    if prompt {
        let ocr = ocr_text
            .map(|path| {
                fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
            })
            .transpose()?;
        print!("{}", build_extraction_prompt(&schema, ocr.as_deref()));
    } else {
        println!("{}", serde_json::to_string_pretty(&schema)?);
    }
    Ok(())
}

fn merge_command(into: &Path, snapshots: &[PathBuf]) -> Result<()> {
    let mut aggregate: Map<String, Value> = if into.exists() {
        match read_json(into)? {
            Value::Object(map) => map,
            _ => bail!("{} does not hold a metrics object", into.display()),
        }
    } else {
        Map::new()
    };

    for path in snapshots {
        match read_json(path)? {
            Value::Object(update) => merge_snapshot(&mut aggregate, &update),
            _ => bail!("{} does not hold a metrics object", path.display()),
        }
    }

    write_json(into, &aggregate)?;

    let state = MetricsState::from_snapshot(&aggregate)
        .with_context(|| format!("{} is not a valid metrics snapshot", into.display()))?;
    let summary = MetricsSummary::from_state(&state);
    println!(
        "{} {} documents, {:.2}% average accuracy",
        "Merged:".cyan().bold(),
        summary.total_docs,
        summary.avg_accuracy_percent
    );
    Ok(())
}

fn config_show(thresholds: &EvaluationConfig) -> Result<()> {
    println!("# Resolved from {CONFIG_FILE_NAME}, environment and flags");
    println!("[thresholds]");
    print!("{}", toml::to_string(thresholds)?);
    Ok(())
}

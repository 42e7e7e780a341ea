//! Cloud LLM Benchmark - latency, token and cost comparison for hosted LLM APIs
//!
//! Each provider gets a batch of sequential trials with the same prompt. Every
//! trial becomes a [`TrialResult`], the batch is folded into a [`BatchSummary`]
//! and written to a per-provider CSV, and the CSVs are finally merged into a
//! cross-provider summary.

pub mod config;
pub mod csv_report;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod summary;

pub use config::{BenchmarkFile, ConfigError, EnvSource, ProcessEnv, ProviderOverrides};
pub use csv_report::{read_provider_csv, write_provider_csv};
pub use metrics::{mean, summarize_batch};
pub use orchestrator::{run_benchmarks, BenchmarkPlan, ProviderJob};
pub use providers::{build_adapter, Invocation, InvocationError, ProviderAdapter, ProviderKind};
pub use summary::{print_comparison, summarize_providers, ProviderCsv, SummaryTable};

use anyhow::Result;
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{error, info, warn};

// ============================================================================
// Public Types
// ============================================================================

pub const DEFAULT_QUESTION: &str = "I'd like to compare hyperscalers to assess which one is the best choice for enterprise use, in about 600 words?";

/// Batch size and sampling parameters shared by every provider call
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of sequential trials per provider
    pub num_runs: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            num_runs: 5,
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

/// USD per 1K tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTable {
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
}

impl PriceTable {
    pub const fn new(input_price_per_1k: f64, output_price_per_1k: f64) -> Self {
        PriceTable {
            input_price_per_1k,
            output_price_per_1k,
        }
    }
}

/// Metrics for a single trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    /// 1-based position in the batch
    pub run_index: usize,
    pub elapsed_seconds: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub response_text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub cost_usd: f64,
    pub region: String,
    pub timestamp: DateTime<Local>,
    /// Set when the provider call failed; numeric fields are then zero
    pub error: Option<String>,
}

impl TrialResult {
    pub fn success(
        run_index: usize,
        invocation: Invocation,
        price: &PriceTable,
        region: &str,
        timestamp: DateTime<Local>,
    ) -> Self {
        let Invocation {
            text,
            prompt_tokens,
            completion_tokens,
            elapsed,
        } = invocation;

        TrialResult {
            run_index,
            elapsed_seconds: elapsed.as_secs_f64(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            char_count: metrics::char_count(&text),
            word_count: metrics::word_count(&text),
            cost_usd: metrics::cost(price, prompt_tokens, completion_tokens),
            response_text: text,
            region: region.to_string(),
            timestamp,
            error: None,
        }
    }

    /// Zeroed record that keeps the batch at full length
    pub fn failure(
        run_index: usize,
        region: &str,
        timestamp: DateTime<Local>,
        error: impl Into<String>,
    ) -> Self {
        TrialResult {
            run_index,
            elapsed_seconds: 0.0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            response_text: String::new(),
            char_count: 0,
            word_count: 0,
            cost_usd: 0.0,
            region: region.to_string(),
            timestamp,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn timestamp_iso(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// Local ISO-8601 with microseconds, e.g. `2025-06-01T14:03:07.123456`
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Averages of one provider's batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub provider_name: String,
    pub num_runs: usize,
    pub failed_trials: usize,
    pub avg_elapsed_seconds: f64,
    pub avg_prompt_tokens: f64,
    pub avg_completion_tokens: f64,
    pub avg_total_tokens: f64,
    pub avg_char_count: f64,
    pub avg_word_count: f64,
    pub avg_cost_usd: f64,
    /// Region of the last trial
    pub region: String,
    /// Timestamp of the last trial
    pub timestamp: String,
}

impl BatchSummary {
    pub fn successful_trials(&self) -> usize {
        self.num_runs - self.failed_trials
    }

    pub fn success_rate(&self) -> f64 {
        if self.num_runs == 0 {
            return 0.0;
        }
        self.successful_trials() as f64 / self.num_runs as f64 * 100.0
    }
}

// ============================================================================
// Trial Runner
// ============================================================================

fn trial_progress_bar(num_runs: usize) -> ProgressBar {
    let progress = ProgressBar::new(num_runs as u64);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        Ok(style) => progress.set_style(style.progress_chars("#>-")),
        Err(e) => warn!("Invalid progress bar template: {}", e),
    }
    progress
}

/// Run `config.num_runs` sequential trials of `prompt` against one adapter.
///
/// A failed call is logged and recorded as a zeroed trial, so the result always
/// holds exactly `num_runs` entries in run order.
pub async fn run_trials(
    adapter: &dyn ProviderAdapter,
    prompt: &str,
    config: &RunConfig,
) -> Vec<TrialResult> {
    let progress = trial_progress_bar(config.num_runs);
    progress.set_message(adapter.name().to_string());

    let price = adapter.price();
    let mut trials = Vec::with_capacity(config.num_runs);

    for run_index in 1..=config.num_runs {
        let outcome = adapter.invoke(prompt, config).await;
        let timestamp = Local::now();

        let trial = match outcome {
            Ok(invocation) => {
                TrialResult::success(run_index, invocation, &price, adapter.region(), timestamp)
            }
            Err(e) => {
                error!("Can't invoke '{}' (run {}): {}", adapter.name(), run_index, e);
                TrialResult::failure(run_index, adapter.region(), timestamp, e.to_string())
            }
        };

        progress.suspend(|| print_trial(&trial));
        progress.inc(1);
        trials.push(trial);
    }

    progress.finish_and_clear();
    trials
}

// ============================================================================
// Provider Pipeline
// ============================================================================

/// Trials, averages, CSV and console report for one provider.
///
/// Only a CSV write failure is an error; failed trials are part of the result.
pub async fn run_provider_pipeline(
    adapter: &dyn ProviderAdapter,
    prompt: &str,
    config: &RunConfig,
    csv_path: &Path,
) -> Result<BatchSummary> {
    info!(
        "Benchmarking {} ({}) with {} runs",
        adapter.name(),
        adapter.region(),
        config.num_runs
    );

    let trials = run_trials(adapter, prompt, config).await;
    let summary = summarize_batch(adapter.name(), &trials);

    if summary.failed_trials > 0 {
        warn!(
            "{}: {}/{} trials failed and are averaged in as zeros",
            summary.provider_name, summary.failed_trials, summary.num_runs
        );
    }

    write_provider_csv(csv_path, &trials, &summary)?;
    println!("Results written to {}", csv_path.display());

    print_batch_summary(&summary);
    Ok(summary)
}

// ============================================================================
// Results Display
// ============================================================================

pub fn print_trial(trial: &TrialResult) {
    println!("Run {}:", trial.run_index);
    match &trial.error {
        Some(e) => println!("ERROR: {}", e),
        None => println!("{}", trial.response_text),
    }
    println!("Response time: {:.2} seconds", trial.elapsed_seconds);
    println!("Prompt tokens: {}", trial.prompt_tokens);
    println!("Completion tokens: {}", trial.completion_tokens);
    println!("Total tokens: {}", trial.total_tokens);
    println!("Total cost: ${:.6}", trial.cost_usd);
    println!("Characters: {}", trial.char_count);
    println!("Words: {}", trial.word_count);
    println!("Region: {}", trial.region);
    println!("Timestamp: {}", trial.timestamp_iso());
    println!("{}", "-".repeat(40));
}

pub fn print_batch_summary(summary: &BatchSummary) {
    println!();
    println!("============ {} ============", summary.provider_name);
    println!("Averages over {} runs:", summary.num_runs);
    println!(
        "Average response time:                   {:.2} seconds",
        summary.avg_elapsed_seconds
    );
    println!(
        "Average prompt tokens:                   {:.2}",
        summary.avg_prompt_tokens
    );
    println!(
        "Average completion tokens:               {:.2}",
        summary.avg_completion_tokens
    );
    println!(
        "Average total tokens:                    {:.2}",
        summary.avg_total_tokens
    );
    println!(
        "Average characters:                      {:.2}",
        summary.avg_char_count
    );
    println!(
        "Average words:                           {:.2}",
        summary.avg_word_count
    );
    println!(
        "Average total cost:                      ${:.6}",
        summary.avg_cost_usd
    );

    if summary.failed_trials > 0 {
        println!(
            "Failed trials:                           {}/{} ⚠️",
            summary.failed_trials, summary.num_runs
        );
    } else {
        println!(
            "Failed trials:                           0/{}",
            summary.num_runs
        );
    }
    println!(
        "Success rate:                            {:.2}%",
        summary.success_rate()
    );
    println!("Region:                                  {}", summary.region);
    println!(
        "Timestamp:                               {}",
        summary.timestamp
    );
    println!("==================================================");
}

//! Per-provider CSV output
//!
//! Layout: a header, one row per trial, a blank separator line, then an
//! `Average` row in the same column order with an empty response cell.

use crate::{BatchSummary, TrialResult};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const PROVIDER_CSV_HEADER: [&str; 11] = [
    "Run",
    "Response Time (s)",
    "Prompt Tokens",
    "Completion Tokens",
    "Total Tokens",
    "Characters",
    "Words",
    "Cost (USD)",
    "Region",
    "Timestamp",
    "Response",
];

/// Label in the first cell of the averages row
pub const AVERAGE_LABEL: &str = "Average";

/// Flexible `\n`-terminated writer shared by every CSV this crate emits
pub(crate) fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

/// Create `path` (and its parent directories) for writing
pub(crate) fn create_output_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))
}

/// Keep a response on one CSV line
fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn trial_row(trial: &TrialResult) -> Vec<String> {
    vec![
        trial.run_index.to_string(),
        format!("{:.2}", trial.elapsed_seconds),
        trial.prompt_tokens.to_string(),
        trial.completion_tokens.to_string(),
        trial.total_tokens.to_string(),
        trial.char_count.to_string(),
        trial.word_count.to_string(),
        format!("{:.6}", trial.cost_usd),
        trial.region.clone(),
        trial.timestamp_iso(),
        single_line(&trial.response_text),
    ]
}

fn average_row(summary: &BatchSummary) -> Vec<String> {
    vec![
        AVERAGE_LABEL.to_string(),
        format!("{:.2}", summary.avg_elapsed_seconds),
        format!("{:.2}", summary.avg_prompt_tokens),
        format!("{:.2}", summary.avg_completion_tokens),
        format!("{:.2}", summary.avg_total_tokens),
        format!("{:.2}", summary.avg_char_count),
        format!("{:.2}", summary.avg_word_count),
        format!("{:.6}", summary.avg_cost_usd),
        summary.region.clone(),
        summary.timestamp.clone(),
        String::new(),
    ]
}

pub fn write_provider_csv_to<W: Write>(
    inner: W,
    trials: &[TrialResult],
    summary: &BatchSummary,
) -> Result<()> {
    let mut writer = csv_writer(inner);
    writer.write_record(PROVIDER_CSV_HEADER)?;
    for trial in trials {
        writer.write_record(trial_row(trial))?;
    }

    // the csv writer cannot emit an empty line, so write it on the inner writer
    let mut inner = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV rows: {}", e.error()))?;
    inner.write_all(b"\n")?;

    let mut writer = csv_writer(inner);
    writer.write_record(average_row(summary))?;
    writer.flush()?;
    Ok(())
}

/// Create or overwrite `path` with the trial rows and averages row
pub fn write_provider_csv(
    path: &Path,
    trials: &[TrialResult],
    summary: &BatchSummary,
) -> Result<()> {
    let file = create_output_file(path)?;
    write_provider_csv_to(file, trials, summary)
        .with_context(|| format!("Failed to write CSV: {}", path.display()))
}

/// Read every non-blank row of a CSV file
pub fn read_provider_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read CSV: {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// First row whose first cell is `average`, ignoring case and surrounding whitespace
pub fn find_average_row(rows: &[Vec<String>]) -> Option<&Vec<String>> {
    rows.iter().find(|row| {
        row.first()
            .is_some_and(|cell| cell.trim().eq_ignore_ascii_case(AVERAGE_LABEL))
    })
}

//! Cross-provider summary built from the per-provider CSV files

use crate::csv_report::{create_output_file, csv_writer, find_average_row, read_provider_csv};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SUMMARY_HEADER: [&str; 10] = [
    "Provider",
    "Average Response Time (s)",
    "Average Prompt Tokens",
    "Average Completion Tokens",
    "Average Total Tokens",
    "Average Characters",
    "Average Words",
    "Average Cost",
    "Region",
    "Timestamp",
];

pub const TRANSPOSED_METRICS: [&str; 9] = [
    "Avg. Response Time (s)",
    "Avg. Prompt Tokens",
    "Avg. Completion Tokens",
    "Avg. Total Tokens",
    "Avg. Characters",
    "Avg. Words",
    "Avg. Cost",
    "Region",
    "Timestamp",
];

pub const DEFAULT_SUMMARY_FILE: &str = "benchmark_summary.csv";
pub const DEFAULT_TRANSPOSED_FILE: &str = "benchmark_summary_transposed.csv";

/// A provider's output file to pick up
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCsv {
    pub name: String,
    pub path: PathBuf,
}

impl ProviderCsv {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ProviderCsv {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Why a provider was left out of the summary
#[derive(Debug, thiserror::Error)]
pub enum SummaryInputError {
    #[error("{0} not found")]
    Missing(PathBuf),
    #[error("no averages found in {0}")]
    NoAverages(PathBuf),
    #[error("unreadable CSV {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Averages row cells 1..=9 of a provider CSV, padded with empty strings
pub fn read_averages(path: &Path) -> Result<Vec<String>, SummaryInputError> {
    if !path.exists() {
        return Err(SummaryInputError::Missing(path.to_path_buf()));
    }

    let rows = read_provider_csv(path).map_err(|e| SummaryInputError::Unreadable {
        path: path.to_path_buf(),
        reason: format!("{:#}", e),
    })?;

    let row = find_average_row(&rows)
        .ok_or_else(|| SummaryInputError::NoAverages(path.to_path_buf()))?;

    Ok((1..=TRANSPOSED_METRICS.len())
        .map(|i| row.get(i).cloned().unwrap_or_default())
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub provider: String,
    /// One cell per entry of [`TRANSPOSED_METRICS`]
    pub values: Vec<String>,
}

/// One row per provider that produced an averages row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryTable {
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    /// Collect averages from each input; unusable inputs are skipped with a warning
    pub fn collect(inputs: &[ProviderCsv]) -> Self {
        let mut rows = Vec::new();
        for input in inputs {
            match read_averages(&input.path) {
                Ok(values) => rows.push(SummaryRow {
                    provider: input.name.clone(),
                    values,
                }),
                Err(e) => {
                    warn!("Skipping {} in summary: {}", input.name, e);
                    println!("Warning: {}, skipping {}.", e, input.name);
                }
            }
        }
        SummaryTable { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.provider.as_str()).collect()
    }

    /// Header row followed by one row per provider
    pub fn summary_rows(&self) -> Vec<Vec<String>> {
        let mut out = vec![SUMMARY_HEADER.iter().map(|s| s.to_string()).collect()];
        for row in &self.rows {
            let mut line = Vec::with_capacity(SUMMARY_HEADER.len());
            line.push(row.provider.clone());
            line.extend(row.values.iter().cloned());
            out.push(line);
        }
        out
    }

    /// `Metric` + provider names, then one row per metric
    pub fn transposed_rows(&self) -> Vec<Vec<String>> {
        let mut header = vec!["Metric".to_string()];
        header.extend(self.rows.iter().map(|r| r.provider.clone()));

        let mut out = vec![header];
        for (i, metric) in TRANSPOSED_METRICS.iter().enumerate() {
            let mut line = vec![metric.to_string()];
            line.extend(
                self.rows
                    .iter()
                    .map(|r| r.values.get(i).cloned().unwrap_or_default()),
            );
            out.push(line);
        }
        out
    }

    /// Numeric value of metric `index` per provider; unparsable cells become 0
    pub fn metric_values(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| {
                r.values
                    .get(index)
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .unwrap_or(0.0)
            })
            .collect()
    }
}

fn write_rows(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let file = create_output_file(path)?;
    let mut writer = csv_writer(file);
    for row in rows {
        writer
            .write_record(row)
            .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
    Ok(())
}

/// Build the summary from `inputs` and write both the summary and its transposed view
pub fn summarize_providers(
    inputs: &[ProviderCsv],
    summary_path: &Path,
    transposed_path: &Path,
) -> Result<SummaryTable> {
    let table = SummaryTable::collect(inputs);
    if table.is_empty() {
        warn!("No provider averages found, summary files will only contain headers");
    }

    write_rows(summary_path, &table.summary_rows())?;
    println!("\nSummary written to {}", summary_path.display());
    info!("Summary written to {}", summary_path.display());

    write_rows(transposed_path, &table.transposed_rows())?;
    println!(
        "\nTransposed summary written to {}",
        transposed_path.display()
    );
    info!("Transposed summary written to {}", transposed_path.display());

    Ok(table)
}

// ============================================================================
// Comparison Display
// ============================================================================

fn find_winner(values: &[f64], lower_is_better: bool) -> Option<usize> {
    if values.iter().all(|&v| v == 0.0) {
        return None;
    }
    let candidates = values.iter().enumerate().filter(|(_, v)| **v > 0.0);
    if lower_is_better {
        candidates
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    } else {
        candidates
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }
}

/// Side-by-side table of every provider's averages with a winner per metric
pub fn print_comparison(table: &SummaryTable) {
    if table.rows.len() < 2 {
        if table.rows.len() == 1 {
            println!("\n(Need at least 2 providers to show comparison)");
        }
        return;
    }

    let names = table.provider_names();
    let separator = "=".repeat(100);
    let col_width = 20;
    let metric_width = 28;

    println!("\n{}", separator);
    println!("Comparison: {}", names.join(" vs "));
    println!("{}", separator);

    print!("{:<width$}", "Metric", width = metric_width);
    for name in &names {
        print!(" | {:<width$}", name, width = col_width);
    }
    println!(" | Winner");

    let total_width = metric_width + (col_width + 3) * names.len() + 10;
    println!("{}", "-".repeat(total_width));

    // (metric index, lower is better); None means informational only
    let rules: [(usize, Option<bool>); 7] = [
        (0, Some(true)),
        (1, None),
        (2, None),
        (3, None),
        (4, None),
        (5, None),
        (6, Some(true)),
    ];

    for (index, lower_is_better) in rules {
        let values = table.metric_values(index);
        print!("{:<width$}", TRANSPOSED_METRICS[index], width = metric_width);
        for row in &table.rows {
            let cell = row.values.get(index).map(String::as_str).unwrap_or("");
            print!(" | {:<width$}", cell, width = col_width);
        }
        match lower_is_better.and_then(|lower| find_winner(&values, lower)) {
            Some(idx) => println!(" | {}", names[idx]),
            None => println!(" | -"),
        }
    }

    println!("\n{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_winner() {
        assert_eq!(find_winner(&[3.0, 1.5, 2.0], true), Some(1));
        assert_eq!(find_winner(&[3.0, 1.5, 2.0], false), Some(0));
        // zero means the provider produced nothing, not that it was fastest
        assert_eq!(find_winner(&[0.0, 4.0, 2.0], true), Some(2));
        assert_eq!(find_winner(&[0.0, 0.0], true), None);
    }

    #[test]
    fn test_transposed_pads_short_rows() {
        let table = SummaryTable {
            rows: vec![
                SummaryRow {
                    provider: "A".to_string(),
                    values: vec!["1.00".to_string(), "2.00".to_string()],
                },
                SummaryRow {
                    provider: "B".to_string(),
                    values: (0..9).map(|i| i.to_string()).collect(),
                },
            ],
        };
        let rows = table.transposed_rows();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0], vec!["Metric", "A", "B"]);
        assert_eq!(rows[1], vec!["Avg. Response Time (s)", "1.00", "0"]);
        assert_eq!(rows[9], vec!["Timestamp", "", "8"]);
        assert_eq!(table.metric_values(0), vec![1.0, 0.0]);
        assert_eq!(table.metric_values(8), vec![0.0, 8.0]);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        assert!(matches!(
            read_averages(&path),
            Err(SummaryInputError::Missing(_))
        ));
    }

    #[test]
    fn test_read_averages_pads_short_average_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        std::fs::write(&path, "Run,Response Time (s)\n1,0.50\n\naverage ,0.50,3\n").unwrap();
        let values = read_averages(&path).unwrap();
        assert_eq!(values.len(), 9);
        assert_eq!(values[0], "0.50");
        assert_eq!(values[1], "3");
        assert!(values[2..].iter().all(String::is_empty));
    }
}

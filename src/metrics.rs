//! Per-trial derived metrics and batch averages
//!
//! Averages are plain arithmetic means over every trial in the batch, failed
//! trials included. A failure therefore pulls latency, token and cost averages
//! down; [`BatchSummary::failed_trials`] reports it separately.

use crate::{BatchSummary, PriceTable, TrialResult};

/// Number of Unicode scalar values
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// Number of whitespace-delimited words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// USD cost of one call
pub fn cost(price: &PriceTable, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    (prompt_tokens as f64 / 1000.0) * price.input_price_per_1k
        + (completion_tokens as f64 / 1000.0) * price.output_price_per_1k
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn column_mean<F>(trials: &[TrialResult], column: F) -> f64
where
    F: Fn(&TrialResult) -> f64,
{
    let values: Vec<f64> = trials.iter().map(column).collect();
    mean(&values)
}

/// Fold a completed batch into its averages row.
///
/// Region and timestamp are taken from the last trial, not aggregated.
pub fn summarize_batch(provider_name: &str, trials: &[TrialResult]) -> BatchSummary {
    let (region, timestamp) = trials
        .last()
        .map(|t| (t.region.clone(), t.timestamp_iso()))
        .unwrap_or_default();

    BatchSummary {
        provider_name: provider_name.to_string(),
        num_runs: trials.len(),
        failed_trials: trials.iter().filter(|t| !t.succeeded()).count(),
        avg_elapsed_seconds: column_mean(trials, |t| t.elapsed_seconds),
        avg_prompt_tokens: column_mean(trials, |t| t.prompt_tokens as f64),
        avg_completion_tokens: column_mean(trials, |t| t.completion_tokens as f64),
        avg_total_tokens: column_mean(trials, |t| t.total_tokens as f64),
        avg_char_count: column_mean(trials, |t| t.char_count as f64),
        avg_word_count: column_mean(trials, |t| t.word_count as f64),
        avg_cost_usd: column_mean(trials, |t| t.cost_usd),
        region,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Invocation;
    use chrono::{Local, TimeZone};
    use std::time::Duration;

    const CLAUDE: PriceTable = PriceTable::new(0.003, 0.015);

    fn ok_trial(run_index: usize, prompt: u32, completion: u32, text: &str) -> TrialResult {
        let timestamp = Local.with_ymd_and_hms(2025, 6, 1, 12, 0, run_index as u32).unwrap();
        TrialResult::success(
            run_index,
            Invocation {
                text: text.to_string(),
                prompt_tokens: prompt,
                completion_tokens: completion,
                elapsed: Duration::from_millis(1500),
            },
            &CLAUDE,
            "us-east-1",
            timestamp,
        )
    }

    #[test]
    fn test_counts() {
        assert_eq!(char_count(""), 0);
        assert_eq!(char_count("héllo"), 5);
        assert_eq!(word_count("  one two\nthree\tfour  "), 4);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_cost_is_linear() {
        assert!((cost(&CLAUDE, 10, 20) - 0.00033).abs() < 1e-12);
        assert_eq!(cost(&CLAUDE, 0, 0), 0.0);
        let single = cost(&CLAUDE, 1000, 1000);
        assert!((cost(&CLAUDE, 2000, 2000) - 2.0 * single).abs() < 1e-12);
        assert!((single - 0.018).abs() < 1e-12);
    }

    #[test]
    fn test_total_tokens_invariant() {
        let trial = ok_trial(1, 123, 456, "text");
        assert_eq!(trial.total_tokens, trial.prompt_tokens + trial.completion_tokens);
    }

    #[test]
    fn test_failed_trials_pull_average_down() {
        let failed_at = Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 2).unwrap();
        let trials = vec![
            ok_trial(1, 10, 20, "alpha beta"),
            TrialResult::failure(2, "us-east-1", failed_at, "network error"),
            ok_trial(3, 15, 25, "gamma delta epsilon"),
        ];

        let summary = summarize_batch("AWS Bedrock Claude", &trials);
        assert_eq!(summary.num_runs, 3);
        assert_eq!(summary.failed_trials, 1);
        assert!((summary.avg_total_tokens - 70.0 / 3.0).abs() < 1e-9);
        assert!((summary.avg_prompt_tokens - 25.0 / 3.0).abs() < 1e-9);
        assert!((summary.avg_word_count - 5.0 / 3.0).abs() < 1e-9);
        assert!((summary.avg_elapsed_seconds - 1.0).abs() < 1e-9);
        assert!((summary.success_rate() - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(format!("{:.2}", summary.avg_total_tokens), "23.33");
    }

    #[test]
    fn test_region_and_timestamp_come_from_last_trial() {
        let trials = vec![ok_trial(1, 1, 1, "a"), ok_trial(2, 1, 1, "b")];
        let summary = summarize_batch("p", &trials);
        assert_eq!(summary.region, "us-east-1");
        assert_eq!(summary.timestamp, trials[1].timestamp_iso());
        assert_eq!(summary.timestamp, "2025-06-01T12:00:02.000000");
    }

    #[test]
    fn test_empty_batch() {
        let summary = summarize_batch("p", &[]);
        assert_eq!(summary.num_runs, 0);
        assert_eq!(summary.avg_cost_usd, 0.0);
        assert_eq!(summary.success_rate(), 0.0);
        assert!(summary.region.is_empty());
    }
}

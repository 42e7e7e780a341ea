//! Trial runner and provider pipeline against a scripted adapter

use async_trait::async_trait;
use cloud_llm_benchmark::csv_report::find_average_row;
use cloud_llm_benchmark::{
    read_provider_csv, run_provider_pipeline, run_trials, Invocation, InvocationError,
    PriceTable, ProviderAdapter, RunConfig,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Replays a fixed list of outcomes, one per call
struct ScriptedAdapter {
    outcomes: Mutex<VecDeque<Result<Invocation, InvocationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    fn new(outcomes: Vec<Result<Invocation, InvocationError>>) -> Self {
        ScriptedAdapter {
            outcomes: Mutex::new(outcomes.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn region(&self) -> &str {
        "test-region-1"
    }

    fn price(&self) -> PriceTable {
        PriceTable::new(0.003, 0.015)
    }

    async fn invoke(
        &self,
        prompt: &str,
        _config: &RunConfig,
    ) -> Result<Invocation, InvocationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(InvocationError::Network("script exhausted".to_string())))
    }
}

fn ok(text: &str, prompt_tokens: u32, completion_tokens: u32, millis: u64) -> Result<Invocation, InvocationError> {
    Ok(Invocation {
        text: text.to_string(),
        prompt_tokens,
        completion_tokens,
        elapsed: Duration::from_millis(millis),
    })
}

fn config(num_runs: usize) -> RunConfig {
    RunConfig {
        num_runs,
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn test_batch_keeps_full_length_under_failures() {
    let adapter = ScriptedAdapter::new(vec![
        Err(InvocationError::Auth {
            status: 401,
            message: "bad key".to_string(),
        }),
        ok("fine", 5, 5, 100),
        Err(InvocationError::Provider {
            status: 500,
            message: "boom".to_string(),
        }),
    ]);

    let trials = run_trials(&adapter, "hello", &config(4)).await;

    assert_eq!(trials.len(), 4);
    let indices: Vec<usize> = trials.iter().map(|t| t.run_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert!(!trials[0].succeeded());
    assert!(trials[1].succeeded());
    assert!(!trials[2].succeeded());
    // ran out of scripted outcomes
    assert!(!trials[3].succeeded());

    for trial in &trials {
        assert_eq!(
            trial.total_tokens,
            trial.prompt_tokens + trial.completion_tokens
        );
        assert_eq!(trial.region, "test-region-1");
    }
    assert!(trials[0].response_text.is_empty());
    assert_eq!(trials[0].cost_usd, 0.0);
    assert!(trials[0].error.as_deref().unwrap().contains("401"));
    assert!(trials.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let prompts = adapter.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 4);
    assert!(prompts.iter().all(|p| p == "hello"));
}

#[tokio::test]
async fn test_pipeline_averages_include_failed_trials() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("scripted.csv");
    let adapter = ScriptedAdapter::new(vec![
        ok("alpha beta", 10, 20, 1500),
        Err(InvocationError::Network("connection reset".to_string())),
        ok("gamma delta epsilon", 15, 25, 1500),
    ]);

    let summary = run_provider_pipeline(&adapter, "q", &config(3), &csv_path)
        .await
        .unwrap();

    assert_eq!(summary.provider_name, "Scripted");
    assert_eq!(summary.num_runs, 3);
    assert_eq!(summary.failed_trials, 1);
    assert!((summary.avg_total_tokens - 70.0 / 3.0).abs() < 1e-9);
    assert!((summary.avg_elapsed_seconds - 1.0).abs() < 1e-9);
    assert_eq!(summary.region, "test-region-1");

    let rows = read_provider_csv(&csv_path).unwrap();
    // header + 3 trials + average
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0][0], "Run");
    assert_eq!(rows[2][0], "2");
    assert_eq!(rows[2][1], "0.00");

    let average = find_average_row(&rows).unwrap();
    assert_eq!(average[0], "Average");
    assert_eq!(average[1], "1.00");
    assert_eq!(average[4], "23.33");
    assert_eq!(average[8], "test-region-1");
    assert_eq!(average[9], summary.timestamp);
    assert_eq!(average[10], "");
}

#[tokio::test]
async fn test_pipeline_reports_unwritable_csv() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the file should be
    let csv_path = dir.path().join("taken");
    std::fs::create_dir(&csv_path).unwrap();

    let adapter = ScriptedAdapter::new(vec![ok("x", 1, 1, 10)]);
    let err = run_provider_pipeline(&adapter, "q", &config(1), &csv_path)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("taken"));
}

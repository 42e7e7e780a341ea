//! Sequential multi-provider benchmark run
//!
//! Each provider pipeline runs on its own, either in this process or as a child
//! `run` invocation of the current binary. A failing pipeline is reported and
//! skipped; the summary is built from whatever CSV files exist afterwards.

use crate::config::{BenchmarkFile, EnvSource};
use crate::providers::{build_adapter, ProviderKind};
use crate::summary::{
    summarize_providers, ProviderCsv, SummaryTable, DEFAULT_SUMMARY_FILE, DEFAULT_TRANSPOSED_FILE,
};
use crate::{run_provider_pipeline, RunConfig};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// One provider pipeline and where it writes
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderJob {
    pub kind: ProviderKind,
    pub name: String,
    pub csv_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BenchmarkPlan {
    pub question: String,
    pub run_config: RunConfig,
    /// Pipelines in execution order
    pub jobs: Vec<ProviderJob>,
    pub summary_path: PathBuf,
    pub transposed_path: PathBuf,
    /// Run every pipeline as a child process
    pub isolate: bool,
    /// Benchmark file forwarded to child processes
    pub config_path: Option<PathBuf>,
    /// Forward `--verbose` to child processes
    pub verbose: bool,
}

impl BenchmarkPlan {
    /// Jobs for `kinds` in the given order, writing into `output_dir`
    pub fn new(
        question: impl Into<String>,
        run_config: RunConfig,
        output_dir: &Path,
        kinds: &[ProviderKind],
        file: &BenchmarkFile,
    ) -> Self {
        let jobs = kinds
            .iter()
            .map(|&kind| ProviderJob {
                kind,
                name: file.provider_name(kind),
                csv_path: file.csv_path(kind, output_dir),
            })
            .collect();

        BenchmarkPlan {
            question: question.into(),
            run_config,
            jobs,
            summary_path: output_dir.join(DEFAULT_SUMMARY_FILE),
            transposed_path: output_dir.join(DEFAULT_TRANSPOSED_FILE),
            isolate: false,
            config_path: None,
            verbose: false,
        }
    }

    pub fn summary_inputs(&self) -> Vec<ProviderCsv> {
        self.jobs
            .iter()
            .map(|job| ProviderCsv::new(job.name.clone(), job.csv_path.clone()))
            .collect()
    }

    /// Arguments for the child `run` invocation of `job`
    fn child_args(&self, job: &ProviderJob) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            job.kind.as_str().to_string(),
            "--question".to_string(),
            self.question.clone(),
            "--csv".to_string(),
            job.csv_path.display().to_string(),
            "--num-runs".to_string(),
            self.run_config.num_runs.to_string(),
            "--temperature".to_string(),
            self.run_config.temperature.to_string(),
            "--top-p".to_string(),
            self.run_config.top_p.to_string(),
        ];
        if let Some(config_path) = &self.config_path {
            args.push("--config".to_string());
            args.push(config_path.display().to_string());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

async fn run_in_process(
    plan: &BenchmarkPlan,
    job: &ProviderJob,
    file: &BenchmarkFile,
    env: &dyn EnvSource,
) -> Result<()> {
    let adapter = build_adapter(job.kind, file.overrides(job.kind), env)
        .await
        .with_context(|| format!("Can't set up {}", job.name))?;
    run_provider_pipeline(adapter.as_ref(), &plan.question, &plan.run_config, &job.csv_path)
        .await?;
    Ok(())
}

async fn run_isolated(plan: &BenchmarkPlan, job: &ProviderJob) -> Result<()> {
    let exe = std::env::current_exe().context("Can't locate the current executable")?;
    let args = plan.child_args(job);
    info!("Spawning {} {}", exe.display(), args.join(" "));

    let status = tokio::process::Command::new(&exe)
        .args(&args)
        .status()
        .await
        .with_context(|| format!("Failed to spawn {}", exe.display()))?;

    if !status.success() {
        bail!("{} pipeline exited with {}", job.name, status);
    }
    Ok(())
}

/// Run every job in order, then summarize the CSV files that were produced
pub async fn run_benchmarks(
    plan: &BenchmarkPlan,
    file: &BenchmarkFile,
    env: &dyn EnvSource,
) -> Result<SummaryTable> {
    let start_time = Instant::now();

    for job in &plan.jobs {
        println!("\n=== Running {} Benchmark ===", job.name);
        let outcome = if plan.isolate {
            run_isolated(plan, job).await
        } else {
            run_in_process(plan, job, file, env).await
        };

        if let Err(e) = outcome {
            error!("{} benchmark failed: {:#}", job.name, e);
            println!("Error running {} benchmark: {:#}", job.name, e);
        }
    }

    println!(
        "\nAll benchmarks completed in {:.2} seconds.",
        start_time.elapsed().as_secs_f64()
    );

    summarize_providers(
        &plan.summary_inputs(),
        &plan.summary_path,
        &plan.transposed_path,
    )
}

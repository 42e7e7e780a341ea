use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use cloud_llm_benchmark::config::load_benchmark_file;
use cloud_llm_benchmark::{
    build_adapter, print_comparison, run_benchmarks, run_provider_pipeline, summarize_providers,
    BenchmarkFile, BenchmarkPlan, ProcessEnv, ProviderKind, RunConfig, DEFAULT_QUESTION,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cloud-llm-benchmark")]
#[command(about = "Latency, token and cost benchmark for Azure OpenAI, Vertex AI and Bedrock")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Sampling temperature sent to every provider
    #[arg(long, default_value = "1.0", global = true)]
    temperature: f32,

    /// Nucleus sampling parameter sent to every provider
    #[arg(long, default_value = "1.0", global = true)]
    top_p: f32,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug, Default)]
struct AllArgs {
    /// Prompt sent to every provider
    #[arg(long, short)]
    question: Option<String>,

    /// Trials per provider (default: 5)
    #[arg(long, short)]
    num_runs: Option<usize>,

    /// Directory for the provider CSVs and the summaries (default: current directory)
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// YAML benchmark file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run each provider in its own child process
    #[arg(long)]
    isolate: bool,

    /// Providers to run, in order (default: azure,vertex,bedrock)
    #[arg(long, value_enum, value_delimiter = ',')]
    providers: Vec<ProviderKind>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Benchmark every provider, then write the summaries (default)
    All(AllArgs),
    /// Benchmark a single provider
    Run {
        #[arg(value_enum)]
        provider: ProviderKind,

        /// Prompt to send
        #[arg(long, short)]
        question: Option<String>,

        /// Output CSV (default: the provider's default filename)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Number of trials (default: 5)
        #[arg(long, short)]
        num_runs: Option<usize>,

        /// YAML benchmark file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Summarize existing provider CSVs
    Summarize {
        /// Directory holding the provider CSVs
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// YAML benchmark file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

fn load_file(path: Option<&Path>) -> Result<BenchmarkFile> {
    match path {
        Some(path) => Ok(load_benchmark_file(path, &ProcessEnv)?),
        None => Ok(BenchmarkFile::default()),
    }
}

fn run_config(args: &Args, cli_runs: Option<usize>, file: &BenchmarkFile) -> Result<RunConfig> {
    let num_runs = cli_runs
        .or(file.num_runs)
        .unwrap_or(RunConfig::default().num_runs);
    if num_runs == 0 {
        bail!("--num-runs must be at least 1");
    }
    Ok(RunConfig {
        num_runs,
        temperature: args.temperature,
        top_p: args.top_p,
    })
}

fn question(cli: Option<String>, file: &BenchmarkFile) -> String {
    cli.or_else(|| file.question.clone())
        .unwrap_or_else(|| DEFAULT_QUESTION.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    // Use RUST_LOG env var if set, otherwise use --verbose flag or default to "warn"
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "debug".to_string()
        } else {
            "warn".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&filter).init();

    let command = args
        .command
        .take()
        .unwrap_or_else(|| Commands::All(AllArgs::default()));

    match command {
        Commands::All(all) => {
            let file = load_file(all.config.as_deref())?;
            let run_config = run_config(&args, all.num_runs, &file)?;
            let kinds = if all.providers.is_empty() {
                ProviderKind::ALL.to_vec()
            } else {
                all.providers.clone()
            };
            let output_dir = all.output_dir.unwrap_or_default();

            let mut plan = BenchmarkPlan::new(
                question(all.question, &file),
                run_config,
                &output_dir,
                &kinds,
                &file,
            );
            plan.isolate = all.isolate;
            plan.config_path = all.config;
            plan.verbose = args.verbose;

            info!(
                "Running {} providers with {} trials each",
                plan.jobs.len(),
                plan.run_config.num_runs
            );
            let table = run_benchmarks(&plan, &file, &ProcessEnv).await?;
            print_comparison(&table);
        }
        Commands::Run {
            provider,
            question: cli_question,
            csv,
            num_runs,
            config,
        } => {
            let file = load_file(config.as_deref())?;
            let run_config = run_config(&args, num_runs, &file)?;
            let csv_path = csv.unwrap_or_else(|| file.csv_path(provider, Path::new("")));

            let adapter = build_adapter(provider, file.overrides(provider), &ProcessEnv).await?;
            run_provider_pipeline(
                adapter.as_ref(),
                &question(cli_question, &file),
                &run_config,
                &csv_path,
            )
            .await?;
        }
        Commands::Summarize { output_dir, config } => {
            let file = load_file(config.as_deref())?;
            let output_dir = output_dir.unwrap_or_default();
            let plan = BenchmarkPlan::new(
                String::new(),
                RunConfig::default(),
                &output_dir,
                &ProviderKind::ALL,
                &file,
            );
            let table = summarize_providers(
                &plan.summary_inputs(),
                &plan.summary_path,
                &plan.transposed_path,
            )?;
            print_comparison(&table);
        }
    }

    Ok(())
}

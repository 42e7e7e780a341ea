//! Environment and benchmark-file configuration
//!
//! Provider credentials and endpoints come from environment variables. An
//! optional YAML benchmark file can override the question, the trial count and
//! per-provider model, pricing and output settings; `${VAR}` references inside
//! it are expanded from the same environment.

use crate::providers::ProviderKind;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is a valid regex")
});

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set.")]
    MissingVar(String),
    #[error("Missing required environment variables: {}", .0.join(", "))]
    UnresolvedVars(Vec<String>),
    #[error("failed to obtain credentials: {0}")]
    Credentials(String),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Source of environment variables
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Look up a variable, treating empty values as unset
pub fn optional_var(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|v| !v.trim().is_empty())
}

pub fn required_var(env: &dyn EnvSource, key: &str) -> Result<String, ConfigError> {
    optional_var(env, key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

/// Per-provider overrides from the benchmark file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverrides {
    /// Display name in console output and the summary
    #[serde(default)]
    pub name: Option<String>,
    /// Model, deployment-independent (Bedrock model id, Gemini model name)
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub input_price_per_1k: Option<f64>,
    #[serde(default)]
    pub output_price_per_1k: Option<f64>,
    /// Output CSV filename, relative to the output directory
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl ProviderOverrides {
    fn expand(&mut self, env: &dyn EnvSource) -> Result<(), ConfigError> {
        for field in [
            &mut self.name,
            &mut self.model,
            &mut self.csv,
            &mut self.region,
        ] {
            if let Some(value) = field.as_mut() {
                *value = expand_env_vars(value, env)?;
            }
        }
        Ok(())
    }
}

/// Optional YAML benchmark file
///
/// ```yaml
/// question: "Summarize the history of the internet"
/// num_runs: 3
/// providers:
///   bedrock:
///     model: anthropic.claude-3-haiku-20240307-v1:0
///     input_price_per_1k: 0.00025
///     output_price_per_1k: 0.00125
///   vertex:
///     region: ${GOOGLE_CLOUD_LOCATION}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BenchmarkFile {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub num_runs: Option<usize>,
    #[serde(default)]
    pub providers: HashMap<ProviderKind, ProviderOverrides>,
}

impl BenchmarkFile {
    pub fn overrides(&self, kind: ProviderKind) -> Option<&ProviderOverrides> {
        self.providers.get(&kind)
    }

    pub fn provider_name(&self, kind: ProviderKind) -> String {
        crate::providers::resolve_name(kind, self.overrides(kind))
    }

    /// Output CSV for `kind` inside `output_dir`
    pub fn csv_path(&self, kind: ProviderKind, output_dir: &Path) -> PathBuf {
        let file = self
            .overrides(kind)
            .and_then(|o| o.csv.clone())
            .unwrap_or_else(|| kind.default_csv().to_string());
        output_dir.join(file)
    }
}

/// Replace `${VAR_NAME}` with the variable's value; every unresolved name is reported.
pub fn expand_env_vars(s: &str, env: &dyn EnvSource) -> Result<String, ConfigError> {
    let mut missing_vars = Vec::new();

    let expanded = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let name = &caps[1];
        match optional_var(env, name) {
            Some(value) => value,
            None => {
                missing_vars.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing_vars.is_empty() {
        return Err(ConfigError::UnresolvedVars(missing_vars));
    }

    Ok(expanded.into_owned())
}

pub fn parse_benchmark_file(
    content: &str,
    path: &str,
    env: &dyn EnvSource,
) -> Result<BenchmarkFile, ConfigError> {
    let mut file: BenchmarkFile =
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;

    if let Some(question) = file.question.as_mut() {
        *question = expand_env_vars(question, env)?;
    }
    if file.num_runs == Some(0) {
        return Err(ConfigError::Invalid {
            name: "num_runs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    for overrides in file.providers.values_mut() {
        overrides.expand(env)?;
    }

    Ok(file)
}

pub fn load_benchmark_file(
    path: &Path,
    env: &dyn EnvSource,
) -> Result<BenchmarkFile, ConfigError> {
    let shown = path.display().to_string();
    info!("Loading benchmark config from: {}", shown);
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: shown.clone(),
        source,
    })?;
    parse_benchmark_file(&content, &shown, env)
}

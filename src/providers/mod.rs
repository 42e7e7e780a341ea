//! Provider adapters
//!
//! Every cloud API is wrapped behind [`ProviderAdapter`], which turns one prompt
//! into an [`Invocation`]: the response text, the token usage and the wall-clock
//! time of the call. Vendor response shapes (nested JSON, SSE chunks) never leave
//! this module, so the trial runner and everything downstream stay provider-agnostic.

pub mod azure;
pub mod bedrock;
pub mod sigv4;
pub mod vertex;

use crate::config::{ConfigError, EnvSource, ProviderOverrides};
use crate::{PriceTable, RunConfig};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub use azure::AzureOpenAiAdapter;
pub use bedrock::BedrockClaudeAdapter;
pub use vertex::VertexGeminiAdapter;

/// Normalized result of a single provider call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Time from dispatch until the full response (all chunks) was received
    pub elapsed: Duration,
}

/// Why a single provider call failed
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("failed to sign request: {0}")]
    Signing(String),
}

impl InvocationError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        } else {
            body
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InvocationError::Auth {
                status: status.as_u16(),
                message,
            },
            _ => InvocationError::Provider {
                status: status.as_u16(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for InvocationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InvocationError::Decode(err.to_string())
        } else {
            InvocationError::Network(err.to_string())
        }
    }
}

/// Uniform contract over a vendor text-generation API
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Display name used in console output and summary tables
    fn name(&self) -> &str;

    /// Region or location the requests are served from
    fn region(&self) -> &str;

    /// Static token pricing for the configured model
    fn price(&self) -> PriceTable;

    /// Send `prompt` once and wait for the complete response
    async fn invoke(&self, prompt: &str, config: &RunConfig)
        -> Result<Invocation, InvocationError>;
}

/// Supported cloud providers, in default benchmark order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Azure,
    Vertex,
    Bedrock,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Azure,
        ProviderKind::Vertex,
        ProviderKind::Bedrock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "azure",
            ProviderKind::Vertex => "vertex",
            ProviderKind::Bedrock => "bedrock",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "Azure OpenAI",
            ProviderKind::Vertex => "GCP Vertex AI",
            ProviderKind::Bedrock => "AWS Bedrock Claude",
        }
    }

    pub fn default_csv(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "openai_results.csv",
            ProviderKind::Vertex => "vertexai_results.csv",
            ProviderKind::Bedrock => "bedrock_claude_results.csv",
        }
    }

    pub fn default_price(&self) -> PriceTable {
        match self {
            ProviderKind::Azure => azure::DEFAULT_PRICE,
            ProviderKind::Vertex => vertex::DEFAULT_PRICE,
            ProviderKind::Bedrock => bedrock::DEFAULT_PRICE,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve settings for `kind` from the environment and build its adapter.
///
/// Fails before any request is made when a required variable is missing.
pub async fn build_adapter(
    kind: ProviderKind,
    overrides: Option<&ProviderOverrides>,
    env: &dyn EnvSource,
) -> Result<Box<dyn ProviderAdapter>, ConfigError> {
    debug!("Building {} adapter", kind);
    let adapter: Box<dyn ProviderAdapter> = match kind {
        ProviderKind::Azure => {
            let settings = azure::AzureSettings::from_env(env, overrides)?;
            Box::new(AzureOpenAiAdapter::new(settings)?)
        }
        ProviderKind::Vertex => {
            let settings = vertex::VertexSettings::from_env(env, overrides).await?;
            Box::new(VertexGeminiAdapter::new(settings)?)
        }
        ProviderKind::Bedrock => {
            let settings = bedrock::BedrockSettings::from_env(env, overrides)?;
            Box::new(BedrockClaudeAdapter::new(settings)?)
        }
    };
    Ok(adapter)
}

/// No request timeout is set: a slow provider call is part of what gets measured.
fn build_http_client() -> Result<Client, ConfigError> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Price from overrides, falling back to the provider default per field
fn resolve_price(kind: ProviderKind, overrides: Option<&ProviderOverrides>) -> PriceTable {
    let default = kind.default_price();
    PriceTable {
        input_price_per_1k: overrides
            .and_then(|o| o.input_price_per_1k)
            .unwrap_or(default.input_price_per_1k),
        output_price_per_1k: overrides
            .and_then(|o| o.output_price_per_1k)
            .unwrap_or(default.output_price_per_1k),
    }
}

pub(crate) fn resolve_name(kind: ProviderKind, overrides: Option<&ProviderOverrides>) -> String {
    overrides
        .and_then(|o| o.name.clone())
        .unwrap_or_else(|| kind.display_name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = InvocationError::from_status(StatusCode::UNAUTHORIZED, "bad key".to_string());
        assert!(matches!(err, InvocationError::Auth { status: 401, .. }));

        let err = InvocationError::from_status(StatusCode::FORBIDDEN, String::new());
        match err {
            InvocationError::Auth { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err =
            InvocationError::from_status(StatusCode::TOO_MANY_REQUESTS, "throttled".to_string());
        assert!(matches!(err, InvocationError::Provider { status: 429, .. }));
    }

    #[test]
    fn test_price_overrides_apply_per_field() {
        let overrides = ProviderOverrides {
            input_price_per_1k: Some(0.5),
            ..Default::default()
        };
        let price = resolve_price(ProviderKind::Bedrock, Some(&overrides));
        assert_eq!(price.input_price_per_1k, 0.5);
        assert_eq!(
            price.output_price_per_1k,
            bedrock::DEFAULT_PRICE.output_price_per_1k
        );
    }

    #[test]
    fn test_default_order_and_names() {
        let names: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.display_name()).collect();
        assert_eq!(names, vec!["Azure OpenAI", "GCP Vertex AI", "AWS Bedrock Claude"]);
        assert_eq!(resolve_name(ProviderKind::Vertex, None), "GCP Vertex AI");
    }
}

//! GCP Vertex AI adapter for Gemini models
//!
//! Uses `streamGenerateContent` with server-sent events. The text of every chunk
//! is concatenated, and usage comes from the last chunk that reports it. The
//! clock stops only once the stream has ended.

use super::{
    build_http_client, resolve_name, resolve_price, Invocation, InvocationError, ProviderAdapter,
    ProviderKind,
};
use crate::config::{optional_var, required_var, ConfigError, EnvSource, ProviderOverrides};
use crate::{PriceTable, RunConfig};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_LOCATION: &str = "global";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 3000;

/// Gemini 2.5 Pro pricing (June 2025)
pub const DEFAULT_PRICE: PriceTable = PriceTable::new(0.00125, 0.01);

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

#[derive(Debug, Clone)]
pub struct VertexSettings {
    pub name: String,
    pub project_id: String,
    pub location: String,
    pub model: String,
    pub access_token: String,
    pub max_output_tokens: u32,
    pub price: PriceTable,
    /// API root, derived from the location unless overridden
    pub endpoint: String,
}

impl VertexSettings {
    pub async fn from_env(
        env: &dyn EnvSource,
        overrides: Option<&ProviderOverrides>,
    ) -> Result<Self, ConfigError> {
        let project_id = required_var(env, "GOOGLE_CLOUD_PROJECT")?;
        let location = overrides
            .and_then(|o| o.region.clone())
            .or_else(|| optional_var(env, "GOOGLE_CLOUD_LOCATION"))
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let access_token = match optional_var(env, "GOOGLE_CLOUD_ACCESS_TOKEN") {
            Some(token) => token,
            None => gcloud_access_token().await?,
        };

        let endpoint = optional_var(env, "VERTEX_AI_ENDPOINT")
            .unwrap_or_else(|| default_endpoint(&location));

        Ok(Self {
            name: resolve_name(ProviderKind::Vertex, overrides),
            project_id,
            location,
            model: overrides
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            access_token,
            max_output_tokens: overrides
                .and_then(|o| o.max_tokens)
                .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            price: resolve_price(ProviderKind::Vertex, overrides),
            endpoint,
        })
    }
}

fn default_endpoint(location: &str) -> String {
    if location == "global" {
        "https://aiplatform.googleapis.com".to_string()
    } else {
        format!("https://{location}-aiplatform.googleapis.com")
    }
}

/// Application default credentials through the gcloud CLI
async fn gcloud_access_token() -> Result<String, ConfigError> {
    info!("GOOGLE_CLOUD_ACCESS_TOKEN not set, asking gcloud for an access token");
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| ConfigError::Credentials(format!("failed to run gcloud: {e}")))?;

    if !output.status.success() {
        return Err(ConfigError::Credentials(format!(
            "gcloud auth print-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(ConfigError::Credentials(
            "gcloud returned an empty access token".to_string(),
        ));
    }
    Ok(token)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    seed: i32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateContentChunk {
    fn append_text(&self, out: &mut String) {
        for candidate in &self.candidates {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if let Some(text) = &part.text {
                        out.push_str(text);
                    }
                }
            }
        }
    }
}

pub struct VertexGeminiAdapter {
    settings: VertexSettings,
    client: Client,
}

impl VertexGeminiAdapter {
    pub fn new(settings: VertexSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            settings,
            client: build_http_client()?,
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:streamGenerateContent?alt=sse",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.project_id,
            self.settings.location,
            self.settings.model
        )
    }
}

#[async_trait]
impl ProviderAdapter for VertexGeminiAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn region(&self) -> &str {
        &self.settings.location
    }

    fn price(&self) -> PriceTable {
        self.settings.price
    }

    async fn invoke(
        &self,
        prompt: &str,
        config: &RunConfig,
    ) -> Result<Invocation, InvocationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                seed: 0,
                max_output_tokens: self.settings.max_output_tokens,
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_LOW_AND_ABOVE",
                })
                .collect(),
        };

        let start_time = Instant::now();

        let req_builder = self
            .client
            .post(self.stream_url())
            .bearer_auth(&self.settings.access_token)
            .json(&request);

        let mut es = EventSource::new(req_builder)
            .map_err(|e| InvocationError::Network(format!("cannot open event stream: {e}")))?;

        let mut text = String::new();
        let mut usage: Option<UsageMetadata> = None;
        let mut chunk_count: u32 = 0;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    chunk_count += 1;
                    match serde_json::from_str::<GenerateContentChunk>(&msg.data) {
                        Ok(chunk) => {
                            chunk.append_text(&mut text);
                            if chunk.usage_metadata.is_some() {
                                usage = chunk.usage_metadata;
                            }
                        }
                        Err(e) => {
                            debug!("Failed to parse chunk: {} - {}", e, msg.data);
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    es.close();
                    let body = response.text().await.unwrap_or_default();
                    return Err(InvocationError::from_status(status, body));
                }
                Err(e) => {
                    es.close();
                    return Err(InvocationError::Network(format!("SSE error: {e}")));
                }
            }
        }
        es.close();

        let elapsed = start_time.elapsed();

        let usage = match usage {
            Some(usage) => usage,
            None => {
                warn!(
                    "No usage metadata in {} chunks from model '{}', recording zero tokens",
                    chunk_count, self.settings.model
                );
                UsageMetadata {
                    prompt_token_count: 0,
                    candidates_token_count: 0,
                }
            }
        };

        Ok(Invocation {
            text,
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            elapsed,
        })
    }
}

//! Azure OpenAI chat completions adapter

use super::{
    build_http_client, resolve_name, resolve_price, Invocation, InvocationError, ProviderAdapter,
    ProviderKind,
};
use crate::config::{optional_var, required_var, ConfigError, EnvSource, ProviderOverrides};
use crate::{PriceTable, RunConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
const SYSTEM_PROMPT: &str = "Hello.";

/// GPT-4 (8K) pay-as-you-go pricing
pub const DEFAULT_PRICE: PriceTable = PriceTable::new(0.03, 0.06);

#[derive(Debug, Clone)]
pub struct AzureSettings {
    pub name: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
    pub region: String,
    pub max_tokens: u32,
    pub price: PriceTable,
}

impl AzureSettings {
    pub fn from_env(
        env: &dyn EnvSource,
        overrides: Option<&ProviderOverrides>,
    ) -> Result<Self, ConfigError> {
        let endpoint = required_var(env, "AZURE_OPENAI_ENDPOINT")?;
        let deployment = required_var(env, "AZURE_OPENAI_DEPLOYMENT")?;
        let api_key = required_var(env, "AZURE_OPENAI_API_KEY")?;

        let region = match overrides
            .and_then(|o| o.region.clone())
            .or_else(|| optional_var(env, "AZURE_OPENAI_REGION"))
        {
            Some(region) => region,
            None => endpoint_host(&endpoint)?,
        };

        Ok(Self {
            name: resolve_name(ProviderKind::Azure, overrides),
            endpoint,
            deployment,
            api_key,
            api_version: optional_var(env, "AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            region,
            max_tokens: overrides
                .and_then(|o| o.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            price: resolve_price(ProviderKind::Azure, overrides),
        })
    }
}

/// Azure endpoints carry no region, so the resource host stands in for it
fn endpoint_host(endpoint: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
        name: "AZURE_OPENAI_ENDPOINT".to_string(),
        reason: e.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Invalid {
            name: "AZURE_OPENAI_ENDPOINT".to_string(),
            reason: "endpoint has no host".to_string(),
        })
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

pub struct AzureOpenAiAdapter {
    settings: AzureSettings,
    client: Client,
}

impl AzureOpenAiAdapter {
    pub fn new(settings: AzureSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            settings,
            client: build_http_client()?,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            self.settings.api_version
        )
    }
}

#[async_trait]
impl ProviderAdapter for AzureOpenAiAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn region(&self) -> &str {
        &self.settings.region
    }

    fn price(&self) -> PriceTable {
        self.settings.price
    }

    async fn invoke(
        &self,
        prompt: &str,
        config: &RunConfig,
    ) -> Result<Invocation, InvocationError> {
        let request = ChatCompletionRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        };

        let start_time = Instant::now();

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InvocationError::from_status(status, text));
        }

        let payload: ChatCompletionResponse = response.json().await?;
        let elapsed = start_time.elapsed();

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = payload.usage.unwrap_or_default();
        debug!(
            "Azure usage: prompt={}, completion={}",
            usage.prompt_tokens, usage.completion_tokens
        );

        Ok(Invocation {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            elapsed,
        })
    }
}

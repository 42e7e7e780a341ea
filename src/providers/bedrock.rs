//! AWS Bedrock adapter for Anthropic Claude models (native invoke API)

use super::sigv4::{uri_encode, AwsCredentials, SigV4Signer};
use super::{
    build_http_client, resolve_name, resolve_price, Invocation, InvocationError, ProviderAdapter,
    ProviderKind,
};
use crate::config::{optional_var, required_var, ConfigError, EnvSource, ProviderOverrides};
use crate::{PriceTable, RunConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_TOKENS: u32 = 1100;
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Claude 3 Sonnet on-demand pricing
pub const DEFAULT_PRICE: PriceTable = PriceTable::new(0.003, 0.015);

#[derive(Debug, Clone)]
pub struct BedrockSettings {
    pub name: String,
    pub credentials: AwsCredentials,
    pub region: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub price: PriceTable,
    /// Runtime endpoint, `https://bedrock-runtime.{region}.amazonaws.com` by default
    pub endpoint: String,
}

impl BedrockSettings {
    pub fn from_env(
        env: &dyn EnvSource,
        overrides: Option<&ProviderOverrides>,
    ) -> Result<Self, ConfigError> {
        let credentials = AwsCredentials {
            access_key_id: required_var(env, "AWS_ACCESS_KEY_ID")?,
            secret_access_key: required_var(env, "AWS_SECRET_ACCESS_KEY")?,
            session_token: optional_var(env, "AWS_SESSION_TOKEN"),
        };

        let region = overrides
            .and_then(|o| o.region.clone())
            .or_else(|| optional_var(env, "AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let endpoint = optional_var(env, "AWS_BEDROCK_ENDPOINT")
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));

        Ok(Self {
            name: resolve_name(ProviderKind::Bedrock, overrides),
            credentials,
            region,
            model_id: overrides
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            max_tokens: overrides
                .and_then(|o| o.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            price: resolve_price(ProviderKind::Bedrock, overrides),
            endpoint,
        })
    }
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: Vec<ClaudeContent<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

pub struct BedrockClaudeAdapter {
    settings: BedrockSettings,
    signer: SigV4Signer,
    client: Client,
}

impl BedrockClaudeAdapter {
    pub fn new(settings: BedrockSettings) -> Result<Self, ConfigError> {
        let signer = SigV4Signer::new(settings.credentials.clone(), settings.region.clone());
        Ok(Self {
            signer,
            client: build_http_client()?,
            settings,
        })
    }

    fn invoke_url(&self) -> Result<url::Url, InvocationError> {
        let raw = format!(
            "{}/model/{}/invoke",
            self.settings.endpoint.trim_end_matches('/'),
            uri_encode(&self.settings.model_id)
        );
        url::Url::parse(&raw).map_err(|e| InvocationError::Signing(format!("invalid URL {raw}: {e}")))
    }
}

#[async_trait]
impl ProviderAdapter for BedrockClaudeAdapter {
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
        let url = self.invoke_url()?;
        let request = InvokeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: self.settings.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            messages: vec![ClaudeMessage {
                role: "user",
                content: vec![ClaudeContent {
                    kind: "text",
                    text: prompt,
                }],
            }],
        };
        let body = serde_json::to_vec(&request).map_err(|e| InvocationError::Decode(e.to_string()))?;

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        let signed = self
            .signer
            .sign("POST", &url, &headers, &body, chrono::Utc::now())?;

        let start_time = Instant::now();

        let mut req_builder = self.client.post(url.as_str());
        for (name, value) in &signed {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }
        let response = req_builder.body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InvocationError::from_status(status, text));
        }

        let payload: InvokeResponse = response.json().await?;
        let elapsed = start_time.elapsed();

        let text = payload
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .unwrap_or_default();
        let usage = payload.usage.unwrap_or_default();
        debug!(
            "Bedrock usage: input={}, output={}",
            usage.input_tokens, usage.output_tokens
        );

        Ok(Invocation {
            text,
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_settings_require_credentials() {
        let err = BedrockSettings::from_env(&env(&[("AWS_ACCESS_KEY_ID", "AKIA")]), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn test_settings_defaults() {
        let env = env(&[("AWS_ACCESS_KEY_ID", "AKIA"), ("AWS_SECRET_ACCESS_KEY", "secret")]);
        let settings = BedrockSettings::from_env(&env, None).unwrap();
        assert_eq!(settings.region, "us-east-1");
        assert_eq!(
            settings.endpoint,
            "https://bedrock-runtime.us-east-1.amazonaws.com"
        );
        assert_eq!(settings.model_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.max_tokens, 1100);
        assert_eq!(settings.price, DEFAULT_PRICE);
        assert_eq!(settings.name, "AWS Bedrock Claude");
    }

    #[test]
    fn test_invoke_url_encodes_model_id() {
        let env = env(&[("AWS_ACCESS_KEY_ID", "AKIA"), ("AWS_SECRET_ACCESS_KEY", "secret")]);
        let adapter = BedrockClaudeAdapter::new(BedrockSettings::from_env(&env, None).unwrap())
            .unwrap();
        assert_eq!(
            adapter.invoke_url().unwrap().as_str(),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/anthropic.claude-3-sonnet-20240229-v1%3A0/invoke"
        );
    }
}

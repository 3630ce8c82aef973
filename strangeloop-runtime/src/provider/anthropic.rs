//! Anthropic Claude provider implementation

use super::*;
use crate::config::{self, ConfigStore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable consulted after the override and the config store
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-7-sonnet-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const TIMEOUT_SECS: u64 = 120;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                Error::unexpected(format!("failed to create HTTP client: {}", e))
                    .with_operation("provider::new")
                    .set_source(e)
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Build a provider from the override, the config store, then the environment
    pub fn from_config(store: &ConfigStore, api_key_override: Option<&str>) -> Result<Self> {
        let env_key = std::env::var(API_KEY_ENV).ok();
        let api_key = resolve_api_key(api_key_override, store.get_str(config::API_KEY), env_key)?;

        let mut provider = Self::new(api_key)?;
        if let Some(model) = store.get_str(config::MODEL) {
            provider = provider.with_model(model);
        }
        if let Some(base_url) = store.get_str(config::API_BASE_URL) {
            provider = provider.with_base_url(base_url);
        }
        Ok(provider)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

/// First non-empty credential wins: override, config store, environment
pub fn resolve_api_key(
    explicit: Option<&str>,
    from_config: Option<String>,
    from_env: Option<String>,
) -> Result<String> {
    explicit
        .map(str::to_string)
        .into_iter()
        .chain(from_config)
        .chain(from_env)
        .find(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            Error::configuration(format!(
                "no API key: pass --api-key, run `strangeloop config set {} <key>`, or set {}",
                config::API_KEY,
                API_KEY_ENV
            ))
            .with_operation("provider::resolve_api_key")
        })
}

impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        request.validate()?;
        let api_request = self.build_request(&request);
        debug!(
            model = api_request.model,
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                Error::transport(format!("error communicating with completion API: {}", e))
                    .with_operation("provider::complete")
                    .set_source(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!("completion API returned {}", status))
                .with_operation("provider::complete")
                .with_context("status", status.as_u16().to_string())
                .with_context("body", text));
        }

        let body = response.text().await.map_err(|e| {
            Error::transport(format!("failed to read completion response: {}", e))
                .with_operation("provider::complete")
                .set_source(e)
        })?;

        let text = parse_response(&body)?;
        debug!(response_chars = text.len(), "completion received");
        Ok(text)
    }
}

/// Extract the generated text from a Messages API response body
pub fn parse_response(body: &str) -> Result<String> {
    let api_response: AnthropicResponse = serde_json::from_str(body).map_err(|e| {
        Error::response_format(format!("unexpected completion response: {}", e))
            .with_operation("provider::parse_response")
            .set_source(e)
    })?;

    Ok(api_response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect())
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

//! # Completion Provider Interface
//!
//! A trait-based abstraction over one text-completion round trip.
//!
//! ## Design
//! - `CompletionProvider` trait defines the single `complete` call
//! - `AnthropicProvider` talks to the hosted Messages API
//! - No streaming, no retries: one request, one reply

pub mod anthropic;

pub use anthropic::AnthropicProvider;

use crate::error::{Error, Result};

/// Default token budget for free-form questions
pub const DEFAULT_MAX_TOKENS: usize = 1024;

/// Default sampling temperature for free-form questions
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Core Types
// ============================================================================

/// Request parameters for a completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Reject budgets and temperatures the service would refuse
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::invalid_argument("max_tokens must be greater than 0")
                .with_operation("provider::validate"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::invalid_argument(format!(
                "temperature {} is outside [0, 1]",
                self.temperature
            ))
            .with_operation("provider::validate"));
        }
        Ok(())
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The completion provider trait
#[allow(async_fn_in_trait)]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic")
    fn name(&self) -> &str;

    /// Get the model requests are sent to by default
    fn model(&self) -> &str;

    /// Send one completion request and return the generated text
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let request = CompletionRequest::new(prompt)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);
        self.complete(request).await
    }
}

// ============================================================================
// Tests
// ============================================================================

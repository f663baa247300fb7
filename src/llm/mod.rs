//! Completion-service integration.
//!
//! The pipeline talks to any OpenAI-compatible chat-completions endpoint
//! through the `CompletionProvider` trait. `openai` holds the HTTP
//! client; `retry` wraps a provider with bounded retry for transient
//! failures.

pub mod openai;
pub mod retry;

pub use openai::OpenAiProvider;
pub use retry::RetryProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::CompletionError;

/// One completion call: a system instruction, a user prompt, and the
/// sampling knobs the pipeline tunes per use.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.2,
            max_tokens: 256,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A text-completion service. Synchronous from the pipeline's point of
/// view: one request, one text answer, may fail.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model identifier for logging.
    fn model_name(&self) -> &str;

    /// Run one completion and return the answer text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Configuration for creating a completion provider.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: SecretString,
    pub model: String,
    /// Custom OpenAI-compatible endpoint; `None` means api.openai.com.
    pub base_url: Option<String>,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

/// Create a ready-to-use completion provider from configuration:
/// an OpenAI-compatible client with the configured timeout, wrapped in
/// bounded retry.
pub fn create_provider(
    config: &CompletionConfig,
) -> Result<Arc<dyn CompletionProvider>, CompletionError> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| CompletionError::RequestFailed {
            provider: "openai".to_string(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;

    let provider = match config.base_url {
        Some(ref base_url) => {
            OpenAiProvider::custom(base_url, config.api_key.clone(), &config.model)
        }
        None => OpenAiProvider::openai(config.api_key.clone(), &config.model),
    }
    .with_client(client);

    tracing::info!(model = %config.model, "Using completion provider");
    Ok(Arc::new(RetryProvider::new(Arc::new(provider))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_constructs_with_any_key() {
        // Auth is only checked by the remote service at request time.
        let config = CompletionConfig {
            api_key: SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeout: Duration::from_secs(30),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn completion_request_builder_sets_knobs() {
        let request = CompletionRequest::new("system", "user")
            .with_temperature(0.7)
            .with_max_tokens(500);
        assert_eq!(request.system, "system");
        assert_eq!(request.user, "user");
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 500);
    }
}

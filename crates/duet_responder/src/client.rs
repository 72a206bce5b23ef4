//! HTTP responder client.
//!
//! Supports OpenAI and Anthropic APIs. One completion is one HTTP request;
//! nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use duet_core::{DuetConfig, ResponderError, ResponderProvider, ResponderService};

use crate::error::{SetupError, SetupResult};
use crate::wire::{build_request_body, parse_response};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-5-mini",
            Self::Anthropic => "claude-sonnet-4.5",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => OPENAI_BASE_URL,
            Self::Anthropic => ANTHROPIC_BASE_URL,
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Responder backed by a hosted completion API.
pub struct HttpResponder {
    provider: LlmProvider,
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpResponder {
    /// Create a responder with explicit configuration
    pub fn new(provider: LlmProvider, api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            base_url: provider.default_base_url().to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API base, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create a responder from environment variables
    ///
    /// Checks in order:
    /// 1. OPENAI_API_KEY
    /// 2. ANTHROPIC_API_KEY
    ///
    /// `DUET_MODEL` overrides the model and `DUET_RESPONDER_BASE_URL` the
    /// API base.
    pub fn from_env() -> SetupResult<Self> {
        let model = std::env::var("DUET_MODEL").ok();
        let provider = [LlmProvider::OpenAI, LlmProvider::Anthropic]
            .into_iter()
            .find_map(|p| key_from_env(p).map(|key| (p, key)));

        match provider {
            Some((provider, key)) => Ok(Self::new(provider, key, model).with_env_base_url()),
            None => Err(SetupError::NotConfigured),
        }
    }

    /// Create a responder for the provider and model named in `config`.
    ///
    /// The API key still comes from the provider's environment variable.
    pub fn from_config(config: &DuetConfig) -> SetupResult<Self> {
        let provider = match config.provider {
            ResponderProvider::OpenAi => LlmProvider::OpenAI,
            ResponderProvider::Anthropic => LlmProvider::Anthropic,
            ResponderProvider::Echo => {
                return Err(SetupError::UnsupportedProvider("echo".to_string()))
            }
        };
        let key = key_from_env(provider).ok_or(SetupError::NotConfigured)?;
        Ok(Self::new(provider, key, config.model.clone()).with_env_base_url())
    }

    fn with_env_base_url(self) -> Self {
        match std::env::var("DUET_RESPONDER_BASE_URL") {
            Ok(url) if !url.is_empty() => self.with_base_url(url),
            _ => self,
        }
    }

    /// Get the current provider
    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Get the current model
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAI => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/messages", self.base_url),
        }
    }
}

fn key_from_env(provider: LlmProvider) -> Option<String> {
    std::env::var(provider.api_key_var())
        .ok()
        .filter(|key| !key.is_empty())
}

#[async_trait]
impl ResponderService for HttpResponder {
    #[instrument(skip(self, prompt), fields(provider = self.provider.name(), model = %self.model))]
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ResponderError> {
        let body = build_request_body(self.provider, &self.model, prompt)
            .map_err(|e| ResponderError::Transport(format!("Failed to encode request: {}", e)))?;

        let request = self
            .client
            .post(self.endpoint())
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .json(&body);
        let request = match self.provider {
            LlmProvider::OpenAI => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            LlmProvider::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        debug!("Sending completion request");
        let response = request.send().await.map_err(|e| transport(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResponderError::Transport(format!(
                "{} API error {}: {}",
                self.provider.name(),
                status,
                body
            )));
        }

        let bytes = response.bytes().await.map_err(|e| transport(e, timeout))?;
        parse_response(self.provider, &bytes)
    }
}

fn transport(error: reqwest::Error, timeout: Duration) -> ResponderError {
    if error.is_timeout() {
        ResponderError::Timeout(timeout)
    } else {
        ResponderError::Transport(format!("Network error: {}", error))
    }
}

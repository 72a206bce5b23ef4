//! Request and response bodies for the supported completion APIs.

use serde::{Deserialize, Serialize};

use duet_core::ResponderError;

use crate::client::LlmProvider;

/// Upper bound on generated tokens per reply.
pub const MAX_TOKENS: u32 = 1024;

// OpenAI API types
#[derive(Debug, Serialize)]
pub(crate) struct OpenAIRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub max_completion_tokens: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// Anthropic API types
#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

/// Build the JSON body for a single-prompt completion.
pub fn build_request_body(
    provider: LlmProvider,
    model: &str,
    prompt: &str,
) -> Result<serde_json::Value, serde_json::Error> {
    let messages = vec![WireMessage {
        role: "user",
        content: prompt,
    }];
    match provider {
        LlmProvider::OpenAI => serde_json::to_value(OpenAIRequest {
            model,
            messages,
            max_completion_tokens: MAX_TOKENS,
        }),
        LlmProvider::Anthropic => serde_json::to_value(AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages,
        }),
    }
}

/// Pull the reply text out of a successful response body.
///
/// Anything that does not carry the expected text field is malformed.
pub fn parse_response(provider: LlmProvider, body: &[u8]) -> Result<String, ResponderError> {
    let text = match provider {
        LlmProvider::OpenAI => serde_json::from_slice::<OpenAIResponse>(body)
            .map_err(|e| ResponderError::Malformed(e.to_string()))?
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content),
        LlmProvider::Anthropic => serde_json::from_slice::<AnthropicResponse>(body)
            .map_err(|e| ResponderError::Malformed(e.to_string()))?
            .content
            .into_iter()
            .find_map(|c| c.text),
    };

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(ResponderError::Malformed("empty text".to_string())),
        None => Err(ResponderError::Malformed(format!(
            "no text field in {} response",
            provider.name()
        ))),
    }
}

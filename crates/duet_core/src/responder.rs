//! Responder service boundary.
//!
//! The responder is an opaque text-completion function. The adapter turns
//! every call into a reply string: either the completion or one of two
//! fixed fallbacks. It never retries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::ResponderError;

/// Reply used when the responder answered without usable text.
pub const MALFORMED_FALLBACK: &str = "Sorry, I couldn't generate a response.";

/// Reply used when the responder could not be reached in time.
pub const CONNECTIVITY_FALLBACK: &str =
    "Sorry, I'm having trouble connecting right now. Please try again later.";

/// External text-completion service.
#[async_trait]
pub trait ResponderService: Send + Sync {
    /// Complete a single prompt. Implementations should bound the call by
    /// `timeout`; the adapter enforces it as well.
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ResponderError>;
}

/// Maps one responder call to exactly one reply string.
#[derive(Clone)]
pub struct ResponderAdapter {
    service: Arc<dyn ResponderService>,
    timeout: Duration,
}

impl ResponderAdapter {
    pub fn new(service: Arc<dyn ResponderService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the responder once and return its text or the matching fallback.
    pub async fn reply(&self, prompt: &str) -> String {
        let call = self.service.complete(prompt, self.timeout);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ResponderError::Timeout(self.timeout)),
        };

        match result {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Responder returned {} chars", text.len());
                text
            }
            Ok(_) => {
                warn!("Responder returned empty text, using fallback");
                MALFORMED_FALLBACK.to_string()
            }
            Err(e) => {
                warn!("Responder failed ({}), using fallback", e);
                fallback_for(&e).to_string()
            }
        }
    }
}

/// The fallback reply for a responder failure.
pub fn fallback_for(error: &ResponderError) -> &'static str {
    if error.is_connectivity() {
        CONNECTIVITY_FALLBACK
    } else {
        MALFORMED_FALLBACK
    }
}

/// Predefined outcome for one scripted call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(ResponderError),
    /// Sleep before answering; used to exercise timeouts.
    Delayed(Duration, String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::Fail(ResponderError::Transport(message.into()))
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Fail(ResponderError::Malformed(message.into()))
    }
}

/// Scripted responder for tests and offline use.
///
/// Plays queued replies in order; once the queue is empty it echoes the
/// prompt back. Every prompt is captured.
#[derive(Clone, Default)]
pub struct ScriptedResponder {
    replies: Arc<RwLock<VecDeque<ScriptedReply>>>,
    prompts: Arc<RwLock<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResponder {
    /// A responder that only echoes.
    pub fn echo() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call.
    pub fn add_reply(self, reply: ScriptedReply) -> Self {
        self.replies.write().push_back(reply);
        self
    }

    pub fn with_replies(self, replies: Vec<ScriptedReply>) -> Self {
        *self.replies.write() = replies.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().clone()
    }
}

#[async_trait]
impl ResponderService for ScriptedResponder {
    async fn complete(&self, prompt: &str, _timeout: Duration) -> Result<String, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.write().push(prompt.to_string());

        let next = self.replies.write().pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(e)) => Err(e),
            Some(ScriptedReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Ok(format!("You said: {}", prompt)),
        }
    }
}

//! Error types for building an HTTP responder.

use thiserror::Error;

/// Result type alias for responder setup.
pub type SetupResult<T> = Result<T, SetupError>;

/// Errors raised while configuring an HTTP responder.
///
/// Errors during a completion call are `duet_core::ResponderError`s.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Responder not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    NotConfigured,

    #[error("Provider '{0}' is not served over HTTP")]
    UnsupportedProvider(String),
}

//! Error types for the core module.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for core operations.
pub type DuetResult<T> = Result<T, DuetError>;

/// Errors that can occur in the synchronization and orchestration core.
#[derive(Error, Debug)]
pub enum DuetError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Send rejected: {0}")]
    SendRejected(String),

    #[error("Append failed: {0}")]
    Append(String),

    #[error("Invalid transition for {operation}: current={current}")]
    InvalidTransition { current: String, operation: String },

    #[error("Engine stopped")]
    EngineStopped,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors reported by a message log implementation.
///
/// Cloneable so the same failure can be fanned out to every subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Subscription not found: {0}")]
    UnknownSubscription(u64),

    #[error("Append rejected: {0}")]
    Rejected(String),

    #[error("Log unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Errors from the external text-completion service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Responder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ResponderError {
    /// Transport failures and timeouts share the connectivity fallback.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

//! Engine configuration.
//!
//! Loaded from an optional TOML file, then overridden from `DUET_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DuetError, DuetResult};
use crate::types::Identity;

/// Backend used for responder completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponderProvider {
    #[default]
    OpenAi,
    Anthropic,
    /// Offline: replies echo the prompt
    Echo,
}

impl std::str::FromStr for ResponderProvider {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "echo" => Ok(Self::Echo),
            other => Err(DuetError::Config(format!("unknown provider '{}'", other))),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuetConfig {
    /// Namespace path of the message log deployment
    pub namespace: String,
    /// Well-known identity of the automated responder
    pub responder_id: String,
    /// Upper bound for one responder call, in seconds
    pub responder_timeout_secs: u64,
    pub provider: ResponderProvider,
    /// Model override for the responder backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            namespace: "duet/default".to_string(),
            responder_id: "duet-responder".to_string(),
            responder_timeout_secs: 30,
            provider: ResponderProvider::default(),
            model: None,
        }
    }
}

impl DuetConfig {
    /// Load from `path` (if it exists) and the process environment.
    pub fn load(path: Option<&Path>) -> DuetResult<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from `path` (if it exists), reading overrides through `lookup`.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> DuetResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> DuetResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `DUET_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> DuetResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(namespace) = lookup("DUET_NAMESPACE") {
            self.namespace = namespace;
        }
        if let Some(id) = lookup("DUET_RESPONDER_ID") {
            self.responder_id = id;
        }
        if let Some(secs) = lookup("DUET_RESPONDER_TIMEOUT_SECS") {
            self.responder_timeout_secs = secs.parse().map_err(|_| {
                DuetError::Config(format!("DUET_RESPONDER_TIMEOUT_SECS is not a number: {}", secs))
            })?;
        }
        if let Some(provider) = lookup("DUET_PROVIDER") {
            self.provider = provider.parse()?;
        }
        if let Some(model) = lookup("DUET_MODEL") {
            self.model = Some(model);
        }
        Ok(())
    }

    pub fn validate(&self) -> DuetResult<()> {
        if self.namespace.trim().is_empty() {
            return Err(DuetError::Config("namespace must not be empty".to_string()));
        }
        if self.responder_id.trim().is_empty() {
            return Err(DuetError::Config("responder_id must not be empty".to_string()));
        }
        if self.responder_timeout_secs == 0 {
            return Err(DuetError::Config(
                "responder_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn responder_identity(&self) -> Identity {
        Identity::new(self.responder_id.clone())
    }

    pub fn responder_timeout(&self) -> Duration {
        Duration::from_secs(self.responder_timeout_secs)
    }
}

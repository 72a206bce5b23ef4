//! Local session: identity bootstrap and its lifecycle.
//!
//! The session is the only owner of the local identity. Other components
//! receive it by reference and only act on the `Ready` state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DuetError, DuetResult};
use crate::types::Identity;

/// Connectivity state of the local session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Nothing attempted yet, or signed out
    Uninitialized,
    /// Sign-in in progress
    Authenticating,
    /// A usable identity exists
    Ready(Identity),
    /// Sign-in failed; no usable identity
    Failed(String),
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Authenticating => "authenticating",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Supplies the local identity once sign-in completes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Perform sign-in and return the subject id.
    async fn sign_in(&self) -> DuetResult<Identity>;

    /// Tear down the signed-in identity.
    async fn sign_out(&self, identity: &Identity) -> DuetResult<()>;
}

/// Signs in with a fresh random subject id every time.
#[derive(Debug, Default, Clone)]
pub struct AnonymousIdentityProvider;

#[async_trait]
impl IdentityProvider for AnonymousIdentityProvider {
    async fn sign_in(&self) -> DuetResult<Identity> {
        Ok(Identity::new(format!("anon-{}", uuid::Uuid::new_v4())))
    }

    async fn sign_out(&self, _identity: &Identity) -> DuetResult<()> {
        Ok(())
    }
}

/// Signs in with a pre-issued token; the token's subject is the identity.
///
/// Tokens have the form `<subject>` or `<subject>:<secret>`.
#[derive(Debug, Clone)]
pub struct TokenIdentityProvider {
    token: String,
}

impl TokenIdentityProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn sign_in(&self) -> DuetResult<Identity> {
        let subject = self.token.split(':').next().unwrap_or_default().trim();
        if subject.is_empty() {
            return Err(DuetError::Bootstrap("token has no subject".to_string()));
        }
        Ok(Identity::new(subject))
    }

    async fn sign_out(&self, _identity: &Identity) -> DuetResult<()> {
        Ok(())
    }
}

/// The local session object.
#[derive(Debug, Default, Clone)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that is already signed in.
    pub fn ready(identity: Identity) -> Self {
        Self {
            state: SessionState::Ready(identity),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The identity, if the session is ready.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.identity().is_some()
    }

    /// Enter `Authenticating`. Allowed from `Uninitialized` or `Failed`.
    pub fn begin(&mut self) -> DuetResult<()> {
        match self.state {
            SessionState::Uninitialized | SessionState::Failed(_) => {
                self.state = SessionState::Authenticating;
                Ok(())
            }
            _ => Err(self.invalid("begin")),
        }
    }

    pub fn mark_ready(&mut self, identity: Identity) -> DuetResult<()> {
        if self.state != SessionState::Authenticating {
            return Err(self.invalid("mark_ready"));
        }
        info!("Session ready for {}", identity);
        self.state = SessionState::Ready(identity);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> DuetResult<()> {
        if self.state != SessionState::Authenticating {
            return Err(self.invalid("mark_failed"));
        }
        let reason = reason.into();
        warn!("Session bootstrap failed: {}", reason);
        self.state = SessionState::Failed(reason);
        Ok(())
    }

    /// Drop the identity. Always succeeds.
    pub fn sign_out(&mut self) -> Option<Identity> {
        let previous = std::mem::take(&mut self.state);
        match previous {
            SessionState::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    /// Run sign-in through the provider and settle in `Ready` or `Failed`.
    pub async fn bootstrap(
        &mut self,
        provider: &dyn IdentityProvider,
    ) -> DuetResult<&SessionState> {
        self.begin()?;
        self.settle(provider).await
    }

    /// Second half of [`bootstrap`](Session::bootstrap): ask the provider
    /// while `Authenticating`, so callers can publish that state first.
    pub async fn settle(&mut self, provider: &dyn IdentityProvider) -> DuetResult<&SessionState> {
        if self.state != SessionState::Authenticating {
            return Err(self.invalid("settle"));
        }
        match provider.sign_in().await {
            Ok(identity) => self.mark_ready(identity)?,
            Err(e) => self.mark_failed(e.to_string())?,
        }
        Ok(&self.state)
    }

    fn invalid(&self, operation: &str) -> DuetError {
        DuetError::InvalidTransition {
            current: self.state.label().to_string(),
            operation: operation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Provider {}

        #[async_trait]
        impl IdentityProvider for Provider {
            async fn sign_in(&self) -> DuetResult<Identity>;
            async fn sign_out(&self, identity: &Identity) -> DuetResult<()>;
        }
    }

    #[tokio::test]
    async fn test_bootstrap_ready() {
        let mut provider = MockProvider::new();
        provider
            .expect_sign_in()
            .times(1)
            .returning(|| Ok(Identity::from("alice")));

        let mut session = Session::new();
        let state = session.bootstrap(&provider).await.unwrap();

        assert_eq!(state, &SessionState::Ready(Identity::from("alice")));
        assert_eq!(session.identity(), Some(&Identity::from("alice")));
    }

    #[tokio::test]
    async fn test_bootstrap_failure_leaves_no_identity() {
        let mut provider = MockProvider::new();
        provider
            .expect_sign_in()
            .times(1)
            .returning(|| Err(DuetError::Bootstrap("offline".to_string())));

        let mut session = Session::new();
        session.bootstrap(&provider).await.unwrap();

        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_can_retry_after_failure() {
        let mut provider = MockProvider::new();
        let mut calls = 0;
        provider.expect_sign_in().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Err(DuetError::Bootstrap("offline".to_string()))
            } else {
                Ok(Identity::from("alice"))
            }
        });

        let mut session = Session::new();
        session.bootstrap(&provider).await.unwrap();
        assert!(!session.is_ready());

        session.bootstrap(&provider).await.unwrap();
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_settle_requires_authenticating() {
        let mut provider = MockProvider::new();
        provider
            .expect_sign_in()
            .times(1)
            .returning(|| Ok(Identity::from("alice")));

        let mut session = Session::new();
        assert!(matches!(
            session.settle(&provider).await,
            Err(DuetError::InvalidTransition { .. })
        ));

        session.begin().unwrap();
        assert_eq!(session.state(), &SessionState::Authenticating);
        session.settle(&provider).await.unwrap();
        assert!(session.is_ready());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut session = Session::ready(Identity::from("alice"));
        assert!(matches!(
            session.begin(),
            Err(DuetError::InvalidTransition { .. })
        ));

        let mut fresh = Session::new();
        assert!(fresh.mark_ready(Identity::from("bob")).is_err());
        assert!(fresh.mark_failed("nope").is_err());
    }

    #[test]
    fn test_sign_out_resets() {
        let mut session = Session::ready(Identity::from("alice"));
        assert_eq!(session.sign_out(), Some(Identity::from("alice")));
        assert_eq!(session.state(), &SessionState::Uninitialized);
        assert_eq!(session.sign_out(), None);
    }

    #[tokio::test]
    async fn test_token_provider() {
        let provider = TokenIdentityProvider::new("carol:s3cret");
        assert_eq!(provider.sign_in().await.unwrap(), Identity::from("carol"));

        let empty = TokenIdentityProvider::new("  ");
        assert!(matches!(
            empty.sign_in().await,
            Err(DuetError::Bootstrap(_))
        ));
    }

    #[tokio::test]
    async fn test_anonymous_provider_is_unique() {
        let provider = AnonymousIdentityProvider;
        let a = provider.sign_in().await.unwrap();
        let b = provider.sign_in().await.unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("anon-"));
    }
}

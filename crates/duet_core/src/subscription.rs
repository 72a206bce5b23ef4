//! Log subscription manager.
//!
//! Keeps exactly one live subscription to the message log while a ready
//! identity exists, and turns every push into a wholesale replacement of
//! the local snapshot. Pushes are applied by a single consumer in the
//! order the log produced them.
//!
//! ```text
//! Detached ──attach──▶ Attaching ──subscribed──▶ Attached
//!    ▲                     │                        │
//!    └──── subscribe err ──┘                        │
//!    └────────────────────── detach ────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{DuetError, DuetResult};
use crate::log::{LogNotification, MessageLog, SortOrder, SubscriptionId};
use crate::types::{empty_snapshot, Identity, Snapshot};

/// Lifecycle of the log subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionState {
    Detached,
    Attaching(Identity),
    Attached {
        identity: Identity,
        subscription: SubscriptionId,
    },
}

impl SubscriptionState {
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Attached { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::Attaching(_) => "attaching",
            Self::Attached { .. } => "attached",
        }
    }
}

/// What happened to a notification handed to [`SubscriptionManager::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Snapshot replaced; carries the new length
    Replaced(usize),
    /// Not for the active subscription (stale or after detach)
    Ignored,
    /// Delivery error reported; last snapshot kept
    Errored,
}

/// Receives failures that are handled locally rather than propagated.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &DuetError);
}

/// Reports errors through `tracing`: append failures as errors,
/// everything else as warnings.
#[derive(Debug, Default, Clone)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, failure: &DuetError) {
        match failure {
            DuetError::Append(_) => error!("{}", failure),
            _ => warn!("{}", failure),
        }
    }
}

/// Keeps every reported error as a string.
#[derive(Debug, Default, Clone)]
pub struct CollectingErrorSink {
    reports: Arc<Mutex<Vec<String>>>,
}

impl CollectingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, error: &DuetError) {
        self.reports.lock().push(error.to_string());
    }
}

/// Owner of the subscription and of the message snapshot.
pub struct SubscriptionManager {
    log: Arc<dyn MessageLog>,
    errors: Arc<dyn ErrorSink>,
    sink: mpsc::UnboundedSender<LogNotification>,
    state: watch::Sender<SubscriptionState>,
    snapshot: watch::Sender<Snapshot>,
}

impl SubscriptionManager {
    /// Create a detached manager.
    ///
    /// The returned receiver carries every push from the log and must be
    /// drained by exactly one consumer that hands each item to [`apply`].
    ///
    /// [`apply`]: SubscriptionManager::apply
    pub fn new(
        log: Arc<dyn MessageLog>,
        errors: Arc<dyn ErrorSink>,
    ) -> (Self, mpsc::UnboundedReceiver<LogNotification>) {
        let (sink, notifications) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SubscriptionState::Detached);
        let (snapshot, _) = watch::channel(empty_snapshot());
        (
            Self {
                log,
                errors,
                sink,
                state,
                snapshot,
            },
            notifications,
        )
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.borrow().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().is_attached()
    }

    /// Observe subscription state changes.
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Observe snapshot replacements.
    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Open the ordered subscription for a ready identity.
    pub async fn attach(&mut self, identity: &Identity) -> DuetResult<()> {
        let current = self.state();
        if current != SubscriptionState::Detached {
            return Err(DuetError::InvalidTransition {
                current: current.label().to_string(),
                operation: "attach".to_string(),
            });
        }

        self.state
            .send_replace(SubscriptionState::Attaching(identity.clone()));

        match self
            .log
            .subscribe(SortOrder::CreatedAtAscending, self.sink.clone())
            .await
        {
            Ok(subscription) => {
                info!(
                    "Attached {} to log '{}' as {}",
                    identity,
                    self.log.namespace(),
                    subscription
                );
                self.state.send_replace(SubscriptionState::Attached {
                    identity: identity.clone(),
                    subscription,
                });
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(SubscriptionState::Detached);
                let error = DuetError::Subscription(e.to_string());
                self.errors.report(&error);
                Err(error)
            }
        }
    }

    /// Cancel the active subscription. Safe to call when detached.
    ///
    /// The snapshot is kept; anything the log still delivers for the old
    /// subscription is ignored by [`apply`](SubscriptionManager::apply).
    pub async fn detach(&mut self) {
        let previous = self.state.send_replace(SubscriptionState::Detached);
        if let SubscriptionState::Attached { subscription, .. } = previous {
            if let Err(e) = self.log.unsubscribe(subscription).await {
                self.errors.report(&DuetError::Subscription(format!(
                    "unsubscribe {}: {}",
                    subscription, e
                )));
            }
            info!("Detached {} from log '{}'", subscription, self.log.namespace());
        }
    }

    /// Apply one push from the log.
    pub fn apply(&self, notification: LogNotification) -> ApplyOutcome {
        let active = match &*self.state.borrow() {
            SubscriptionState::Attached { subscription, .. } => *subscription,
            _ => return ApplyOutcome::Ignored,
        };
        if notification.subscription != active {
            debug!("Ignoring push for stale {}", notification.subscription);
            return ApplyOutcome::Ignored;
        }

        match notification.payload {
            Ok(messages) => {
                let len = messages.len();
                self.snapshot.send_replace(Arc::from(messages));
                debug!("Snapshot replaced ({} messages)", len);
                ApplyOutcome::Replaced(len)
            }
            Err(e) => {
                self.errors.report(&DuetError::Subscription(e.to_string()));
                ApplyOutcome::Errored
            }
        }
    }
}

//! Message log boundary.
//!
//! The log is an external, append-only, server-ordered collection. The core
//! only relies on three things: ordering keys increase with every append,
//! a subscription pushes the full ordered contents after each change, and
//! `unsubscribe` stops further pushes.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LogError;
use crate::types::{AppendReceipt, Message, MessageDraft};

/// Result type alias for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Handle for one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Ordering requested for subscription pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    CreatedAtAscending,
}

/// One push from the log: either the full ordered contents or a delivery error.
#[derive(Debug, Clone)]
pub struct LogNotification {
    pub subscription: SubscriptionId,
    pub payload: Result<Vec<Message>, LogError>,
}

impl LogNotification {
    pub fn snapshot(subscription: SubscriptionId, messages: Vec<Message>) -> Self {
        Self {
            subscription,
            payload: Ok(messages),
        }
    }

    pub fn error(subscription: SubscriptionId, error: LogError) -> Self {
        Self {
            subscription,
            payload: Err(error),
        }
    }
}

/// Sink the log pushes notifications into.
pub type NotificationSink = mpsc::UnboundedSender<LogNotification>;

/// Append-only, server-ordered message store.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Namespace path scoping all reads and writes of this log.
    fn namespace(&self) -> &str;

    /// Open a live subscription. The log pushes the current contents and
    /// then the full contents again after every change.
    async fn subscribe(&self, order: SortOrder, sink: NotificationSink)
        -> LogResult<SubscriptionId>;

    /// Stop pushes for a subscription.
    async fn unsubscribe(&self, subscription: SubscriptionId) -> LogResult<()>;

    /// Append a message; the log assigns id and ordering key.
    async fn append(&self, draft: MessageDraft) -> LogResult<AppendReceipt>;
}

//! In-process message log.
//!
//! Implements the [`MessageLog`] boundary in memory for one namespace. Used
//! by the CLI and by tests; it also carries hooks to simulate append and
//! delivery failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::LogError;
use crate::log::{
    LogNotification, LogResult, MessageLog, NotificationSink, SortOrder, SubscriptionId,
};
use crate::types::{AppendReceipt, Message, MessageDraft, OrderingKey};

#[derive(Default)]
struct LogState {
    messages: Vec<Message>,
    last_key: OrderingKey,
    next_subscription: u64,
    subscribers: HashMap<SubscriptionId, NotificationSink>,
    failing_appends: usize,
    failing_subscribes: usize,
    append_count: usize,
}

impl LogState {
    /// Push the full ordered contents to every live subscriber.
    ///
    /// Subscribers whose receiving side is gone are dropped.
    fn broadcast(&mut self) {
        let messages = &self.messages;
        self.subscribers.retain(|id, sink| {
            sink.send(LogNotification::snapshot(*id, messages.clone()))
                .is_ok()
        });
    }
}

/// In-memory append-only log.
#[derive(Clone)]
pub struct MemoryLog {
    namespace: Arc<str>,
    state: Arc<Mutex<LogState>>,
}

impl MemoryLog {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Arc::from(namespace.into()),
            state: Arc::new(Mutex::new(LogState::default())),
        }
    }

    /// Make the next `count` appends fail with `LogError::Unavailable`.
    pub fn fail_next_appends(&self, count: usize) {
        self.state.lock().failing_appends = count;
    }

    /// Make the next `count` subscribes fail with `LogError::Unavailable`.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state.lock().failing_subscribes = count;
    }

    /// Push a delivery error to every live subscriber.
    pub fn inject_delivery_error(&self, message: impl Into<String>) {
        let state = self.state.lock();
        let error = LogError::Delivery(message.into());
        for (id, sink) in &state.subscribers {
            let _ = sink.send(LogNotification::error(*id, error.clone()));
        }
    }

    /// Current contents in ordering-key order.
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    /// Number of successful appends.
    pub fn append_count(&self) -> usize {
        self.state.lock().append_count
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn subscribe(
        &self,
        order: SortOrder,
        sink: NotificationSink,
    ) -> LogResult<SubscriptionId> {
        let mut state = self.state.lock();
        // Appends always land in ascending key order, so the stored vector is
        // already in the only order we support.
        let SortOrder::CreatedAtAscending = order;

        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(LogError::Unavailable("simulated subscribe failure".to_string()));
        }

        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);

        sink.send(LogNotification::snapshot(id, state.messages.clone()))
            .map_err(|_| LogError::Unavailable("subscriber dropped".to_string()))?;
        state.subscribers.insert(id, sink);

        debug!("{}: opened {}", self.namespace, id);
        Ok(id)
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) -> LogResult<()> {
        let mut state = self.state.lock();
        state
            .subscribers
            .remove(&subscription)
            .map(|_| ())
            .ok_or(LogError::UnknownSubscription(subscription.0))
    }

    async fn append(&self, draft: MessageDraft) -> LogResult<AppendReceipt> {
        let mut state = self.state.lock();

        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(LogError::Unavailable("simulated append failure".to_string()));
        }
        if draft.text.trim().is_empty() {
            return Err(LogError::Rejected("empty text".to_string()));
        }

        let created_at = state.last_key.next();
        state.last_key = created_at;
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            text: draft.text,
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            created_at,
            server_time: Utc::now(),
        };
        let receipt = AppendReceipt {
            id: message.id.clone(),
            created_at,
        };

        state.messages.push(message);
        state.append_count += 1;
        state.broadcast();

        Ok(receipt)
    }
}

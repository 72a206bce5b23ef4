//! Send/reply orchestrator: the only write path into the message log.
//!
//! A send appends the human message and, when addressed to the responder,
//! asks the responder once and appends its reply strictly afterwards.
//! Nothing here is retried and nothing is merged into the local snapshot;
//! both messages come back through the log subscription.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::error::DuetError;
use crate::log::MessageLog;
use crate::responder::ResponderAdapter;
use crate::session::Session;
use crate::subscription::{ErrorSink, SubscriptionState};
use crate::types::{AppendReceipt, Identity, MessageDraft};

/// Why a send was dropped before touching the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    /// Text is empty after trimming
    EmptyText,
    /// Session has no ready identity
    NoIdentity,
    /// No live log subscription
    NotAttached,
    /// No conversation peer selected
    NoPeer,
}

impl fmt::Display for SendRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyText => "empty text",
            Self::NoIdentity => "no ready identity",
            Self::NotAttached => "not attached to the log",
            Self::NoPeer => "no peer selected",
        })
    }
}

/// Result of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Rejected(SendRejection),
    /// Human message appended; peer is not the responder
    Sent(AppendReceipt),
    /// Human message and responder reply appended, in that order
    Replied {
        message: AppendReceipt,
        reply: AppendReceipt,
    },
    /// Human message could not be appended; the responder was not asked
    AppendFailed(String),
    /// Human message appended but the reply append failed
    ReplyAppendFailed {
        message: AppendReceipt,
        error: String,
    },
}

impl SendOutcome {
    /// Whether the human message reached the log.
    pub fn delivered(&self) -> bool {
        matches!(
            self,
            Self::Sent(_) | Self::Replied { .. } | Self::ReplyAppendFailed { .. }
        )
    }
}

type Lane = Arc<tokio::sync::Mutex<()>>;
type LaneKey = (Identity, Identity);

/// Owns the send pipeline.
pub struct SendOrchestrator {
    log: Arc<dyn MessageLog>,
    responder: ResponderAdapter,
    responder_id: Identity,
    attachment: watch::Receiver<SubscriptionState>,
    errors: Arc<dyn ErrorSink>,
    lanes: Mutex<HashMap<LaneKey, Lane>>,
}

impl SendOrchestrator {
    pub fn new(
        log: Arc<dyn MessageLog>,
        responder: ResponderAdapter,
        responder_id: Identity,
        attachment: watch::Receiver<SubscriptionState>,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            log,
            responder,
            responder_id,
            attachment,
            errors,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn responder_id(&self) -> &Identity {
        &self.responder_id
    }

    /// Send `text` from the session's identity to `peer`.
    ///
    /// Sends within one conversation are serialized, so a responder reply
    /// always directly follows the message that triggered it. Rejections
    /// and append failures go to the error sink.
    pub async fn send(&self, text: &str, session: &Session, peer: &Identity) -> SendOutcome {
        let local = match self.check(text, session) {
            Ok(local) => local,
            Err(rejection) => {
                self.errors.report(&DuetError::SendRejected(format!(
                    "to {}: {}",
                    peer, rejection
                )));
                return SendOutcome::Rejected(rejection);
            }
        };

        let key = (local.clone(), peer.clone());
        let lane = self.lane(&key);
        let outcome = {
            let _turn = lane.lock().await;
            self.deliver(text, local, peer).await
        };
        drop(lane);
        self.release(&key);
        outcome
    }

    async fn deliver(&self, text: &str, local: &Identity, peer: &Identity) -> SendOutcome {
        let message = match self.log.append(MessageDraft::new(text, local, peer)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.errors.report(&DuetError::Append(format!(
                    "{} to {}: {}",
                    local, peer, e
                )));
                return SendOutcome::AppendFailed(e.to_string());
            }
        };

        if *peer != self.responder_id {
            return SendOutcome::Sent(message);
        }

        let reply_text = self.responder.reply(text).await;
        match self
            .log
            .append(MessageDraft::new(reply_text, &self.responder_id, local))
            .await
        {
            Ok(reply) => {
                info!("Responder replied to {} at {}", local, reply.created_at);
                SendOutcome::Replied { message, reply }
            }
            Err(e) => {
                self.errors.report(&DuetError::Append(format!(
                    "reply to {}: {}",
                    local, e
                )));
                SendOutcome::ReplyAppendFailed {
                    message,
                    error: e.to_string(),
                }
            }
        }
    }

    fn check<'s>(&self, text: &str, session: &'s Session) -> Result<&'s Identity, SendRejection> {
        if text.trim().is_empty() {
            return Err(SendRejection::EmptyText);
        }
        let local = session.identity().ok_or(SendRejection::NoIdentity)?;
        if !self.attachment.borrow().is_attached() {
            return Err(SendRejection::NotAttached);
        }
        Ok(local)
    }

    fn lane(&self, key: &LaneKey) -> Lane {
        self.lanes.lock().entry(key.clone()).or_default().clone()
    }

    /// Drop the lane once no send holds or waits on it.
    fn release(&self, key: &LaneKey) {
        let mut lanes = self.lanes.lock();
        if lanes
            .get(key)
            .map_or(false, |lane| Arc::strong_count(lane) == 1)
        {
            lanes.remove(key);
        }
    }

    /// Number of conversations with a send in flight.
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().len()
    }
}

//! Core types for the message log and conversations.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable subject id of a participant (a signed-in user or the responder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque message identifier assigned by the log on append.
pub type MessageId = String;

/// Server-assigned ordering key. Strictly increasing in append order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct OrderingKey(pub u64);

impl OrderingKey {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single record of the shared message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Log-assigned identifier
    pub id: MessageId,
    /// User-visible content
    pub text: String,
    /// Author of the message
    #[serde(rename = "senderId")]
    pub sender_id: Identity,
    /// Intended counterpart
    #[serde(rename = "receiverId")]
    pub receiver_id: Identity,
    /// Log-assigned ordering key
    #[serde(rename = "createdAt")]
    pub created_at: OrderingKey,
    /// Wall-clock time the log accepted the message. Informational only;
    /// records without it get the time they were read.
    #[serde(rename = "serverTime", default = "Utc::now")]
    pub server_time: DateTime<Utc>,
}

impl Message {
    /// Whether this message belongs to the conversation between `a` and `b`.
    ///
    /// Membership is defined on the unordered sender/receiver pair.
    pub fn involves_pair(&self, a: &Identity, b: &Identity) -> bool {
        (self.sender_id == *a && self.receiver_id == *b)
            || (self.sender_id == *b && self.receiver_id == *a)
    }
}

/// A message as submitted by a writer, before the log assigns id and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub text: String,
    #[serde(rename = "senderId")]
    pub sender_id: Identity,
    #[serde(rename = "receiverId")]
    pub receiver_id: Identity,
}

impl MessageDraft {
    pub fn new(text: impl Into<String>, sender: &Identity, receiver: &Identity) -> Self {
        Self {
            text: text.into(),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
        }
    }
}

/// What the log hands back for a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub id: MessageId,
    #[serde(rename = "createdAt")]
    pub created_at: OrderingKey,
}

/// The full ordered sequence of messages currently known locally.
///
/// Always replaced as a whole value, never patched.
pub type Snapshot = Arc<[Message]>;

/// An empty snapshot.
pub fn empty_snapshot() -> Snapshot {
    Arc::from(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: &str, to: &str) -> Message {
        Message {
            id: "m1".to_string(),
            text: "hi".to_string(),
            sender_id: from.into(),
            receiver_id: to.into(),
            created_at: OrderingKey(1),
            server_time: Utc::now(),
        }
    }

    #[test]
    fn test_pair_membership_is_unordered() {
        let m = message("alice", "bob");
        let alice = Identity::from("alice");
        let bob = Identity::from("bob");
        let carol = Identity::from("carol");

        assert!(m.involves_pair(&alice, &bob));
        assert!(m.involves_pair(&bob, &alice));
        assert!(!m.involves_pair(&alice, &carol));
        assert!(!m.involves_pair(&alice, &alice));
    }

    #[test]
    fn test_message_wire_names() {
        let m = message("alice", "bob");
        let json = serde_json::to_value(&m).unwrap();

        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["receiverId"], "bob");
        assert_eq!(json["createdAt"], 1);
        assert!(json.get("serverTime").is_some());
    }

    #[test]
    fn test_ordering_key_next() {
        assert_eq!(OrderingKey(7).next(), OrderingKey(8));
        assert!(OrderingKey(1) < OrderingKey(2));
    }
}

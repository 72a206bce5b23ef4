//! Two-party conversation views derived from the shared log.
//!
//! There are no conversation records. A conversation is the subsequence of
//! the snapshot whose unordered sender/receiver pair matches, recomputed
//! in one O(n) pass whenever the snapshot changes.

use std::sync::Arc;

use crate::types::{Identity, Message, Snapshot};

/// Messages exchanged between `local` and `peer`, in snapshot order.
///
/// The snapshot is already in log order; this never re-sorts.
pub fn project(snapshot: &[Message], local: &Identity, peer: &Identity) -> Vec<Message> {
    snapshot
        .iter()
        .filter(|m| m.involves_pair(local, peer))
        .cloned()
        .collect()
}

/// Memoized projection for one (local, peer) pair.
///
/// Recomputes only when handed a different snapshot allocation or pair.
#[derive(Debug, Default)]
pub struct ConversationView {
    cached: Option<CachedProjection>,
}

#[derive(Debug)]
struct CachedProjection {
    snapshot: Snapshot,
    local: Identity,
    peer: Identity,
    messages: Arc<[Message]>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &mut self,
        snapshot: &Snapshot,
        local: &Identity,
        peer: &Identity,
    ) -> Arc<[Message]> {
        if let Some(cached) = &self.cached {
            if Arc::ptr_eq(&cached.snapshot, snapshot)
                && cached.local == *local
                && cached.peer == *peer
            {
                return cached.messages.clone();
            }
        }

        let messages: Arc<[Message]> = Arc::from(project(snapshot, local, peer));
        self.cached = Some(CachedProjection {
            snapshot: snapshot.clone(),
            local: local.clone(),
            peer: peer.clone(),
            messages: messages.clone(),
        });
        messages
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

//! # duet_core
//!
//! Real-time message synchronization and auto-reply orchestration for duet.
//!
//! A single append-only, server-ordered message log is shared by everyone.
//! This crate keeps a local, always-consistent copy of it, derives two-party
//! conversations from it, and owns the write path, including the automated
//! responder that answers every human message addressed to it exactly once.
//!
//! # Architecture
//!
//! ```text
//! IdentityProvider ──ready──▶ SubscriptionManager ──snapshot──▶ project()
//!                                    ▲                              │
//!                                    │ push                         ▼
//!                               MessageLog ◀──append── SendOrchestrator ──▶ ResponderService
//! ```
//!
//! - **Session**: local identity lifecycle (`uninitialized → authenticating → ready | failed`)
//! - **SubscriptionManager**: one live subscription while an identity is ready;
//!   every push replaces the whole snapshot
//! - **project**: pure O(n) filter from snapshot to conversation
//! - **SendOrchestrator**: appends human messages and responder replies
//! - **ChatEngine**: single dispatcher loop tying the above together
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use duet_core::{
//!     AnonymousIdentityProvider, ChatEngine, DuetConfig, MemoryLog, ScriptedResponder,
//! };
//!
//! # async fn run() -> duet_core::DuetResult<()> {
//! let config = DuetConfig::default();
//! let log = Arc::new(MemoryLog::new(config.namespace.clone()));
//! let engine = ChatEngine::new(
//!     config.clone(),
//!     log,
//!     Arc::new(ScriptedResponder::echo()),
//!     Arc::new(AnonymousIdentityProvider),
//! )
//! .start();
//!
//! engine.ready().await?;
//! engine.select_peer(config.responder_identity())?;
//! let outcome = engine.send("hello").await?;
//! println!("{:?}", outcome);
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod log;
pub mod memory;
pub mod orchestrator;
pub mod responder;
pub mod session;
pub mod subscription;
pub mod types;

pub use config::{DuetConfig, ResponderProvider};
pub use conversation::{project, ConversationView};
pub use engine::{ChatEngine, EngineCommand, EngineHandle};
pub use error::{DuetError, DuetResult, LogError, ResponderError};
pub use log::{LogNotification, LogResult, MessageLog, NotificationSink, SortOrder, SubscriptionId};
pub use memory::MemoryLog;
pub use orchestrator::{SendOrchestrator, SendOutcome, SendRejection};
pub use responder::{
    fallback_for, ResponderAdapter, ResponderService, ScriptedReply, ScriptedResponder,
    CONNECTIVITY_FALLBACK, MALFORMED_FALLBACK,
};
pub use session::{
    AnonymousIdentityProvider, IdentityProvider, Session, SessionState, TokenIdentityProvider,
};
pub use subscription::{
    ApplyOutcome, CollectingErrorSink, ErrorSink, SubscriptionManager, SubscriptionState,
    TracingErrorSink,
};
pub use types::{
    empty_snapshot, AppendReceipt, Identity, Message, MessageDraft, MessageId, OrderingKey,
    Snapshot,
};

//! Event-driven chat engine.
//!
//! One dispatcher task owns the session, the subscription manager and the
//! selected peer. It reacts to three kinds of events, one at a time:
//! identity changes, log pushes and user intents. Sends run as separate
//! tasks so log pushes keep flowing while a responder call is pending.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::DuetConfig;
use crate::conversation::ConversationView;
use crate::error::{DuetError, DuetResult};
use crate::log::{LogNotification, MessageLog};
use crate::orchestrator::{SendOrchestrator, SendOutcome, SendRejection};
use crate::responder::{ResponderAdapter, ResponderService};
use crate::session::{IdentityProvider, Session, SessionState};
use crate::subscription::{
    ApplyOutcome, ErrorSink, SubscriptionManager, SubscriptionState, TracingErrorSink,
};
use crate::types::{Identity, Message, Snapshot};

/// User intents accepted by the dispatcher.
#[derive(Debug)]
pub enum EngineCommand {
    /// Run sign-in again (after a failure or sign-out)
    SignIn,
    /// Choose the conversation counterpart
    SelectPeer(Identity),
    /// Send text to the selected peer
    Send {
        text: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    /// Detach, sign out and drop the identity
    SignOut { done: oneshot::Sender<()> },
    /// Sign out and stop the dispatcher
    Shutdown,
}

/// Builder for the engine.
pub struct ChatEngine {
    config: DuetConfig,
    log: Arc<dyn MessageLog>,
    responder: Arc<dyn ResponderService>,
    provider: Arc<dyn IdentityProvider>,
    errors: Arc<dyn ErrorSink>,
}

impl ChatEngine {
    pub fn new(
        config: DuetConfig,
        log: Arc<dyn MessageLog>,
        responder: Arc<dyn ResponderService>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            log,
            responder,
            provider,
            errors: Arc::new(TracingErrorSink),
        }
    }

    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    /// Spawn the dispatcher. Sign-in starts immediately.
    pub fn start(self) -> EngineHandle {
        let (manager, notifications) =
            SubscriptionManager::new(self.log.clone(), self.errors.clone());
        let orchestrator = Arc::new(SendOrchestrator::new(
            self.log.clone(),
            ResponderAdapter::new(self.responder, self.config.responder_timeout()),
            self.config.responder_identity(),
            manager.watch_state(),
            self.errors.clone(),
        ));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(SessionState::Uninitialized);
        let (conversation_tx, conversation_rx) =
            watch::channel::<Arc<[Message]>>(Arc::from(Vec::new()));
        let (peer_tx, peer_rx) = watch::channel(None);

        let subscription_rx = manager.watch_state();
        let snapshot_rx = manager.watch_snapshot();

        let dispatcher = Dispatcher {
            session: Session::new(),
            session_tx,
            provider: self.provider,
            errors: self.errors,
            manager,
            orchestrator,
            peer_tx,
            view: ConversationView::new(),
            conversation_tx,
        };
        let task = tokio::spawn(dispatcher.run(commands_rx, notifications));

        EngineHandle {
            commands: commands_tx,
            session: session_rx,
            subscription: subscription_rx,
            snapshot: snapshot_rx,
            conversation: conversation_rx,
            peer: peer_rx,
            task,
        }
    }
}

/// Client side of a running engine.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    session: watch::Receiver<SessionState>,
    subscription: watch::Receiver<SubscriptionState>,
    snapshot: watch::Receiver<Snapshot>,
    conversation: watch::Receiver<Arc<[Message]>>,
    peer: watch::Receiver<Option<Identity>>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    fn command(&self, command: EngineCommand) -> DuetResult<()> {
        self.commands
            .send(command)
            .map_err(|_| DuetError::EngineStopped)
    }

    pub fn sign_in(&self) -> DuetResult<()> {
        self.command(EngineCommand::SignIn)
    }

    pub fn select_peer(&self, peer: impl Into<Identity>) -> DuetResult<()> {
        self.command(EngineCommand::SelectPeer(peer.into()))
    }

    /// Send to the selected peer and wait for the pipeline to finish.
    pub async fn send(&self, text: impl Into<String>) -> DuetResult<SendOutcome> {
        let (reply, rx) = oneshot::channel();
        self.command(EngineCommand::Send {
            text: text.into(),
            reply,
        })?;
        rx.await.map_err(|_| DuetError::EngineStopped)
    }

    pub async fn sign_out(&self) -> DuetResult<()> {
        let (done, rx) = oneshot::channel();
        self.command(EngineCommand::SignOut { done })?;
        rx.await.map_err(|_| DuetError::EngineStopped)
    }

    /// Stop the dispatcher and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
        let _ = self.task.await;
    }

    pub fn session(&self) -> SessionState {
        self.session.borrow().clone()
    }

    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    pub fn watch_subscription(&self) -> watch::Receiver<SubscriptionState> {
        self.subscription.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Current conversation with the selected peer.
    pub fn conversation(&self) -> Arc<[Message]> {
        self.conversation.borrow().clone()
    }

    pub fn watch_conversation(&self) -> watch::Receiver<Arc<[Message]>> {
        self.conversation.clone()
    }

    pub fn peer(&self) -> Option<Identity> {
        self.peer.borrow().clone()
    }

    /// Wait until sign-in settles. Returns the identity when ready.
    pub async fn ready(&self) -> DuetResult<Option<Identity>> {
        let mut session = self.session.clone();
        let state = session
            .wait_for(|s| matches!(s, SessionState::Ready(_) | SessionState::Failed(_)))
            .await
            .map_err(|_| DuetError::EngineStopped)?;
        Ok(match &*state {
            SessionState::Ready(identity) => Some(identity.clone()),
            _ => None,
        })
    }
}

struct Dispatcher {
    session: Session,
    session_tx: watch::Sender<SessionState>,
    provider: Arc<dyn IdentityProvider>,
    errors: Arc<dyn ErrorSink>,
    manager: SubscriptionManager,
    orchestrator: Arc<SendOrchestrator>,
    peer_tx: watch::Sender<Option<Identity>>,
    view: ConversationView,
    conversation_tx: watch::Sender<Arc<[Message]>>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        mut notifications: mpsc::UnboundedReceiver<LogNotification>,
    ) {
        self.sign_in().await;

        loop {
            tokio::select! {
                biased;
                Some(notification) = notifications.recv() => {
                    if let ApplyOutcome::Replaced(_) = self.manager.apply(notification) {
                        self.publish_conversation();
                    }
                }
                command = commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => {
                        self.sign_out().await;
                        break;
                    }
                    Some(command) => self.handle(command).await,
                },
            }
        }
        info!("Engine stopped");
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SignIn => self.sign_in().await,
            EngineCommand::SelectPeer(peer) => {
                debug!("Selected peer {}", peer);
                self.peer_tx.send_replace(Some(peer));
                self.publish_conversation();
            }
            EngineCommand::Send { text, reply } => self.spawn_send(text, reply),
            EngineCommand::SignOut { done } => {
                self.sign_out().await;
                let _ = done.send(());
            }
            EngineCommand::Shutdown => {}
        }
    }

    async fn sign_in(&mut self) {
        if let Some(identity) = self.session.identity().cloned() {
            // Ready but detached means the last subscribe failed.
            if !self.manager.is_attached() {
                self.attach(&identity).await;
                self.publish_conversation();
            }
            return;
        }

        if let Err(e) = self.session.begin() {
            self.errors.report(&e);
            return;
        }
        self.session_tx.send_replace(self.session.state().clone());

        let result = self
            .session
            .settle(self.provider.as_ref())
            .await
            .map(|state| state.clone());
        self.session_tx.send_replace(self.session.state().clone());

        match result {
            Ok(SessionState::Ready(identity)) => self.attach(&identity).await,
            Ok(SessionState::Failed(reason)) => {
                self.errors.report(&DuetError::Bootstrap(reason));
            }
            Ok(_) => {}
            Err(e) => self.errors.report(&e),
        }
        self.publish_conversation();
    }

    /// The manager reports subscribe failures; the session stays ready so
    /// a later `SignIn` can retry.
    async fn attach(&mut self, identity: &Identity) {
        if let Err(e) = self.manager.attach(identity).await {
            debug!("Attach failed: {}", e);
        }
    }

    async fn sign_out(&mut self) {
        self.manager.detach().await;
        if let Some(identity) = self.session.sign_out() {
            if let Err(e) = self.provider.sign_out(&identity).await {
                self.errors.report(&e);
            }
            info!("Signed out {}", identity);
        }
        self.session_tx.send_replace(self.session.state().clone());
        self.view.invalidate();
        self.publish_conversation();
    }

    fn spawn_send(&self, text: String, reply: oneshot::Sender<SendOutcome>) {
        let orchestrator = self.orchestrator.clone();
        let session = self.session.clone();
        let peer = self.peer_tx.borrow().clone();

        tokio::spawn(async move {
            let outcome = match peer {
                Some(peer) => orchestrator.send(&text, &session, &peer).await,
                None => SendOutcome::Rejected(SendRejection::NoPeer),
            };
            let _ = reply.send(outcome);
        });
    }

    fn publish_conversation(&mut self) {
        let peer = self.peer_tx.borrow().clone();
        let messages = match (self.session.identity(), peer) {
            (Some(local), Some(peer)) => {
                let snapshot = self.manager.snapshot();
                self.view.get(&snapshot, local, &peer)
            }
            _ => Arc::from(Vec::new()),
        };
        self.conversation_tx.send_replace(messages);
    }
}

//! Integration tests for the chat engine.
//!
//! These drive the dispatcher end to end against the in-memory log and a
//! scripted responder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duet_core::{
    ChatEngine, CollectingErrorSink, DuetConfig, DuetResult, EngineHandle, Identity,
    IdentityProvider, MemoryLog, MessageDraft, MessageLog, ScriptedReply, ScriptedResponder,
    SendOutcome, SendRejection, SessionState, TokenIdentityProvider, CONNECTIVITY_FALLBACK,
};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    log: MemoryLog,
    responder: ScriptedResponder,
    errors: CollectingErrorSink,
    engine: EngineHandle,
}

fn start(token: &str, responder: ScriptedResponder) -> Harness {
    start_on(MemoryLog::new(DuetConfig::default().namespace), token, responder)
}

fn start_on(log: MemoryLog, token: &str, responder: ScriptedResponder) -> Harness {
    let config = DuetConfig::default();
    let errors = CollectingErrorSink::new();
    let engine = ChatEngine::new(
        config,
        Arc::new(log.clone()),
        Arc::new(responder.clone()),
        Arc::new(TokenIdentityProvider::new(token)),
    )
    .with_error_sink(Arc::new(errors.clone()))
    .start();

    Harness {
        log,
        responder,
        errors,
        engine,
    }
}

async fn wait_for_conversation(engine: &EngineHandle, len: usize) -> Vec<String> {
    let mut conversation = engine.watch_conversation();
    let messages = tokio::time::timeout(WAIT, conversation.wait_for(|c| c.len() == len))
        .await
        .expect("conversation did not reach expected length")
        .expect("engine stopped");
    messages.iter().map(|m| m.text.clone()).collect()
}

/// Sending to the responder yields the human turn followed by the reply.
#[tokio::test]
async fn test_send_to_responder_round_trips_through_log() {
    let h = start(
        "alice",
        ScriptedResponder::echo().add_reply(ScriptedReply::text("Hello Alice!")),
    );
    assert_eq!(h.engine.ready().await.unwrap(), Some(Identity::from("alice")));
    h.engine.select_peer("duet-responder").unwrap();

    let outcome = h.engine.send("hi there").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Replied { .. }));

    let texts = wait_for_conversation(&h.engine, 2).await;
    assert_eq!(texts, vec!["hi there", "Hello Alice!"]);

    let conversation = h.engine.conversation();
    assert_eq!(conversation[0].sender_id, Identity::from("alice"));
    assert_eq!(conversation[1].sender_id, Identity::from("duet-responder"));
    assert!(conversation[1].created_at > conversation[0].created_at);

    h.engine.shutdown().await;
}

/// Transport failures still produce a reply turn.
#[tokio::test]
async fn test_responder_outage_replies_with_fallback() {
    let h = start(
        "alice",
        ScriptedResponder::echo().add_reply(ScriptedReply::transport_error("dns failure")),
    );
    h.engine.ready().await.unwrap();
    h.engine.select_peer("duet-responder").unwrap();
    h.engine.send("anyone there?").await.unwrap();

    let texts = wait_for_conversation(&h.engine, 2).await;
    assert_eq!(texts[1], CONNECTIVITY_FALLBACK);
    assert_eq!(h.responder.call_count(), 1);

    h.engine.shutdown().await;
}

/// The conversation only shows the selected pair.
#[tokio::test]
async fn test_conversation_follows_selected_peer() {
    let h = start("alice", ScriptedResponder::echo());
    h.engine.ready().await.unwrap();

    // Other participants write to the shared log directly.
    let alice = Identity::from("alice");
    let bob = Identity::from("bob");
    let carol = Identity::from("carol");
    h.log.append(MessageDraft::new("hi alice", &bob, &alice)).await.unwrap();
    h.log.append(MessageDraft::new("hi bob", &carol, &bob)).await.unwrap();
    h.log.append(MessageDraft::new("psst", &carol, &alice)).await.unwrap();

    h.engine.select_peer("bob").unwrap();
    assert_eq!(wait_for_conversation(&h.engine, 1).await, vec!["hi alice"]);

    h.engine.send("hey bob").await.unwrap();
    assert_eq!(
        wait_for_conversation(&h.engine, 2).await,
        vec!["hi alice", "hey bob"]
    );

    h.engine.select_peer("carol").unwrap();
    assert_eq!(wait_for_conversation(&h.engine, 1).await, vec!["psst"]);
    assert_eq!(h.engine.snapshot().len(), 4);
    assert_eq!(h.responder.call_count(), 0);

    h.engine.shutdown().await;
}

/// A failed sign-in leaves the engine inert.
#[tokio::test]
async fn test_failed_bootstrap_is_inert() {
    let h = start("", ScriptedResponder::echo());
    assert_eq!(h.engine.ready().await.unwrap(), None);
    assert!(matches!(h.engine.session(), SessionState::Failed(_)));
    assert!(!h.engine.watch_subscription().borrow().is_attached());

    h.engine.select_peer("duet-responder").unwrap();
    let outcome = h.engine.send("hello?").await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(SendRejection::NoIdentity));

    assert_eq!(h.log.append_count(), 0);
    assert!(h.errors.reports().iter().any(|r| r.contains("Bootstrap")));

    h.engine.shutdown().await;
}

/// Blank input never reaches the log.
#[tokio::test]
async fn test_blank_send_appends_nothing() {
    let h = start("alice", ScriptedResponder::echo());
    h.engine.ready().await.unwrap();
    h.engine.select_peer("duet-responder").unwrap();

    let outcome = h.engine.send("   ").await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(SendRejection::EmptyText));
    assert_eq!(h.log.append_count(), 0);
    assert_eq!(h.responder.call_count(), 0);

    h.engine.shutdown().await;
}

/// Sending without a selected peer is rejected.
#[tokio::test]
async fn test_send_without_peer_is_rejected() {
    let h = start("alice", ScriptedResponder::echo());
    h.engine.ready().await.unwrap();

    let outcome = h.engine.send("hello").await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(SendRejection::NoPeer));

    h.engine.shutdown().await;
}

/// After sign-out the snapshot no longer follows the log.
#[tokio::test]
async fn test_sign_out_detaches_and_ignores_late_pushes() {
    let h = start("alice", ScriptedResponder::echo());
    h.engine.ready().await.unwrap();
    h.engine.select_peer("bob").unwrap();
    h.engine.send("before").await.unwrap();
    wait_for_conversation(&h.engine, 1).await;

    h.engine.sign_out().await.unwrap();
    assert_eq!(h.engine.session(), SessionState::Uninitialized);
    assert_eq!(h.log.subscriber_count(), 0);
    assert!(h.engine.conversation().is_empty());

    let alice = Identity::from("alice");
    let bob = Identity::from("bob");
    h.log.append(MessageDraft::new("after", &bob, &alice)).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(h.engine.snapshot().len(), 1);

    let outcome = h.engine.send("nope").await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(SendRejection::NoIdentity));

    // Signing back in catches up with everything appended meanwhile.
    h.engine.sign_in().unwrap();
    assert_eq!(h.engine.ready().await.unwrap(), Some(alice));
    assert_eq!(
        wait_for_conversation(&h.engine, 2).await,
        vec!["before", "after"]
    );

    h.engine.shutdown().await;
}

/// Delivery errors are reported and the last snapshot is kept.
#[tokio::test]
async fn test_delivery_error_keeps_snapshot() {
    let h = start("alice", ScriptedResponder::echo());
    h.engine.ready().await.unwrap();
    h.engine.select_peer("bob").unwrap();
    h.engine.send("kept").await.unwrap();
    wait_for_conversation(&h.engine, 1).await;

    h.log.inject_delivery_error("connection reset");
    h.engine.send("still works").await.unwrap();

    assert_eq!(
        wait_for_conversation(&h.engine, 2).await,
        vec!["kept", "still works"]
    );
    assert!(h
        .errors
        .reports()
        .iter()
        .any(|r| r.contains("connection reset")));

    h.engine.shutdown().await;
}

/// Rapid sends to the responder keep each reply right after its message.
#[tokio::test]
async fn test_rapid_sends_stay_paired() {
    let h = start(
        "alice",
        ScriptedResponder::echo().with_replies(vec![
            ScriptedReply::Delayed(Duration::from_millis(50), "first reply".to_string()),
            ScriptedReply::text("second reply"),
        ]),
    );
    h.engine.ready().await.unwrap();
    h.engine.select_peer("duet-responder").unwrap();

    let (a, b) = tokio::join!(h.engine.send("first"), h.engine.send("second"));
    assert!(a.unwrap().delivered());
    assert!(b.unwrap().delivered());

    assert_eq!(
        wait_for_conversation(&h.engine, 4).await,
        vec!["first", "first reply", "second", "second reply"]
    );

    h.engine.shutdown().await;
}

/// Appends from the log are namespaced to the configured deployment.
#[tokio::test]
async fn test_log_namespace_comes_from_config() {
    let h = start("alice", ScriptedResponder::echo());
    assert_eq!(h.log.namespace(), DuetConfig::default().namespace);
    h.engine.shutdown().await;
}

/// A failed subscribe leaves the identity ready; signing in again attaches.
#[tokio::test]
async fn test_sign_in_retries_failed_subscribe() {
    let log = MemoryLog::new(DuetConfig::default().namespace);
    log.fail_next_subscribes(1);
    let h = start_on(log, "alice", ScriptedResponder::echo());

    assert_eq!(h.engine.ready().await.unwrap(), Some(Identity::from("alice")));
    h.engine.select_peer("bob").unwrap();

    let outcome = h.engine.send("too early").await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(SendRejection::NotAttached));
    assert_eq!(h.log.subscriber_count(), 0);
    assert!(h
        .errors
        .reports()
        .iter()
        .any(|r| r.contains("simulated subscribe failure")));

    h.engine.sign_in().unwrap();
    let mut subscription = h.engine.watch_subscription();
    tokio::time::timeout(WAIT, subscription.wait_for(|s| s.is_attached()))
        .await
        .expect("never attached")
        .expect("engine stopped");
    assert_eq!(h.log.subscriber_count(), 1);
    assert_eq!(h.engine.session(), SessionState::Ready(Identity::from("alice")));

    let outcome = h.engine.send("hi").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(_)));
    assert_eq!(wait_for_conversation(&h.engine, 1).await, vec!["hi"]);

    // Already attached: another sign-in opens nothing new.
    h.engine.sign_in().unwrap();
    h.engine.send("again").await.unwrap();
    assert_eq!(h.log.subscriber_count(), 1);

    h.engine.shutdown().await;
}

struct SlowProvider(Duration);

#[async_trait]
impl IdentityProvider for SlowProvider {
    async fn sign_in(&self) -> DuetResult<Identity> {
        tokio::time::sleep(self.0).await;
        Ok(Identity::from("alice"))
    }

    async fn sign_out(&self, _identity: &Identity) -> DuetResult<()> {
        Ok(())
    }
}

/// Observers see the session while the provider is still working.
#[tokio::test]
async fn test_session_is_authenticating_during_sign_in() {
    let config = DuetConfig::default();
    let engine = ChatEngine::new(
        config.clone(),
        Arc::new(MemoryLog::new(config.namespace.clone())),
        Arc::new(ScriptedResponder::echo()),
        Arc::new(SlowProvider(Duration::from_millis(200))),
    )
    .start();

    let mut session = engine.watch_session();
    tokio::time::timeout(
        WAIT,
        session.wait_for(|s| *s == SessionState::Authenticating),
    )
    .await
    .expect("never authenticating")
    .expect("engine stopped");

    assert_eq!(engine.ready().await.unwrap(), Some(Identity::from("alice")));
    engine.shutdown().await;
}

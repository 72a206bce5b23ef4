//! Tests for the HTTP responder that need no live API.

use std::sync::Arc;
use std::time::Duration;

use duet_core::{ResponderAdapter, ResponderError, ResponderService, CONNECTIVITY_FALLBACK};
use duet_responder::{parse_response, HttpResponder, LlmProvider};

fn unreachable(provider: LlmProvider) -> HttpResponder {
    // Port 1 on loopback refuses connections immediately.
    HttpResponder::new(provider, "test-key", None).with_base_url("http://127.0.0.1:1/v1")
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    for provider in [LlmProvider::OpenAI, LlmProvider::Anthropic] {
        let result = unreachable(provider)
            .complete("hello", Duration::from_secs(5))
            .await;
        assert!(
            matches!(result, Err(ResponderError::Transport(_))),
            "unexpected result for {}: {:?}",
            provider.name(),
            result
        );
    }
}

#[tokio::test]
async fn test_adapter_turns_outage_into_fallback_reply() {
    let adapter = ResponderAdapter::new(
        Arc::new(unreachable(LlmProvider::OpenAI)),
        Duration::from_secs(5),
    );
    assert_eq!(adapter.reply("hello").await, CONNECTIVITY_FALLBACK);
}

#[test]
fn test_parses_real_world_openai_payload() {
    let body = br#"{
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-5-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Sure, happy to help."},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 6, "total_tokens": 15}
    }"#;
    assert_eq!(
        parse_response(LlmProvider::OpenAI, body).unwrap(),
        "Sure, happy to help."
    );
}

#[test]
fn test_parses_real_world_anthropic_payload() {
    let body = br#"{
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4.5",
        "content": [{"type": "text", "text": "Hi! What can I do for you?"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 12}
    }"#;
    assert_eq!(
        parse_response(LlmProvider::Anthropic, body).unwrap(),
        "Hi! What can I do for you?"
    );
}

#[test]
fn test_error_payload_is_malformed() {
    let body = br#"{"error": {"type": "invalid_request_error", "message": "bad"}}"#;
    assert!(matches!(
        parse_response(LlmProvider::Anthropic, body),
        Err(ResponderError::Malformed(_))
    ));
}

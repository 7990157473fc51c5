//! Tests for the AI client against a stubbed Messages API.
//!
//! Verifies the structured-output contract: valid JSON parses into typed
//! values, invalid responses degrade to the documented defaults, and
//! summarization propagates failures instead of degrading.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dealpulse_core::ai::{AiCapability, ClaudeClient};
use dealpulse_core::config::AiConfig;
use dealpulse_core::db::Sentiment;

fn client_for(server: &MockServer) -> ClaudeClient {
    ClaudeClient::with_http(
        reqwest::Client::new(),
        AiConfig {
            api_key: "test-key".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            base_url: server.uri(),
            max_tokens: 4096,
            timeout_secs: 5,
        },
    )
}

fn text_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-3-5-sonnet-20241022",
        "stop_reason": "end_turn"
    }))
}

#[tokio::test]
async fn summarize_returns_model_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response("Two-sentence summary of the SPA."))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let summary = client
        .summarize("Share Purchase Agreement.pdf", "")
        .await
        .unwrap();
    assert_eq!(summary, "Two-sentence summary of the SPA.");
}

#[tokio::test]
async fn summarize_propagates_api_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.summarize("doc.pdf", "").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn classify_parses_valid_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response(
            r#"{"workstream": "Legal", "confidence": 92, "reasoning": "NDA terms"}"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let classification = client.classify("NDA.pdf", "").await.unwrap();
    assert_eq!(classification.workstream, "Legal");
    assert_eq!(classification.confidence, 92);
}

#[tokio::test]
async fn classify_parses_fenced_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response(
            "```json\n{\"workstream\": \"Finance\", \"confidence\": 70, \"reasoning\": \"x\"}\n```",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let classification = client.classify("Budget.xlsx", "").await.unwrap();
    assert_eq!(classification.workstream, "Finance");
}

#[tokio::test]
async fn classify_falls_back_on_unparseable_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response("I think this belongs in Legal, probably."))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let classification = client.classify("doc.pdf", "").await.unwrap();
    assert_eq!(classification.workstream, "Ops");
    assert_eq!(classification.confidence, 0);
}

#[tokio::test]
async fn sentiment_degrades_to_neutral_on_api_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let analysis = client
        .analyze_sentiment("Subject", "body", "sender@example.com")
        .await
        .unwrap();
    assert_eq!(analysis.sentiment, Sentiment::Neutral);
    assert!(!analysis.is_blocker);
}

#[tokio::test]
async fn sentiment_parses_blocker_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response(
            r#"{"sentiment": "blocker", "isBlocker": true, "blockerReason": "waiting on signature", "keyPoints": ["signature pending"]}"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let analysis = client
        .analyze_sentiment("Re: signature", "still waiting", "counsel@example.com")
        .await
        .unwrap();
    assert_eq!(analysis.sentiment, Sentiment::Blocker);
    assert!(analysis.is_blocker);
}

#[tokio::test]
async fn thread_blocker_degrades_on_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response("{\"hasBlocker\": \"definitely\"}"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let detection = client.detect_thread_blocker(&[]).await.unwrap();
    assert!(!detection.has_blocker);
}

#[tokio::test]
async fn extract_risks_parses_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_response(
            r#"[{"title": "Uncapped indemnity", "severity": "high", "citation": "Section 9.2", "explanation": "No liability cap"}]"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let risks = client.extract_risks("SPA.pdf", "").await.unwrap();
    assert_eq!(risks.len(), 1);
    assert_eq!(risks[0].title, "Uncapped indemnity");
}

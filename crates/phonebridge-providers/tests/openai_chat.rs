//! OpenAI chat client against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use phonebridge_core::session::{Role, Turn};
use phonebridge_providers::ChatModel;
use phonebridge_providers::openai::OpenAiChat;

fn transcript() -> Vec<Turn> {
    vec![
        Turn::new(Role::System, "Réponds en français."),
        Turn::new(Role::User, "Bonjour"),
    ]
}

#[tokio::test]
async fn test_reply_returns_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 0.7,
            "max_tokens": 2000,
            "messages": [
                {"role": "system", "content": "Réponds en français."},
                {"role": "user", "content": "Bonjour"},
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Bonjour ! Que puis-je faire ?"}}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(Some(&server.uri()));
    let reply = chat.reply("sk-test", &transcript(), "gpt-4o-mini").await.unwrap();
    assert_eq!(reply, "Bonjour ! Que puis-je faire ?");
}

#[tokio::test]
async fn test_http_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "rate limited"}})),
        )
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(Some(&server.uri()));
    let err = chat
        .reply("sk-test", &transcript(), "gpt-4o-mini")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("429"), "got: {err}");
}

#[tokio::test]
async fn test_missing_key_fails_without_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(Some(&server.uri()));
    assert!(chat.reply("", &transcript(), "gpt-4o-mini").await.is_err());
}

use axum::{Router, extract::Json, http::StatusCode, routing::post};
use chrono::Utc;
use luna_brain::{CompanionBrain, OpenAiBrain, ReplyRequest};
use luna_common::{CompanionId, Message, MessageSender, UserId};
use luna_db::{Appearance, Companion, Personality};
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn spawn_mock(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{port}")
}

fn companion() -> Companion {
    Companion {
        id: CompanionId::from_raw("c1"),
        owner_id: UserId::from_raw("u1"),
        workspace_id: None,
        name: "Nova".into(),
        personality: Personality {
            traits: vec!["witty".into(), "kind".into()],
            tone: Some("playful".into()),
            backstory: None,
            advanced: None,
        },
        appearance: Appearance::default(),
        config: json!({}),
        voice: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn mock_completion(Json(payload): Json<Value>) -> Json<Value> {
    assert_eq!(payload["model"], "gpt-test");
    let messages = payload["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    let system = messages[0]["content"].as_str().unwrap();
    assert!(system.contains("You are Nova"));
    assert!(system.contains("witty, kind"));
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[3]["content"], "How was your day?");

    Json(json!({
        "id": "chatcmpl-1",
        "model": "gpt-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "  Pretty great, thanks for asking!  " },
            "finish_reason": "stop"
        }]
    }))
}

#[tokio::test]
async fn reply_sends_persona_and_history() {
    let base = spawn_mock(Router::new().route("/v1/chat/completions", post(mock_completion))).await;
    let brain = OpenAiBrain::new("test-key", Some("gpt-test".into()), Some(base));
    let companion = companion();
    let history = [
        Message::new(MessageSender::User, "hi"),
        Message::new(MessageSender::Companion, "hello!"),
    ];

    let reply = brain
        .reply(&ReplyRequest {
            companion: &companion,
            history: &history,
            memories: &[],
            user_message: "How was your day?",
            emotions: &[],
            scenario: None,
        })
        .await
        .expect("reply");

    assert_eq!(reply, "Pretty great, thanks for asking!");
}

#[tokio::test]
async fn api_errors_surface_as_provider_errors() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
    );
    let base = spawn_mock(app).await;
    let brain = OpenAiBrain::new("wrong", None, Some(base));
    let companion = companion();

    let err = brain
        .reply(&ReplyRequest {
            companion: &companion,
            history: &[],
            memories: &[],
            user_message: "hello",
            emotions: &[],
            scenario: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, luna_common::Error::Provider(_)));
    assert!(err.to_string().contains("401"));
}

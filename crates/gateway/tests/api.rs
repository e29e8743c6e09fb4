use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use uuid::Uuid;

use sc_domain::config::Config;
use sc_domain::error::Result;
use sc_domain::model::{Conversation, User};
use sc_domain::stream::{StreamEvent, Usage};
use sc_gateway::api;
use sc_gateway::state::AppState;
use sc_providers::{CompletionClient, CompletionRequest, CompletionStream};
use sc_store::{DocumentStore, JsonDocumentStore};

/// Replies with a fixed list of deltas followed by a usage snapshot.
struct CannedClient {
    deltas: Vec<&'static str>,
}

#[async_trait::async_trait]
impl CompletionClient for CannedClient {
    async fn stream_completion(&self, _req: CompletionRequest) -> Result<CompletionStream> {
        let mut events: Vec<Result<StreamEvent>> = self
            .deltas
            .iter()
            .map(|d| Ok(StreamEvent::Token { text: d.to_string() }))
            .collect();
        events.push(Ok(StreamEvent::Done {
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            finish_reason: Some("stop".into()),
        }));
        Ok(CompletionStream::new(Box::pin(futures_util::stream::iter(events))))
    }

    fn provider_id(&self) -> &str {
        "canned"
    }
}

struct Harness {
    app: Router,
    store: Arc<JsonDocumentStore>,
    user: User,
    conversation: Conversation,
    _uploads: tempfile::TempDir,
}

async fn harness(api_token_hash: Option<Vec<u8>>) -> Harness {
    let uploads = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.uploads.dir = uploads.path().to_path_buf();

    let store = Arc::new(JsonDocumentStore::in_memory());
    store.ensure_schema().await.unwrap();
    let user = store.insert_user(User::new("u1@example.com", None)).await.unwrap();
    let conversation = store
        .insert_conversation(Conversation::new(user.id, None, "free-router".into()))
        .await
        .unwrap();

    let client = Arc::new(CannedClient {
        deltas: vec!["Hello", " world"],
    });
    let state = AppState::new(Arc::new(config), store.clone(), client, api_token_hash);
    let app = api::router(state.clone()).with_state(state);

    Harness {
        app,
        store,
        user,
        conversation,
        _uploads: uploads,
    }
}

impl Harness {
    fn request(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", self.user.id.to_string());
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn messages_uri(&self) -> String {
        format!("/api/conversations/{}/messages", self.conversation.id)
    }
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn send_message_streams_sse_frames() {
    let h = harness(None).await;
    let req = h.request("POST", &h.messages_uri(), Some(serde_json::json!({ "content": "Hi" })));

    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");
    assert_eq!(headers["x-accel-buffering"], "no");

    let body = body_string(resp).await;
    let expected = concat!(
        "data: {\"content\":\"Hello\"}\n\n",
        "data: {\"content\":\" world\"}\n\n",
        "data: {\"usage\":{\"promptTokens\":10,\"completionTokens\":5,\"totalTokens\":15}}\n\n",
        "data: [DONE]\n\n",
    );
    assert_eq!(body, expected);

    let msgs = h.store.list_messages(h.conversation.id).await.unwrap();
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[1].content, "Hello world");
    let conv = h
        .store
        .find_conversation(h.conversation.id, h.user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.title, "Hi");
}

#[tokio::test]
async fn duplicate_idempotency_key_is_409() {
    let h = harness(None).await;
    let send = || {
        let mut req = h.request("POST", &h.messages_uri(), Some(serde_json::json!({ "content": "Hi" })));
        req.headers_mut()
            .insert("idempotency-key", "attempt-1".parse().unwrap());
        req
    };

    let first = h.app.clone().oneshot(send()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    body_string(first).await;

    let second = h.app.clone().oneshot(send()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert!(body_string(second).await.contains("Duplicate message"));

    let user = h.store.find_user(h.user.id).await.unwrap().unwrap();
    assert_eq!(user.total_tokens_used, 15);
}

#[tokio::test]
async fn foreign_conversation_is_404() {
    let h = harness(None).await;
    let mut req = h.request("POST", &h.messages_uri(), Some(serde_json::json!({ "content": "Hi" })));
    req.headers_mut()
        .insert("x-user-id", Uuid::new_v4().to_string().parse().unwrap());

    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(h.store.list_messages(h.conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_and_empty_content_are_400() {
    let h = harness(None).await;
    for content in [String::new(), "x".repeat(10_001)] {
        let req = h.request("POST", &h.messages_uri(), Some(serde_json::json!({ "content": content })));
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn malformed_id_is_400() {
    let h = harness(None).await;
    let req = h.request("GET", "/api/conversations/not-a-uuid", None);
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_user_identity_is_401() {
    let h = harness(None).await;
    let req = Request::builder()
        .uri("/api/conversations")
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_token_is_enforced_when_configured() {
    use sha2::{Digest, Sha256};
    let h = harness(Some(Sha256::digest(b"s3cret").to_vec())).await;

    let resp = h
        .app
        .clone()
        .oneshot(h.request("GET", "/api/conversations", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let mut req = h.request("GET", "/api/conversations", None);
    req.headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = h.app.clone().oneshot(health).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn conversation_crud_round() {
    let h = harness(None).await;

    let created = h
        .app
        .clone()
        .oneshot(h.request(
            "POST",
            "/api/conversations",
            Some(serde_json::json!({ "title": "Plans" })),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: serde_json::Value = serde_json::from_str(&body_string(created).await).unwrap();
    assert_eq!(created["title"], "Plans");
    assert_eq!(created["model"], "openrouter/free");
    let id = created["id"].as_str().unwrap().to_string();

    let patched = h
        .app
        .clone()
        .oneshot(h.request(
            "PATCH",
            &format!("/api/conversations/{id}"),
            Some(serde_json::json!({ "model": "openrouter/auto" })),
        ))
        .await
        .unwrap();
    assert_eq!(patched.status(), StatusCode::OK);
    let patched: serde_json::Value = serde_json::from_str(&body_string(patched).await).unwrap();
    assert_eq!(patched["title"], "Plans");
    assert_eq!(patched["model"], "openrouter/auto");

    let listed = h
        .app
        .clone()
        .oneshot(h.request("GET", "/api/conversations", None))
        .await
        .unwrap();
    let listed: Vec<serde_json::Value> = serde_json::from_str(&body_string(listed).await).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["id"], id.as_str());

    let deleted = h
        .app
        .clone()
        .oneshot(h.request("DELETE", &format!("/api/conversations/{id}"), None))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = h
        .app
        .clone()
        .oneshot(h.request("GET", &format!("/api/conversations/{id}"), None))
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_is_returned_in_order() {
    let h = harness(None).await;
    let send = h.request("POST", &h.messages_uri(), Some(serde_json::json!({ "content": "Hi" })));
    body_string(h.app.clone().oneshot(send).await.unwrap()).await;

    let resp = h
        .app
        .clone()
        .oneshot(h.request("GET", &h.messages_uri(), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let msgs: Vec<serde_json::Value> = serde_json::from_str(&body_string(resp).await).unwrap();
    let roles: Vec<&str> = msgs.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
    assert_eq!(msgs[1]["usage"]["totalTokens"], 15);
}

#[tokio::test]
async fn models_catalog_lists_default() {
    let h = harness(None).await;
    let resp = h
        .app
        .clone()
        .oneshot(h.request("GET", "/api/models", None))
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(json["default"], "openrouter/free");
    assert_eq!(json["models"].as_array().unwrap().len(), 6);
}

//! HTTP behavior: the chat and embedding clients against a mock
//! OpenAI-compatible server, and the assistant's own API.

use std::fs;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;

use hr_assistant::assistant::Assistant;
use hr_assistant::config::{parse_config, EmbeddingConfig, GenerationConfig};
use hr_assistant::embedding::{create_embedder, OllamaEmbedder};
use hr_assistant::generation::ChatClient;
use hr_assistant::server::{router, ANSWER_KIND_HEADER};
use hr_assistant::source_fs::FolderSource;
use hr_retrieval_core::embedding::Embedder;
use hr_retrieval_core::generation::Generator;

// ============ Mock OpenAI-compatible service ============

#[derive(Default)]
struct Mock {
    hits: AtomicUsize,
    /// Respond with this status to the first `fail_first` requests.
    fail_first: usize,
    fail_status: u16,
}

async fn chat_completions(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    let hit = mock.hits.fetch_add(1, Ordering::SeqCst);
    if hit < mock.fail_first {
        let status = StatusCode::from_u16(mock.fail_status).unwrap();
        return (status, "try again later").into_response();
    }

    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
    if body["stream"] == json!(true) {
        let sse = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Casual "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"leave: 12 days."}}]}"#,
            "data: [DONE]",
        ]
        .join("\n\n")
            + "\n\n";
        return ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }

    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": format!("echo: {}", prompt) } }]
    }))
    .into_response()
}

async fn ollama_embed(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let embeddings: Vec<Value> = inputs
        .iter()
        .map(|t| json!([t.as_str().unwrap_or_default().len() as f64, 1.0]))
        .collect();
    Json(json!({ "embeddings": embeddings })).into_response()
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_mock(mock: Mock) -> (SocketAddr, Arc<Mock>) {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/api/embed", post(ollama_embed))
        .with_state(mock.clone());
    (spawn(app).await, mock)
}

fn chat_config(addr: SocketAddr) -> GenerationConfig {
    GenerationConfig {
        url: format!("http://{}/v1", addr),
        api_key_env: "HRBOT_TEST_UNSET_KEY".to_string(),
        max_retries: 1,
        timeout_secs: 10,
        ..GenerationConfig::default()
    }
}

#[tokio::test]
async fn test_chat_generate() {
    let (addr, mock) = spawn_mock(Mock::default()).await;
    let client = ChatClient::new(&chat_config(addr)).unwrap();

    let text = client.generate("hello there").await.unwrap();
    assert_eq!(text, "echo: hello there");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_chat_stream_deltas() {
    let (addr, _) = spawn_mock(Mock::default()).await;
    let client = ChatClient::new(&chat_config(addr)).unwrap();

    let deltas: Vec<String> = client
        .stream("casual leave?")
        .await
        .unwrap()
        .map(|d| d.unwrap())
        .collect()
        .await;
    assert_eq!(deltas, vec!["Casual ".to_string(), "leave: 12 days.".to_string()]);
}

#[tokio::test]
async fn test_chat_retries_server_errors() {
    let (addr, mock) = spawn_mock(Mock {
        fail_first: 1,
        fail_status: 503,
        ..Mock::default()
    })
    .await;
    let client = ChatClient::new(&chat_config(addr)).unwrap();

    let text = client.generate("retry me").await.unwrap();
    assert_eq!(text, "echo: retry me");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_chat_client_errors_fail_fast() {
    let (addr, mock) = spawn_mock(Mock {
        fail_first: 10,
        fail_status: 400,
        ..Mock::default()
    })
    .await;
    let client = ChatClient::new(&chat_config(addr)).unwrap();

    let err = client.generate("bad").await.unwrap_err();
    assert!(err.to_string().contains("400"));
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ollama_embedder() {
    let (addr, mock) = spawn_mock(Mock::default()).await;
    let config = EmbeddingConfig {
        provider: "ollama".to_string(),
        model: Some("nomic-embed-text".to_string()),
        dims: Some(2),
        url: Some(format!("http://{}", addr)),
        ..EmbeddingConfig::default()
    };
    let embedder = OllamaEmbedder::new(&config).unwrap();

    let vectors = embedder
        .embed(&["abc".to_string(), "abcdef".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![3.0, 1.0], vec![6.0, 1.0]]);
    assert!(embedder.embed(&[]).await.unwrap().is_empty());
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);

    assert!(create_embedder(&config).unwrap().is_some());
}

// ============ Assistant HTTP API ============

struct FixedGenerator;

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("Casual leave is 12 days [leave.md, page 1].".to_string())
    }
}

async fn spawn_api(dir: &TempDir) -> SocketAddr {
    fs::write(
        dir.path().join("leave.md"),
        "Casual leave is twelve days per year.\n\n| Leave Type | Days |\n|---|---|\n| Casual | 12 |\n",
    )
    .unwrap();
    let config = parse_config(&format!("[documents]\nfolder = '{}'\n", dir.path().display())).unwrap();
    let source = Arc::new(FolderSource::new(&config.documents).unwrap());
    let assistant =
        Assistant::with_components(&config, source, None, Arc::new(FixedGenerator)).unwrap();
    spawn(router(Arc::new(assistant))).await
}

#[tokio::test]
async fn test_api_flow() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_api(&dir).await;
    let http = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let health: Value = http.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["generation"], 0);

    // Before the first rebuild restricted questions have no index.
    let resp = http
        .post(format!("{}/api/ask", base))
        .json(&json!({ "question": "casual leave" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let resp = http.post(format!("{}/api/update_index", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Indexes updated successfully");
    assert_eq!(body["report"]["generation"], 1);
    assert_eq!(body["report"]["table_chunks"], 1);

    let resp = http
        .post(format!("{}/api/ask", base))
        .json(&json!({ "question": "How many casual leave days?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[ANSWER_KIND_HEADER], "grounded");
    assert_eq!(resp.text().await.unwrap(), "Casual leave is 12 days [leave.md, page 1].");

    let resp = http
        .post(format!("{}/api/ask", base))
        .json(&json!({ "question": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()[ANSWER_KIND_HEADER], "greeting");

    let search: Value = http
        .get(format!("{}/api/search?q=casual%20leave", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["no_context_found"], false);
    assert_eq!(search["context"]["entries"][0]["kind"], "table");
}

#[tokio::test]
async fn test_api_rejects_empty_question() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_api(&dir).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{}/api/ask", addr))
        .json(&json!({ "question": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = http.get(format!("http://{}/api/search", addr)).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_api_malformed_body_uses_error_envelope() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_api(&dir).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{}/api/ask", addr))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{\"question\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    let resp = http
        .post(format!("http://{}/api/ask", addr))
        .body("question=hi")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_api_update_index_failure_reports_error() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_api(&dir).await;
    fs::remove_file(dir.path().join("leave.md")).unwrap();

    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/update_index", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "rebuild_failed");
}

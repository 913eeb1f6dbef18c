//! HTTP embedding backends against an in-process fake server.
//!
//! The fake speaks the Ollama (legacy and batch) and OpenAI wire formats
//! and counts requests so batching can be asserted.

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use note_recall::config::{EmbeddingConfig, ProviderKind};
use note_recall::embedding::{create_provider, EmbeddingClient};
use note_recall::Error;

#[derive(Clone, Default)]
struct Fake {
    requests: Arc<AtomicUsize>,
}

impl Fake {
    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn input_texts(body: &Value) -> Vec<String> {
    body["input"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|t| t.as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

async fn ollama_legacy(State(fake): State<Fake>, Json(body): Json<Value>) -> Json<Value> {
    fake.requests.fetch_add(1, Ordering::SeqCst);
    let prompt = body["prompt"].as_str().unwrap_or_default();
    Json(json!({ "embedding": [prompt.len() as f32, 1.0] }))
}

async fn ollama_batch(State(fake): State<Fake>, Json(body): Json<Value>) -> Json<Value> {
    fake.requests.fetch_add(1, Ordering::SeqCst);
    let embeddings: Vec<Value> = input_texts(&body)
        .iter()
        .map(|t| json!([t.len() as f32, 1.0]))
        .collect();
    Json(json!({ "embeddings": embeddings }))
}

/// Requires `Bearer sk-test` and answers with `data` in reverse order.
async fn openai(State(fake): State<Fake>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    fake.requests.fetch_add(1, Ordering::SeqCst);
    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if auth != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    let data: Vec<Value> = input_texts(&body)
        .iter()
        .enumerate()
        .rev()
        .map(|(i, t)| json!({ "object": "embedding", "index": i, "embedding": [i as f32, t.len() as f32] }))
        .collect();
    Json(json!({ "object": "list", "data": data, "model": body["model"] })).into_response()
}

async fn failing() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded").into_response()
}

async fn malformed() -> &'static str {
    "this is not json"
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({ "embedding": [1.0] }))
}

/// Start the fake and return its base URL.
async fn spawn_fake() -> (String, Fake) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/api/embeddings", post(ollama_legacy))
        .route("/api/embed", post(ollama_batch))
        .route("/v1/embeddings", post(openai))
        .route("/broken/api/embeddings", post(failing))
        .route("/garbled/api/embeddings", post(malformed))
        .route("/slow/api/embeddings", post(slow))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), fake)
}

/// A port nothing is listening on.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn client(config: EmbeddingConfig) -> EmbeddingClient {
    let provider = create_provider(&config).unwrap();
    EmbeddingClient::new(provider, &config)
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_ollama_legacy_sends_one_request_per_text() {
    let (base, fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        base_url: format!("{}/api/embeddings", base),
        ..Default::default()
    });

    let vectors = embedder
        .embed_all(&texts(&["a", "bbb", "cc"]))
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0], vec![2.0, 1.0]]);
    assert_eq!(fake.requests(), 3);
    assert_eq!(embedder.dims(), Some(2));
}

#[tokio::test]
async fn test_ollama_batch_endpoint_respects_batch_size() {
    let (base, fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        base_url: format!("{}/api/embed", base),
        batch_size: 2,
        ..Default::default()
    });

    let vectors = embedder
        .embed_all(&texts(&["a", "bb", "ccc", "dddd", "eeeee"]))
        .await
        .unwrap();
    let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
    assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(fake.requests(), 3);
}

#[tokio::test]
async fn test_openai_orders_by_index_and_sends_bearer() {
    let (base, _fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        provider: ProviderKind::Openai,
        base_url: format!("{}/v1", base),
        model: "text-embedding-3-small".to_string(),
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    });

    let vectors = embedder
        .embed_all(&texts(&["one", "three", "seven!!"]))
        .await
        .unwrap();
    assert_eq!(
        vectors,
        vec![vec![0.0, 3.0], vec![1.0, 5.0], vec![2.0, 7.0]]
    );
    assert_eq!(embedder.model_name(), "text-embedding-3-small");
}

#[tokio::test]
async fn test_compatible_without_key_is_rejected_by_server() {
    let (base, fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        provider: ProviderKind::Compatible,
        base_url: format!("{}/v1/embeddings", base),
        api_key_env: "RECALL_TEST_UNSET_KEY".to_string(),
        ..Default::default()
    });

    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(matches!(err, Error::ProviderError(_)), "{err}");
    assert!(err.to_string().contains("401"));
    assert_eq!(fake.requests(), 1);
}

#[tokio::test]
async fn test_openai_requires_key_up_front() {
    let config = EmbeddingConfig {
        provider: ProviderKind::Openai,
        api_key_env: "RECALL_TEST_UNSET_KEY".to_string(),
        ..Default::default()
    };
    assert!(create_provider(&config).is_err());
}

#[tokio::test]
async fn test_server_error_is_provider_error() {
    let (base, _fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        base_url: format!("{}/broken/api/embeddings", base),
        ..Default::default()
    });

    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(matches!(err, Error::ProviderError(_)), "{err}");
    assert!(err.to_string().contains("model not loaded"));
}

#[tokio::test]
async fn test_malformed_body_is_provider_error() {
    let (base, _fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        base_url: format!("{}/garbled/api/embeddings", base),
        ..Default::default()
    });

    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(matches!(err, Error::ProviderError(_)), "{err}");
}

#[tokio::test]
async fn test_unreachable_provider_is_unavailable() {
    let port = find_free_port();
    let embedder = client(EmbeddingConfig {
        base_url: format!("http://127.0.0.1:{}/api/embeddings", port),
        ..Default::default()
    });

    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable(_)), "{err}");
    assert!(err.is_provider());
}

#[tokio::test]
async fn test_timeout_is_unavailable() {
    let (base, _fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        base_url: format!("{}/slow/api/embeddings", base),
        timeout_secs: 1,
        ..Default::default()
    });

    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable(_)), "{err}");
}

#[tokio::test]
async fn test_configured_dims_reject_other_sizes() {
    let (base, _fake) = spawn_fake().await;
    let embedder = client(EmbeddingConfig {
        base_url: format!("{}/api/embed", base),
        dims: Some(768),
        ..Default::default()
    });

    let err = embedder
        .embed_all(&texts(&["a", "b"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch(_)), "{err}");
}

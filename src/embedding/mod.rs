//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and its HTTP backends:
//! - **[`OllamaProvider`]**: a local Ollama instance, no auth.
//! - **[`OpenAiProvider`]**: the OpenAI embeddings API (bearer auth) or any
//!   service speaking the same wire format.
//!
//! [`EmbeddingClient`] sits in front of a provider and is what the indexer and
//! searcher talk to. It bounds the number of in-flight provider calls, splits
//! work into batches and checks that every vector has the dimensionality the
//! index was built with.
//!
//! Also provides the vector utilities used by the store and the searcher:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Failure mapping
//!
//! | Condition | Error |
//! |-----------|-------|
//! | Connection refused, DNS failure, request timeout | [`Error::ProviderUnavailable`] |
//! | Non-2xx status, malformed body, wrong vector count | [`Error::ProviderError`] |
//! | Vector length differs from the index | [`Error::DimensionMismatch`] |
//!
//! There are no retries here. A failed file is simply picked up again by the
//! next index run.

mod ollama;
mod openai;

pub use ollama::OllamaProvider;
pub use openai::{embeddings_endpoint, OpenAiProvider};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{Error, Result};

/// A backend that turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded alongside every stored vector.
    fn model_name(&self) -> &str;

    /// Most texts a single [`embed_batch`](Self::embed_batch) call should carry.
    fn max_batch_size(&self) -> usize {
        usize::MAX
    }

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(Error::ProviderError(format!(
                "expected 1 embedding, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

/// Build the provider selected by `[embedding] provider`.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let http = http_client(config.timeout_secs)?;
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(http, &config.base_url, &config.model)),
        ProviderKind::Openai => {
            let api_key = config.resolve_api_key().ok_or_else(|| {
                anyhow::anyhow!(
                    "embedding.api_key or the {} environment variable is required for the openai provider",
                    config.api_key_env
                )
            })?;
            Arc::new(OpenAiProvider::new(
                http,
                &config.base_url,
                &config.model,
                Some(api_key),
            ))
        }
        ProviderKind::Compatible => Arc::new(OpenAiProvider::new(
            http,
            &config.base_url,
            &config.model,
            config.resolve_api_key(),
        )),
    };
    Ok(provider)
}

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ Shared HTTP plumbing ============

/// Send a JSON request and return the decoded JSON body of a 2xx response.
pub(crate) async fn post_json(
    request: reqwest::RequestBuilder,
    backend: &str,
) -> Result<serde_json::Value> {
    let response = request.send().await.map_err(|e| transport_error(backend, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(backend, e))?;

    if !status.is_success() {
        return Err(Error::ProviderError(format!(
            "{} returned {}: {}",
            backend,
            status,
            truncate(&body, 200)
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| Error::ProviderError(format!("{} returned invalid JSON: {}", backend, e)))
}

fn transport_error(backend: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::ProviderUnavailable(format!("{} request timed out: {}", backend, err))
    } else if err.is_connect() || err.is_request() {
        Error::ProviderUnavailable(format!("could not reach {}: {}", backend, err))
    } else {
        Error::ProviderError(format!("{} request failed: {}", backend, err))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Decode a JSON array of numbers into a vector. Empty or non-numeric
/// arrays are rejected.
pub(crate) fn parse_vector(value: &serde_json::Value, backend: &str) -> Result<Vec<f32>> {
    let items = value.as_array().ok_or_else(|| {
        Error::ProviderError(format!("{} response: embedding is not an array", backend))
    })?;
    if items.is_empty() {
        return Err(Error::ProviderError(format!(
            "{} response: empty embedding",
            backend
        )));
    }
    items
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                Error::ProviderError(format!(
                    "{} response: non-numeric embedding entry {}",
                    backend, v
                ))
            })
        })
        .collect()
}

// ============ Client ============

/// Provider wrapper shared by the indexer and the searcher.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    batch_size: usize,
    /// 0 until known.
    dims: AtomicUsize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            provider,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            batch_size: config.batch_size.max(1),
            dims: AtomicUsize::new(config.dims.unwrap_or(0)),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Dimensionality every vector must have, once known.
    pub fn dims(&self) -> Option<usize> {
        match self.dims.load(Ordering::SeqCst) {
            0 => None,
            d => Some(d),
        }
    }

    /// Seed the expected dimensionality (from index metadata) if nothing set it yet.
    pub fn expect_dims(&self, dims: usize) {
        let _ = self
            .dims
            .compare_exchange(0, dims, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Forget the learned dimensionality, e.g. after the store was cleared.
    pub fn reset_dims(&self, configured: Option<usize>) {
        self.dims.store(configured.unwrap_or(0), Ordering::SeqCst);
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;
            self.provider.embed(text).await?
        };
        self.check_dims(&vector)?;
        Ok(vector)
    }

    /// Embed many texts, preserving input order.
    ///
    /// Texts are split into batches of at most `batch_size` (or the
    /// provider's own limit); at most `max_concurrency` batches are in
    /// flight at once.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.batch_size.min(self.provider.max_batch_size()).max(1);

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch))
            .map(|b| self.embed_one_batch(b))
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    async fn embed_one_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;
            self.provider.embed_batch(texts).await?
        };
        if vectors.len() != texts.len() {
            return Err(Error::ProviderError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            self.check_dims(v)?;
        }
        Ok(vectors)
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::ProviderError("empty embedding".to_string()));
        }
        let len = vector.len();
        let expected = match self
            .dims
            .compare_exchange(0, len, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return Ok(()),
            Err(current) => current,
        };
        if expected != len {
            return Err(Error::DimensionMismatch(format!(
                "model {} returned {} dimensions, index expects {}",
                self.provider.model_name(),
                len,
                expected
            )));
        }
        Ok(())
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing bytes that do not make
/// up a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a zero
/// vector on either side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns `[len, 1.0, ...]` padded to `dims`; counts calls.
    struct FixedProvider {
        dims: usize,
        max_batch: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn max_batch_size(&self) -> usize {
            self.max_batch
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![1.0f32; self.dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    fn client(dims: usize, max_batch: usize, cfg: EmbeddingConfig) -> (Arc<FixedProvider>, EmbeddingClient) {
        let provider = Arc::new(FixedProvider {
            dims,
            max_batch,
            calls: AtomicUsize::new(0),
        });
        let client = EmbeddingClient::new(provider.clone(), &cfg);
        (provider, client)
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_parse_vector_rejects_bad_payloads() {
        let ok = parse_vector(&serde_json::json!([0.5, -1, 2.25]), "test").unwrap();
        assert_eq!(ok, vec![0.5, -1.0, 2.25]);

        assert!(matches!(
            parse_vector(&serde_json::json!([]), "test"),
            Err(Error::ProviderError(_))
        ));
        assert!(matches!(
            parse_vector(&serde_json::json!([1.0, "x"]), "test"),
            Err(Error::ProviderError(_))
        ));
        assert!(matches!(
            parse_vector(&serde_json::json!({"a": 1}), "test"),
            Err(Error::ProviderError(_))
        ));
    }

    #[tokio::test]
    async fn test_embed_all_batches_and_keeps_order() {
        let cfg = EmbeddingConfig {
            batch_size: 3,
            ..Default::default()
        };
        let (provider, client) = client(4, usize::MAX, cfg);
        let texts: Vec<String> = (1..=7).map(|n| "x".repeat(n)).collect();

        let vectors = client.embed_all(&texts).await.unwrap();
        assert_eq!(vectors.len(), 7);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.dims(), Some(4));
    }

    #[tokio::test]
    async fn test_provider_batch_limit_wins() {
        let (provider, client) = client(2, 1, EmbeddingConfig::default());
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        client.embed_all(&texts).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dims_guard() {
        let cfg = EmbeddingConfig {
            dims: Some(8),
            ..Default::default()
        };
        let (_, client) = client(4, usize::MAX, cfg);
        let err = client.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
    }

    #[tokio::test]
    async fn test_seeded_dims_are_enforced_until_reset() {
        let (_, client) = client(4, usize::MAX, EmbeddingConfig::default());
        client.expect_dims(16);
        assert!(matches!(
            client.embed_query("q").await,
            Err(Error::DimensionMismatch(_))
        ));

        client.reset_dims(None);
        assert_eq!(client.embed_query("q").await.unwrap().len(), 4);
    }
}

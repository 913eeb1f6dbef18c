//! Ollama backend.
//!
//! Two endpoints are understood:
//! - the legacy single-text endpoint (`/api/embeddings`, the default):
//!   `{"model", "prompt"}` → `{"embedding": [...]}`
//! - the batch endpoint (`/api/embed`): `{"model", "input": [...]}` →
//!   `{"embeddings": [[...], ...]}`
//!
//! Which one is used follows from the configured URL.

use async_trait::async_trait;

use super::{parse_vector, post_json, EmbeddingProvider};
use crate::error::{Error, Result};

pub struct OllamaProvider {
    http: reqwest::Client,
    url: String,
    model: String,
    batch_api: bool,
}

impl OllamaProvider {
    pub fn new(http: reqwest::Client, url: &str, model: &str) -> Self {
        let url = url.trim_end_matches('/').to_string();
        let batch_api = url.ends_with("/api/embed");
        Self {
            http,
            url,
            model: model.to_string(),
            batch_api,
        }
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });
        let json = post_json(self.http.post(&self.url).json(&body), "ollama").await?;
        let embedding = json.get("embedding").ok_or_else(|| {
            Error::ProviderError("ollama response: missing embedding".to_string())
        })?;
        parse_vector(embedding, "ollama")
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json(self.http.post(&self.url).json(&body), "ollama").await?;
        parse_batch_response(&json)
    }
}

fn parse_batch_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::ProviderError("ollama response: missing embeddings array".to_string())
        })?;
    embeddings.iter().map(|e| parse_vector(e, "ollama")).collect()
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        if self.batch_api {
            usize::MAX
        } else {
            1
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.batch_api {
            return self.embed_many(texts).await;
        }
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_single(text).await?);
        }
        Ok(out)
    }
}

//! OpenAI-style `/embeddings` backend, used for both the `openai` and the
//! `compatible` providers. The only difference between the two is whether a
//! bearer token is mandatory, which [`create_provider`](super::create_provider)
//! enforces.

use async_trait::async_trait;

use super::{parse_vector, post_json, EmbeddingProvider};
use crate::error::{Error, Result};

pub struct OpenAiProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: embeddings_endpoint(base_url),
            model: model.to_string(),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Resolve the full embeddings URL from a configured base URL.
///
/// `.../embeddings` is used as is, a trailing version segment (`/v1`,
/// `/v4`) gets `/embeddings`, anything else gets `/v1/embeddings`.
pub fn embeddings_endpoint(base_url: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/embeddings") {
        return normalized.to_string();
    }
    if has_version_suffix(normalized) {
        return format!("{normalized}/embeddings");
    }
    format!("{normalized}/v1/embeddings")
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::ProviderError("openai response: missing data array".to_string()))?;

    if data.len() != expected {
        return Err(Error::ProviderError(format!(
            "openai response: expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    // Every index in 0..expected exactly once.
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let slot = slots.get_mut(index).ok_or_else(|| {
            Error::ProviderError(format!(
                "openai response: index {} out of range for {} inputs",
                index, expected
            ))
        })?;
        if slot.is_some() {
            return Err(Error::ProviderError(format!(
                "openai response: duplicate index {}",
                index
            )));
        }
        let embedding = item.get("embedding").ok_or_else(|| {
            Error::ProviderError("openai response: missing embedding".to_string())
        })?;
        *slot = Some(parse_vector(embedding, "openai")?);
    }

    // data.len() == expected and no duplicates, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let json = post_json(request, "openai").await?;
        parse_response(&json, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            embeddings_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(
            embeddings_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(
            embeddings_endpoint("https://open.bigmodel.cn/api/paas/v4"),
            "https://open.bigmodel.cn/api/paas/v4/embeddings"
        );
        assert_eq!(
            embeddings_endpoint("http://localhost:8080/custom/embeddings"),
            "http://localhost:8080/custom/embeddings"
        );
        assert_eq!(
            embeddings_endpoint("http://localhost:8080/version"),
            "http://localhost:8080/version/v1/embeddings"
        );
    }

    #[test]
    fn test_parse_response_reorders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [2.0, 2.0]},
                {"index": 0, "embedding": [1.0, 1.0]}
            ]
        });
        let vectors = parse_response(&json, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 1.0]);
        assert_eq!(vectors[1], vec![2.0, 2.0]);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let json = serde_json::json!({"data": [{"index": 0, "embedding": [1.0]}]});
        assert!(matches!(
            parse_response(&json, 2),
            Err(Error::ProviderError(_))
        ));
    }

    #[test]
    fn test_parse_response_rejects_bad_indices() {
        let duplicate = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [1.0]},
                {"index": 1, "embedding": [2.0]}
            ]
        });
        assert!(matches!(
            parse_response(&duplicate, 2),
            Err(Error::ProviderError(_))
        ));

        let out_of_range = serde_json::json!({
            "data": [
                {"index": 7, "embedding": [1.0]},
                {"index": 9, "embedding": [2.0]}
            ]
        });
        assert!(matches!(
            parse_response(&out_of_range, 2),
            Err(Error::ProviderError(_))
        ));
    }

    #[test]
    fn test_parse_response_missing_data() {
        let json = serde_json::json!({"error": {"message": "bad key"}});
        assert!(matches!(
            parse_response(&json, 1),
            Err(Error::ProviderError(_))
        ));
    }
}

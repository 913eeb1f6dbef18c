//! Hybrid retrieval: cosine similarity blended with BM25 keyword relevance.
//!
//! # Scoring
//!
//! | Signal | Raw | Normalized |
//! |--------|-----|------------|
//! | vector | cosine similarity of query and chunk vectors | clamped to `[0, 1]` |
//! | keyword | negated FTS5 `bm25()` | divided by the best score among the candidates |
//!
//! The final score is `vector_weight * v + keyword_weight * k` in hybrid
//! mode, `k` in keyword mode and `v` in semantic mode. Results under
//! `min_score` are dropped; the rest are ordered by score, then newest first,
//! then by path and start line so equal scores come back in a stable order.
//!
//! The vector side is an exact scan over every stored embedding of the
//! active model.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, EmbeddingClient};
use crate::error::{Error, Result};
use crate::models::SearchHit;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Hybrid,
    /// BM25 only; the embedding provider is never called.
    Keyword,
    /// Vectors only.
    Semantic,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(SearchMode::Hybrid),
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            other => Err(format!(
                "unknown search mode '{}', expected hybrid, keyword or semantic",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    pub min_score: f64,
    pub mode: SearchMode,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl SearchOptions {
    pub fn from_config(retrieval: &RetrievalConfig) -> Self {
        Self {
            max_results: retrieval.max_results,
            min_score: retrieval.min_score,
            mode: SearchMode::Hybrid,
        }
    }
}

pub struct Searcher {
    store: Arc<dyn Store>,
    embedder: Arc<EmbeddingClient>,
    retrieval: RetrievalConfig,
}

impl Searcher {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<EmbeddingClient>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            retrieval,
        }
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        let stats = self.store.stats().await?;
        if stats.chunks == 0 {
            return Ok(Vec::new());
        }

        let vector_scores = if options.mode == SearchMode::Keyword {
            HashMap::new()
        } else {
            let model = self.embedder.model_name();
            if let Some(recorded) = &stats.model {
                if recorded.model != model {
                    return Err(Error::DimensionMismatch(format!(
                        "index was built with {} but {} is configured; rebuild the index",
                        recorded.model, model
                    )));
                }
                self.embedder.expect_dims(recorded.dims);
            }
            let query_vec = self.embedder.embed_query(query).await?;
            self.vector_scores(&query_vec, model).await?
        };

        let keyword_scores = if options.mode == SearchMode::Semantic {
            HashMap::new()
        } else {
            let raw = self
                .store
                .keyword_search(query, self.retrieval.candidate_k_keyword)
                .await?;
            normalize_keyword_scores(&raw)
        };

        let (wv, wk) = match options.mode {
            SearchMode::Hybrid => (self.retrieval.vector_weight, self.retrieval.keyword_weight),
            SearchMode::Keyword => (0.0, 1.0),
            SearchMode::Semantic => (1.0, 0.0),
        };

        let mut scored: HashMap<i64, (f64, f64, f64)> = HashMap::new();
        for id in vector_scores.keys().chain(keyword_scores.keys()) {
            let v = vector_scores.get(id).copied().unwrap_or(0.0);
            let k = keyword_scores.get(id).copied().unwrap_or(0.0);
            let score = wv * v + wk * k;
            if score >= options.min_score {
                scored.insert(*id, (score, v, k));
            }
        }

        debug!(
            vector_candidates = vector_scores.len(),
            keyword_candidates = keyword_scores.len(),
            above_threshold = scored.len(),
            mode = options.mode.as_str(),
            "scored search candidates"
        );

        let ids: Vec<i64> = scored.keys().copied().collect();
        let mut hits: Vec<SearchHit> = self
            .store
            .get_chunks(&ids)
            .await?
            .into_iter()
            .filter_map(|chunk| {
                let (score, vector_score, keyword_score) = scored.get(&chunk.id).copied()?;
                Some(SearchHit {
                    file_path: chunk.file_path,
                    line_start: chunk.line_start,
                    line_end: chunk.line_end,
                    content: chunk.content,
                    score,
                    vector_score,
                    keyword_score,
                    created_at: chunk.created_at,
                })
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(options.max_results);
        Ok(hits)
    }

    async fn vector_scores(&self, query_vec: &[f32], model: &str) -> Result<HashMap<i64, f64>> {
        let stored = self.store.all_chunks_with_embeddings(model).await?;
        let mut scores = HashMap::with_capacity(stored.len());
        for (chunk_id, vector) in stored {
            if vector.len() != query_vec.len() {
                return Err(Error::DimensionMismatch(format!(
                    "stored vector for chunk {} has {} dimensions, query has {}",
                    chunk_id,
                    vector.len(),
                    query_vec.len()
                )));
            }
            let similarity = cosine_similarity(query_vec, &vector) as f64;
            scores.insert(chunk_id, similarity.clamp(0.0, 1.0));
        }
        Ok(scores)
    }
}

/// Scale keyword scores so the best candidate scores 1.0.
///
/// If every candidate has the same score (including a single candidate),
/// all of them get 1.0.
pub fn normalize_keyword_scores(candidates: &[(i64, f64)]) -> HashMap<i64, f64> {
    let s_max = candidates
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let s_min = candidates
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::INFINITY, f64::min);

    candidates
        .iter()
        .map(|(id, s)| {
            let norm = if s_max <= 0.0 || (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s / s_max).clamp(0.0, 1.0)
            };
            (*id, norm)
        })
        .collect()
}

/// Score descending, then newest first, then path and start line ascending.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.line_start.cmp(&b.line_start))
    });
}

// ============ Score normalization tests ============

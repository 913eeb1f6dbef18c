//! Storage abstraction.
//!
//! The [`Store`] trait is everything the indexer and the searcher need from
//! persistence. [`SqliteStore`] is the only implementation; it keeps the
//! chunk rows, their embeddings and the FTS5 index in one database and keeps
//! them in step inside its own transactions.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

mod sqlite;

pub use sqlite::{fts_match_expression, SqliteStore};

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{ChunkRecord, IndexModel, NewChunk, StoreStats, StoredChunk};

/// Persistent chunk, embedding and full-text storage.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_chunk`](Store::upsert_chunk) | Insert a chunk and its FTS row unless already present |
/// | [`replace_embedding`](Store::replace_embedding) | Insert or overwrite a chunk's vector |
/// | [`insert_chunk_with_embedding`](Store::insert_chunk_with_embedding) | Chunk, FTS row and vector in one transaction |
/// | [`delete_chunks_for_file`](Store::delete_chunks_for_file) | Drop everything belonging to a file |
/// | [`delete_chunks`](Store::delete_chunks) | Drop specific chunks |
/// | [`relocate_chunk`](Store::relocate_chunk) | Move an unchanged chunk to a new line range |
/// | [`keyword_search`](Store::keyword_search) | BM25 full-text candidates |
/// | [`all_chunks_with_embeddings`](Store::all_chunks_with_embeddings) | Every vector for one model |
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the id of the new or already existing chunk.
    async fn upsert_chunk(&self, chunk: &NewChunk) -> Result<i64>;

    async fn replace_embedding(&self, chunk_id: i64, vector: &[f32], model: &str) -> Result<()>;

    async fn insert_chunk_with_embedding(
        &self,
        chunk: &NewChunk,
        vector: &[f32],
        model: &str,
    ) -> Result<i64>;

    /// Returns the number of chunks removed.
    async fn delete_chunks_for_file(&self, file_path: &str) -> Result<u64>;

    async fn delete_chunks(&self, ids: &[i64]) -> Result<u64>;

    async fn relocate_chunk(&self, id: i64, line_start: i64, line_end: i64) -> Result<()>;

    async fn list_chunk_hashes(&self, file_path: &str) -> Result<HashSet<String>>;

    async fn list_file_chunks(&self, file_path: &str) -> Result<Vec<ChunkRecord>>;

    async fn list_files(&self) -> Result<Vec<String>>;

    /// `(chunk_id, score)` pairs, best first. Scores are positive; higher
    /// is better.
    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<(i64, f64)>>;

    async fn all_chunks_with_embeddings(&self, model: &str) -> Result<Vec<(i64, Vec<f32>)>>;

    /// Hydrate chunk rows. Unknown ids are skipped.
    async fn get_chunks(&self, ids: &[i64]) -> Result<Vec<StoredChunk>>;

    async fn index_model(&self) -> Result<Option<IndexModel>>;

    async fn set_index_model(&self, model: &str, dims: usize) -> Result<()>;

    /// Remove every chunk, embedding, FTS row and the index metadata.
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

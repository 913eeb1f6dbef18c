//! Core data models shared by the chunker, store, indexer and searcher.

use serde::Serialize;

/// A line-aligned slice of a note, as produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// 1-based, inclusive.
    pub line_start: usize,
    /// 1-based, inclusive.
    pub line_end: usize,
    /// SHA-256 hex of `content`.
    pub content_hash: String,
}

/// A chunk about to be written, tagged with its file.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    pub content: String,
    pub content_hash: String,
}

impl NewChunk {
    pub fn from_text(file_path: &str, chunk: &TextChunk) -> Self {
        Self {
            file_path: file_path.to_string(),
            line_start: chunk.line_start as i64,
            line_end: chunk.line_end as i64,
            content: chunk.content.clone(),
            content_hash: chunk.content_hash.clone(),
        }
    }
}

/// Lightweight view of a stored chunk used for diffing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub id: i64,
    pub line_start: i64,
    pub line_end: i64,
    pub content_hash: String,
}

/// A fully hydrated chunk row.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    pub content: String,
    pub content_hash: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    pub content: String,
    pub score: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Model and vector size the stored embeddings were produced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexModel {
    pub model: String,
    pub dims: usize,
}

/// Row counts reported by `recall stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub files: i64,
    pub chunks: i64,
    pub embeddings: i64,
    pub model: Option<IndexModel>,
}

/// A slice of a note read straight from disk.
#[derive(Debug, Clone, Serialize)]
pub struct LineRange {
    pub path: String,
    pub from: usize,
    pub to: usize,
    pub content: String,
}

/// What happened to a single file during an index run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed {
        added: usize,
        kept: usize,
        relocated: usize,
        removed: usize,
    },
    /// The file no longer exists; all its chunks were dropped.
    Removed { removed: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_path: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Per-file results of [`Indexer::index`](crate::indexer::Indexer::index).
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files: Vec<FileReport>,
}

impl IndexReport {
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
            .count()
    }

    /// Total chunks inserted across all files.
    pub fn added(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Indexed { added, .. } => added,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome_for(&self, file_path: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.file_path == file_path)
            .map(|f| &f.outcome)
    }
}

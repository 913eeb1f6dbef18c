//! Incremental, content-addressed indexing of note files.
//!
//! For every file the indexer re-chunks the text, compares the chunk hashes
//! with what the store holds for that file, and only embeds chunks it has
//! never seen. Unchanged chunks that merely moved get their line range
//! updated; chunks that disappeared are deleted.
//!
//! # Ordering
//!
//! All new chunks of a file are embedded before anything is written for it,
//! so a provider failure leaves the file exactly as it was. Writes then go
//! stale deletes → relocations → inserts, each insert carrying its chunk
//! row, FTS row and vector in one transaction.
//!
//! Files are processed with bounded parallelism; two runs touching the same
//! file are serialized by a per-path lock.
//!
//! A dimension mismatch ends the run: files not yet started are skipped and
//! files already in flight stop before writing anything.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, FileOutcome, FileReport, IndexReport, NewChunk, TextChunk};
use crate::notes::NoteSet;
use crate::store::Store;

/// How a file's freshly computed chunks line up with the stored ones.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DiffPlan {
    /// Same hash at the same start line.
    pub kept: usize,
    /// `(stored chunk id, index into new chunks)` for unchanged content that moved.
    pub relocated: Vec<(i64, usize)>,
    /// Stored chunk ids with no counterpart any more.
    pub stale: Vec<i64>,
    /// Indices into new chunks that need embedding.
    pub added: Vec<usize>,
}

/// Match new chunks to stored ones by content hash, preferring an exact
/// start-line match so duplicated content keeps its original rows.
pub fn diff_chunks(existing: &[ChunkRecord], new: &[TextChunk]) -> DiffPlan {
    let mut plan = DiffPlan::default();
    let mut used = vec![false; existing.len()];
    let mut matched = vec![false; new.len()];

    let mut exact: HashMap<(&str, i64), Vec<usize>> = HashMap::new();
    for (idx, record) in existing.iter().enumerate() {
        exact
            .entry((record.content_hash.as_str(), record.line_start))
            .or_default()
            .push(idx);
    }
    for (j, chunk) in new.iter().enumerate() {
        let key = (chunk.content_hash.as_str(), chunk.line_start as i64);
        if let Some(idx) = exact.get_mut(&key).and_then(|v| v.pop()) {
            used[idx] = true;
            matched[j] = true;
            if existing[idx].line_end == chunk.line_end as i64 {
                plan.kept += 1;
            } else {
                plan.relocated.push((existing[idx].id, j));
            }
        }
    }

    let mut by_hash: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (idx, record) in existing.iter().enumerate() {
        if !used[idx] {
            by_hash
                .entry(record.content_hash.as_str())
                .or_default()
                .push_back(idx);
        }
    }
    for (j, chunk) in new.iter().enumerate() {
        if matched[j] {
            continue;
        }
        match by_hash
            .get_mut(chunk.content_hash.as_str())
            .and_then(|q| q.pop_front())
        {
            Some(idx) => {
                used[idx] = true;
                plan.relocated.push((existing[idx].id, j));
            }
            None => plan.added.push(j),
        }
    }

    plan.stale = existing
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(record, _)| record.id)
        .collect();

    plan
}

pub struct Indexer {
    store: Arc<dyn Store>,
    embedder: Arc<EmbeddingClient>,
    notes: Arc<NoteSet>,
    chunking: ChunkingConfig,
    file_concurrency: usize,
    configured_dims: Option<usize>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<EmbeddingClient>,
        notes: Arc<NoteSet>,
        chunking: ChunkingConfig,
        file_concurrency: usize,
        configured_dims: Option<usize>,
    ) -> Self {
        Self {
            store,
            embedder,
            notes,
            chunking,
            file_concurrency: file_concurrency.max(1),
            configured_dims,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Index specific files. Paths are absolute or relative to the notes
    /// root; a path that no longer exists has its chunks removed.
    pub async fn index(&self, paths: &[PathBuf], rebuild: bool) -> Result<IndexReport> {
        let mut reports = Vec::new();
        let mut files = BTreeSet::new();
        for path in paths {
            match self.notes.relative_path(path) {
                Ok(rel) if self.notes.is_note(&rel) => {
                    files.insert(rel);
                }
                Ok(rel) => debug!(file_path = %rel, "not selected by note globs, skipping"),
                Err(e) => reports.push(FileReport {
                    file_path: path.display().to_string(),
                    outcome: FileOutcome::Failed {
                        error: e.to_string(),
                    },
                }),
            }
        }

        let mut report = self.run(files.into_iter().collect(), rebuild, false).await?;
        report.files.extend(reports);
        report.files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(report)
    }

    /// Walk the whole notes root. Files in the store that the walk no longer
    /// finds are removed.
    pub async fn index_all(&self, rebuild: bool) -> Result<IndexReport> {
        let files = self.notes.walk()?;
        self.run(files, rebuild, true).await
    }

    async fn run(&self, files: Vec<String>, rebuild: bool, prune: bool) -> Result<IndexReport> {
        let cleared = self.check_model(rebuild).await?;
        // A cleared store has nothing left to delete per file.
        let rebuild_files = rebuild && !cleared;

        let mut report = IndexReport::default();

        if prune {
            let walked: BTreeSet<&String> = files.iter().collect();
            for stored in self.store.list_files().await? {
                if walked.contains(&stored) {
                    continue;
                }
                let lock = self.path_lock(&stored).await;
                let removed = {
                    let _guard = lock.lock().await;
                    self.store.delete_chunks_for_file(&stored).await
                };
                self.release_lock(&stored, lock).await;
                let removed = removed? as usize;
                info!(file_path = %stored, removed, "removed deleted note");
                report.files.push(FileReport {
                    file_path: stored,
                    outcome: FileOutcome::Removed { removed },
                });
            }
        }

        let abort = AtomicBool::new(false);
        let results: Vec<Result<Option<FileReport>>> = stream::iter(files)
            .map(|file_path| self.index_file(file_path, rebuild_files, &abort))
            .buffer_unordered(self.file_concurrency)
            .collect()
            .await;

        for result in results {
            if let Some(file) = result? {
                report.files.push(file);
            }
        }
        report.files.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        info!(
            files = report.files.len(),
            added = report.added(),
            failed = report.failed(),
            "index run complete"
        );
        Ok(report)
    }

    /// Compare the recorded model with the configured one. Returns `true`
    /// when the store was cleared for a rebuild.
    async fn check_model(&self, rebuild: bool) -> Result<bool> {
        let model = self.embedder.model_name();
        let Some(recorded) = self.store.index_model().await? else {
            return Ok(false);
        };

        let dims_differ = self.configured_dims.is_some_and(|d| d != recorded.dims);
        if recorded.model == model && !dims_differ {
            self.embedder.expect_dims(recorded.dims);
            return Ok(false);
        }

        if !rebuild {
            return Err(Error::DimensionMismatch(format!(
                "index was built with {} ({} dims) but {} is configured; rerun with rebuild",
                recorded.model, recorded.dims, model
            )));
        }

        warn!(
            from = %recorded.model,
            to = %model,
            "embedding model changed, clearing the whole index"
        );
        self.store.clear().await?;
        self.embedder.reset_dims(self.configured_dims);
        Ok(true)
    }

    async fn path_lock(&self, file_path: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(file_path.to_string())
            .or_default()
            .clone()
    }

    /// Drop our handle and forget the path once nobody else holds its lock.
    async fn release_lock(&self, file_path: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks
            .get(file_path)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(file_path);
        }
    }

    /// Only a dimension mismatch escapes as `Err`; every other failure is
    /// recorded against the file. `Ok(None)` means the file was skipped
    /// because the run was aborted.
    async fn index_file(
        &self,
        file_path: String,
        rebuild: bool,
        abort: &AtomicBool,
    ) -> Result<Option<FileReport>> {
        if abort.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let lock = self.path_lock(&file_path).await;
        let result = {
            let _guard = lock.lock().await;
            self.sync_file(&file_path, rebuild, abort).await
        };
        self.release_lock(&file_path, lock).await;

        let outcome = match result {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Ok(None),
            Err(e @ Error::DimensionMismatch(_)) => {
                abort.store(true, Ordering::SeqCst);
                warn!(file_path = %file_path, error = %e, "aborting index run");
                return Err(e);
            }
            Err(e) => {
                warn!(file_path = %file_path, error = %e, "failed to index note");
                FileOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        Ok(Some(FileReport {
            file_path,
            outcome,
        }))
    }

    async fn sync_file(
        &self,
        file_path: &str,
        rebuild: bool,
        abort: &AtomicBool,
    ) -> Result<Option<FileOutcome>> {
        if abort.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let text = match tokio::fs::read_to_string(self.notes.absolute(file_path)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let removed = self.store.delete_chunks_for_file(file_path).await? as usize;
                info!(file_path, removed, "note no longer exists");
                return Ok(Some(FileOutcome::Removed { removed }));
            }
            Err(e) => return Err(e.into()),
        };

        if rebuild {
            self.store.delete_chunks_for_file(file_path).await?;
        }

        let chunks = chunk_text(
            &text,
            self.chunking.target_tokens,
            self.chunking.overlap_tokens,
        );
        let existing = self.store.list_file_chunks(file_path).await?;
        let plan = diff_chunks(&existing, &chunks);

        let texts: Vec<String> = plan
            .added
            .iter()
            .map(|&j| chunks[j].content.clone())
            .collect();
        let vectors = self.embedder.embed_all(&texts).await?;
        if abort.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let model = self.embedder.model_name();
        if !vectors.is_empty() {
            if let Some(dims) = self.embedder.dims() {
                self.store.set_index_model(model, dims).await?;
            }
        }

        self.store.delete_chunks(&plan.stale).await?;
        for &(id, j) in &plan.relocated {
            let chunk = &chunks[j];
            self.store
                .relocate_chunk(id, chunk.line_start as i64, chunk.line_end as i64)
                .await?;
        }
        for (&j, vector) in plan.added.iter().zip(&vectors) {
            let chunk = NewChunk::from_text(file_path, &chunks[j]);
            self.store
                .insert_chunk_with_embedding(&chunk, vector, model)
                .await?;
        }

        debug!(
            file_path,
            added = plan.added.len(),
            kept = plan.kept,
            relocated = plan.relocated.len(),
            removed = plan.stale.len(),
            "indexed note"
        );

        Ok(Some(FileOutcome::Indexed {
            added: plan.added.len(),
            kept: plan.kept,
            relocated: plan.relocated.len(),
            removed: plan.stale.len(),
        }))
    }
}

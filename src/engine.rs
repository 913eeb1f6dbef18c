//! The engine context.
//!
//! An [`Engine`] bundles one configuration, one store handle and one
//! embedding client. It is built explicitly with [`Engine::open`] and passed
//! to whoever needs it; nothing in the crate reaches for global state.
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use note_recall::config::load_config;
//! use note_recall::engine::Engine;
//! use note_recall::search::SearchOptions;
//!
//! let config = load_config(std::path::Path::new("config/recall.toml"))?;
//! let engine = Engine::open(config).await?;
//! engine.index_all(false).await?;
//! for hit in engine.search("sqlite wal mode", &SearchOptions::default()).await? {
//!     println!("{}:{}-{} {:.3}", hit.file_path, hit.line_start, hit.line_end, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingClient, EmbeddingProvider};
use crate::error::Result;
use crate::get::get_range;
use crate::indexer::Indexer;
use crate::models::{IndexReport, LineRange, SearchHit, StoreStats};
use crate::notes::NoteSet;
use crate::search::{SearchOptions, Searcher};
use crate::store::{SqliteStore, Store};
use crate::write::{write_note, WriteTarget};
use crate::{db, migrate};

pub struct Engine {
    config: Config,
    pool: SqlitePool,
    store: Arc<dyn Store>,
    notes: Arc<NoteSet>,
    indexer: Indexer,
    searcher: Searcher,
}

impl Engine {
    /// Open the database (running migrations) and build the configured provider.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Self::with_provider(config, provider).await
    }

    /// Like [`open`](Self::open) but with a caller-supplied provider.
    pub async fn with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;

        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
        let embedder = Arc::new(EmbeddingClient::new(provider, &config.embedding));
        let notes = Arc::new(NoteSet::new(&config.notes)?);

        let indexer = Indexer::new(
            store.clone(),
            embedder.clone(),
            notes.clone(),
            config.chunking.clone(),
            config.indexing.file_concurrency,
            config.embedding.dims,
        );
        let searcher = Searcher::new(store.clone(), embedder, config.retrieval.clone());

        Ok(Self {
            config,
            pool,
            store,
            notes,
            indexer,
            searcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Search options seeded from `[retrieval]`.
    pub fn default_search_options(&self) -> SearchOptions {
        SearchOptions::from_config(&self.config.retrieval)
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        self.searcher.search(query, options).await
    }

    /// Index specific files (absolute or relative to the notes root).
    pub async fn index(&self, paths: &[PathBuf], rebuild: bool) -> Result<IndexReport> {
        self.indexer.index(paths, rebuild).await
    }

    /// Index everything under the notes root and drop notes that vanished.
    pub async fn index_all(&self, rebuild: bool) -> Result<IndexReport> {
        self.indexer.index_all(rebuild).await
    }

    /// One path, or the whole root when `path` is `None`.
    pub async fn reindex(&self, path: Option<PathBuf>, rebuild: bool) -> Result<IndexReport> {
        match path {
            Some(path) => self.index(&[path], rebuild).await,
            None => self.index_all(rebuild).await,
        }
    }

    pub async fn get_range(&self, path: &str, from: usize, lines: usize) -> Result<LineRange> {
        get_range(&self.notes, path, from, lines).await
    }

    /// Append to today's daily log or the long-term file, then index it.
    pub async fn write(&self, target: WriteTarget, content: &str) -> Result<(String, IndexReport)> {
        let today = chrono::Local::now().date_naive();
        self.write_on(target, content, today).await
    }

    /// [`write`](Self::write) with an explicit date for the daily log.
    pub async fn write_on(
        &self,
        target: WriteTarget,
        content: &str,
        today: NaiveDate,
    ) -> Result<(String, IndexReport)> {
        let file_path = write_note(&self.config.notes, &self.notes, target, content, today).await?;
        let report = self
            .indexer
            .index(&[PathBuf::from(&file_path)], false)
            .await?;
        Ok((file_path, report))
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

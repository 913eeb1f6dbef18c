//! # note-recall
//!
//! Local-first hybrid search over a growing set of markdown notes.
//!
//! Notes are split into overlapping, line-aligned chunks, each chunk gets a
//! vector from a pluggable embedding provider, and queries are answered by
//! blending cosine similarity with BM25 keyword relevance. Re-indexing is
//! content-addressed: only chunks whose text changed are embedded again.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Note files  │──▶│   Indexer    │──▶│    SQLite     │
//! │ (markdown)  │   │ diff+chunk   │   │ chunks + FTS5 │
//! └─────────────┘   └──────┬───────┘   │ + embeddings  │
//!                          │           └───────┬───────┘
//!                          ▼                   │
//!                   ┌──────────────┐   ┌───────▼───────┐
//!                   │  Embedding   │◀──│    Hybrid     │◀── query
//!                   │  provider    │   │   searcher    │
//!                   └──────────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init                        # create database
//! recall index                       # index every note under the root
//! recall search "sqlite wal mode"    # hybrid search
//! recall write "Decided to use WAL" --target longterm
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Engine error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Line-aligned text chunking |
//! | [`embedding`] | Embedding provider abstraction and client |
//! | [`store`] | Storage trait and SQLite implementation |
//! | [`notes`] | Note discovery and path resolution |
//! | [`indexer`] | Incremental indexing |
//! | [`search`] | Hybrid search and scoring |
//! | [`get`] | Line-range reads |
//! | [`write`] | Daily and long-term note writes |
//! | [`stats`] | Index statistics |
//! | [`engine`] | Engine context tying it all together |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod get;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod notes;
pub mod search;
pub mod stats;
pub mod store;
pub mod write;

pub use engine::Engine;
pub use error::{Error, Result};

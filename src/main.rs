//! # recall CLI
//!
//! The `recall` binary indexes a directory of markdown notes and searches it.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall index [PATHS]...` | Index changed notes (all notes when no path is given) |
//! | `recall search "<query>"` | Hybrid, keyword or semantic search |
//! | `recall get <path>` | Print a line range of a note |
//! | `recall write "<text>"` | Append to today's log or the long-term file |
//! | `recall stats` | Show what is indexed |
//! | `recall completions <shell>` | Print shell completions |
//!
//! Log verbosity is controlled with `RECALL_LOG` (e.g. `RECALL_LOG=debug`).
//! Logs go to stderr; command output goes to stdout.

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use note_recall::config::{self, Config};
use note_recall::get::{get_range, DEFAULT_LINES};
use note_recall::models::{FileOutcome, IndexReport, SearchHit};
use note_recall::notes::NoteSet;
use note_recall::search::SearchMode;
use note_recall::stats::render_stats;
use note_recall::store::{SqliteStore, Store};
use note_recall::write::WriteTarget;
use note_recall::{db, migrate, Engine};

/// recall: local-first hybrid search over markdown notes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Local-first hybrid (vector + keyword) search over markdown notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/recall.toml`. Relative paths inside the file
    /// are resolved against the file's directory.
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Index notes.
    ///
    /// With no paths, walks the whole notes root and also removes notes that
    /// were deleted. With paths, indexes just those files; a path that no
    /// longer exists has its chunks removed. Only changed chunks are embedded.
    Index {
        /// Note files, absolute or relative to the notes root.
        paths: Vec<PathBuf>,

        /// Drop existing chunks first. Required after changing the embedding model.
        #[arg(long)]
        rebuild: bool,
    },

    /// Search indexed notes.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `retrieval.max_results`).
        #[arg(long)]
        limit: Option<usize>,

        /// Drop results scoring below this (defaults to `retrieval.min_score`).
        #[arg(long)]
        min_score: Option<f64>,

        /// `hybrid` (vector + keyword), `keyword` (BM25 only) or `semantic` (vector only).
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,

        /// Show the vector and keyword components of each score.
        #[arg(long)]
        verbose: bool,
    },

    /// Print a range of lines from a note.
    Get {
        /// Note path relative to the notes root.
        path: String,

        /// First line to print (1-based).
        #[arg(long, default_value_t = 1)]
        from: usize,

        /// Number of lines to print.
        #[arg(long, default_value_t = DEFAULT_LINES)]
        lines: usize,
    },

    /// Append text to a note and index it.
    Write {
        /// Text to write.
        content: String,

        /// `daily` (today's log) or `longterm` (the long-term memory file).
        #[arg(long, default_value = "daily")]
        target: WriteTarget,
    },

    /// Show index statistics.
    Stats,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("RECALL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "recall", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            run_init(&cfg).await?;
        }
        Commands::Index { paths, rebuild } => {
            let engine = Engine::open(cfg).await?;
            let report = if paths.is_empty() {
                engine.index_all(rebuild).await?
            } else {
                engine.index(&paths, rebuild).await?
            };
            engine.close().await;
            print_report(&report);
            if report.failed() > 0 {
                bail!("{} note(s) failed to index", report.failed());
            }
        }
        Commands::Search {
            query,
            limit,
            min_score,
            mode,
            json,
            verbose,
        } => {
            let engine = Engine::open(cfg).await?;
            let mut options = engine.default_search_options();
            options.mode = mode;
            if let Some(limit) = limit {
                options.max_results = limit;
            }
            if let Some(min_score) = min_score {
                options.min_score = min_score;
            }
            let hits = engine.search(&query, &options).await?;
            engine.close().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_hits(&hits, verbose);
            }
        }
        Commands::Get { path, from, lines } => {
            // Reads straight from disk; no database or provider involved.
            let notes = NoteSet::new(&cfg.notes)?;
            let range = get_range(&notes, &path, from, lines).await?;
            println!("{}", range.content);
        }
        Commands::Write { content, target } => {
            let engine = Engine::open(cfg).await?;
            let (file_path, report) = engine.write(target, &content).await?;
            engine.close().await;
            println!("Wrote to {}", file_path);
            print_report(&report);
            if report.failed() > 0 {
                bail!("note was written but could not be indexed");
            }
        }
        Commands::Stats => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let stats = SqliteStore::new(pool.clone()).stats().await?;
            pool.close().await;
            print!("{}", render_stats(&stats, &cfg.db.path));
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

fn print_report(report: &IndexReport) {
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Indexed {
                added,
                kept,
                relocated,
                removed,
            } => println!(
                "  indexed  {} (+{} ={} ~{} -{})",
                file.file_path, added, kept, relocated, removed
            ),
            FileOutcome::Removed { removed } => {
                println!("  removed  {} (-{})", file.file_path, removed)
            }
            FileOutcome::Failed { error } => println!("  FAILED   {}: {}", file.file_path, error),
        }
    }
    println!(
        "{} note(s), {} chunk(s) embedded, {} failed",
        report.files.len(),
        report.added(),
        report.failed()
    );
}

fn print_hits(hits: &[SearchHit], verbose: bool) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}:{}-{}",
            i + 1,
            hit.score,
            hit.file_path,
            hit.line_start,
            hit.line_end
        );
        if verbose {
            println!(
                "    vector: {:.3}  keyword: {:.3}",
                hit.vector_score, hit.keyword_score
            );
        }
        let preview: String = hit.content.chars().take(240).collect();
        for line in preview.lines() {
            println!("    {}", line);
        }
        println!();
    }
}

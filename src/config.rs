//! TOML configuration.
//!
//! Every engine instance is built from an explicit [`Config`] value; nothing
//! is read from process-wide state after loading. Most sections are optional
//! and fall back to the defaults below, which match a local Ollama setup.
//!
//! ```toml
//! [db]
//! path = "./data/recall.sqlite"
//!
//! [notes]
//! root = "."
//!
//! [embedding]
//! provider = "ollama"
//! base_url = "http://localhost:11434/api/embeddings"
//! model = "nomic-embed-text"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub notes: NotesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    /// Directory every indexed `file_path` is relative to.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Long-term memory file, relative to `root`.
    #[serde(default = "default_longterm_file")]
    pub longterm_file: PathBuf,
    /// Directory holding one `YYYY-MM-DD.md` log per day, relative to `root`.
    #[serde(default = "default_daily_dir")]
    pub daily_dir: PathBuf,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_longterm_file() -> PathBuf {
    PathBuf::from("MEMORY.md")
}
fn default_daily_dir() -> PathBuf {
    PathBuf::from("memory")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Approximate chunk size, counted in whitespace-delimited words.
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_target_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            min_score: default_min_score(),
            max_results: default_max_results(),
            candidate_k_keyword: default_candidate_k(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.7
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_min_score() -> f64 {
    0.25
}
fn default_max_results() -> usize {
    6
}
fn default_candidate_k() -> i64 {
    50
}

/// Which wire protocol the embedding backend speaks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama service, no auth.
    Ollama,
    /// OpenAI cloud API, bearer auth required.
    Openai,
    /// Any OpenAI-compatible service, bearer auth optional.
    Compatible,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Openai => "openai",
            ProviderKind::Compatible => "compatible",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Inline API key. Prefer `api_key_env` for anything checked in.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is not set.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Expected vector size. Learned from the first response when unset.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on in-flight provider requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            dims: None,
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Ollama
}
fn default_base_url() -> String {
    "http://localhost:11434/api/embeddings".to_string()
}
fn default_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    60
}

impl EmbeddingConfig {
    /// The inline key if present, else the value of `api_key_env`.
    /// Empty strings count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        let present = |k: &String| !k.trim().is_empty();
        self.api_key
            .clone()
            .filter(present)
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(present))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// How many files are chunked and embedded at the same time.
    #[serde(default = "default_file_concurrency")]
    pub file_concurrency: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            file_concurrency: default_file_concurrency(),
        }
    }
}

fn default_file_concurrency() -> usize {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Relative paths in the file are relative to the file, not the cwd.
    if let Some(base) = path.parent() {
        if config.db.path.is_relative() {
            config.db.path = base.join(&config.db.path);
        }
        if config.notes.root.is_relative() {
            config.notes.root = base.join(&config.notes.root);
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.target_tokens == 0 {
        bail!("chunking.target_tokens must be > 0");
    }
    if chunking.overlap_tokens >= chunking.target_tokens {
        bail!(
            "chunking.overlap_tokens ({}) must be less than chunking.target_tokens ({})",
            chunking.overlap_tokens,
            chunking.target_tokens
        );
    }

    let retrieval = &config.retrieval;
    for (name, weight) in [
        ("vector_weight", retrieval.vector_weight),
        ("keyword_weight", retrieval.keyword_weight),
    ] {
        if !(0.0..=1.0).contains(&weight) {
            bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }
    if retrieval.max_results < 1 {
        bail!("retrieval.max_results must be >= 1");
    }
    if retrieval.candidate_k_keyword < 1 {
        bail!("retrieval.candidate_k_keyword must be >= 1");
    }

    let embedding = &config.embedding;
    if embedding.model.trim().is_empty() {
        bail!("embedding.model must not be empty");
    }
    if embedding.base_url.trim().is_empty() {
        bail!("embedding.base_url must not be empty");
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }
    if embedding.batch_size == 0 || embedding.max_concurrency == 0 {
        bail!("embedding.batch_size and embedding.max_concurrency must be > 0");
    }
    if embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    if config.indexing.file_concurrency == 0 {
        bail!("indexing.file_concurrency must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
        let path = tmp.path().join("recall.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "data/recall.sqlite"

[notes]
root = "notes"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.path, tmp.path().join("data/recall.sqlite"));
        assert_eq!(config.notes.root, tmp.path().join("notes"));
        assert_eq!(config.chunking.target_tokens, 400);
        assert_eq!(config.chunking.overlap_tokens, 80);
        assert_eq!(config.retrieval.max_results, 6);
        assert!((config.retrieval.min_score - 0.25).abs() < 1e-9);
        assert_eq!(config.embedding.provider, ProviderKind::Ollama);
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.notes.longterm_file, PathBuf::from("MEMORY.md"));
    }

    #[test]
    fn test_provider_kinds_parse() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "/tmp/x.sqlite"

[notes]
root = "/tmp/notes"

[embedding]
provider = "compatible"
base_url = "http://localhost:8080/v1"
model = "bge-m3"
dims = 1024
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::Compatible);
        assert_eq!(config.embedding.dims, Some(1024));
        assert_eq!(config.db.path, PathBuf::from("/tmp/x.sqlite"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[notes]
root = "."

[embedding]
provider = "carrier-pigeon"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_overlap_must_be_below_target() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[notes]
root = "."

[chunking]
target_tokens = 50
overlap_tokens = 50
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn test_weight_out_of_range_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[notes]
root = "."

[retrieval]
vector_weight = 1.5
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_inline_api_key_wins_and_blank_is_absent() {
        let mut cfg = EmbeddingConfig {
            api_key: Some("sk-inline".to_string()),
            api_key_env: "RECALL_TEST_UNSET_KEY_VAR".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-inline"));

        cfg.api_key = Some("   ".to_string());
        assert_eq!(cfg.resolve_api_key(), None);
    }

    #[test]
    fn test_blank_inline_key_falls_back_to_env() {
        std::env::set_var("RECALL_TEST_FALLBACK_KEY", "sk-from-env");
        let cfg = EmbeddingConfig {
            api_key: Some(String::new()),
            api_key_env: "RECALL_TEST_FALLBACK_KEY".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-from-env"));
    }
}

//! Error taxonomy for the indexing and retrieval engine.
//!
//! Callers need to tell "nothing matched" apart from "search could not run",
//! and a provider outage apart from a broken database, so engine operations
//! return [`Error`] rather than an opaque `anyhow::Error`.
//!
//! | Variant | Meaning | Retry? |
//! |---------|---------|--------|
//! | [`Error::ProviderUnavailable`] | Embedding backend unreachable or timed out | By the caller |
//! | [`Error::ProviderError`] | Backend answered with an error or a malformed body | No |
//! | [`Error::DimensionMismatch`] | Vectors from different models/sizes would mix | After a rebuild |
//! | [`Error::Storage`] | SQLite I/O or constraint failure | No |
//! | [`Error::Io`] | A note file could not be read or written | No |
//! | [`Error::InvalidPath`] | A note path escapes the notes root | No |
//! | [`Error::InvalidInput`] | A request the engine cannot act on (e.g. blank note) | No |

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection failure or request timeout talking to the embedding backend.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The backend responded, but with a non-2xx status or an unusable payload.
    #[error("embedding provider error: {0}")]
    ProviderError(String),

    /// Configuration drift between the active model and stored vectors.
    #[error("embedding dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid note path: {0}")]
    InvalidPath(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// True for failures of the embedding backend (as opposed to local storage).
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_) | Error::ProviderError(_)
        )
    }
}

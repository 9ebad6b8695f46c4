//! Typed errors for the orchestration core.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Failures inside a
//! single job never surface here: they are folded into the job's terminal
//! state by the processor. What does surface is infrastructure trouble
//! (storage), bad input, and collaborator errors the caller must decide on.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by orchestration operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Storage operation failed
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Submitted input was rejected
    #[error("invalid input: {reason}")]
    Validation { reason: String },

    /// Search capability failed after retries
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// Scrape job does not exist
    #[error("scrape job not found: {id}")]
    JobNotFound { id: Uuid },

    /// Discovery job does not exist
    #[error("discovery job not found: {id}")]
    DiscoveryNotFound { id: Uuid },

    /// Tracked search does not exist
    #[error("tracked search not found: {id}")]
    TrackedSearchNotFound { id: Uuid },

    /// Dead letter does not exist or was already replayed
    #[error("dead letter not found: {id}")]
    DeadLetterNotFound { id: Uuid },

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend query failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored value could not be decoded
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// In-memory state lock was poisoned by a panicking writer
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Errors returned by the fetch capability for a single attempt.
///
/// Both variants are treated as a failed attempt by the escalation engine,
/// never as a reason to abort the job.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Attempt exceeded its timeout
    #[error("fetch timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Network or upstream failure before a response was produced
    #[error("fetch transport error: {0}")]
    Transport(String),
}

/// Errors returned by the search capability.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Upstream temporarily unavailable (retryable)
    #[error("search upstream unavailable: {0}")]
    Unavailable(String),

    /// Request rejected by upstream (not retryable)
    #[error("invalid search parameters: {0}")]
    InvalidParameters(String),
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Unavailable(_))
    }
}

/// Errors returned by the record extractor.
#[derive(Debug, Clone, Error)]
#[error("extraction failed: {0}")]
pub struct ExtractError(pub String);

/// Errors returned by the webhook transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("webhook request timed out")]
    Timeout,

    #[error("webhook request failed: {0}")]
    Request(String),
}

/// A string did not name a known enum variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

//! Error types for repository operations

use thiserror::Error;

/// Repository operation result type
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Repository operation errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Path, slug or validation request does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Version identifier does not exist for this content
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Permission or ownership violation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Nesting a container deeper than the configured maximum
    #[error("Depth exceeded: '{slug}' would sit at container depth {depth} (max {max})")]
    DepthExceeded {
        slug: String,
        depth: usize,
        max: usize,
    },

    /// Structurally invalid move (depth, self-nesting, kind mixing)
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// Parent cannot hold a child of that kind
    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    /// Title that normalizes to an empty slug
    #[error("Invalid title: {0}")]
    InvalidTitle(String),

    /// Missing or malformed request data (e.g. empty validation comment)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed or incomplete archive on import
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Another mutation is in flight for this content; safe to retry
    #[error("Content {0} is busy: another mutation is in flight")]
    Busy(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

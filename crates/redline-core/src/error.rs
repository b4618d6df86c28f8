//! Unified error types for redline

use thiserror::Error;

/// Unified error type for all redline operations
#[derive(Error, Debug)]
pub enum RedlineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Version control errors
    #[error("Git command failed: {0}")]
    Repository(String),

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Cannot move past the divergence point: {0}")]
    Boundary(String),

    #[error("Not on an edit branch (current branch: {0})")]
    NotOnEditBranch(String),

    #[error("Nothing to redo")]
    NothingToRedo,

    // Agent errors
    #[error("Agent process error: {0}")]
    AgentProcess(String),

    // Screenshot errors
    #[error("Failed to decode screenshot: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RedlineError {
    /// Whether the caller asked for something the repository state does not allow
    ///
    /// These are the failures a client can fix by changing its request, as
    /// opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RedlineError::Boundary(_)
                | RedlineError::NotOnEditBranch(_)
                | RedlineError::NothingToRedo
        )
    }
}

/// Result type alias using RedlineError
pub type Result<T> = std::result::Result<T, RedlineError>;

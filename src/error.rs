//! Error kinds surfaced by the extraction, embedding and query pipeline.
//!
//! Nothing in the pipeline retries; every variant propagates to the caller.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required input file is absent or a parameter is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Credential acquisition or refresh failed; the user must re-consent.
    #[error("authentication error: {0}")]
    Authentication(String),
    /// Any failure from the mail API, including malformed payloads.
    #[error("provider error: {0}")]
    Provider(String),
    #[error("vector index not found at {}", .0.display())]
    IndexNotFound(PathBuf),
    /// Failure from the embedding model or the vector index during a batch.
    #[error("collaborator error: {0}")]
    Collaborator(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

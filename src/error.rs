//! Error taxonomy for the analysis pipeline.
//!
//! Parse and chunking errors abort the ingestion attempt that raised them;
//! nothing partial is ever published. Embedding and inference errors never
//! invalidate an already-built index — embedding failures degrade the index
//! to partial, inference failures at query time are retryable by the caller.
//!
//! Messages carry structural diagnostics only (offsets, paths, counts),
//! never file content or credentials.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoLensError {
    /// Malformed ingestion text. Fatal for the ingestion attempt.
    #[error("parse error at byte {offset}: {reason}")]
    Parse { reason: String, offset: usize },

    /// Chunking failed for a file. Should not occur under valid input.
    #[error("chunking error in {path}: {reason}")]
    Chunking { path: String, reason: String },

    /// Some embeddings could not be computed after retries.
    #[error("embedding failed for {failed} of {total} chunks")]
    Embedding { failed: usize, total: usize },

    /// The inference service failed at query time. Retryable; the index
    /// itself is unaffected.
    #[error("inference service failure: {0}")]
    Inference(#[source] anyhow::Error),

    /// No index exists for this fingerprint. Trigger ingestion first.
    #[error("no index for fingerprint {0}")]
    NotIndexed(String),

    /// The fingerprint's index was evicted under capacity pressure.
    /// Re-ingest to rebuild.
    #[error("index for fingerprint {0} was evicted; re-ingest to rebuild")]
    Evicted(String),

    /// Ingestion exceeded its time budget. Nothing was published.
    #[error("ingestion timed out after {0}s; nothing was published")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RepoLensError {
    /// True for errors the caller can resolve by retrying or re-ingesting,
    /// as opposed to malformed input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepoLensError::Inference(_)
                | RepoLensError::Evicted(_)
                | RepoLensError::NotIndexed(_)
                | RepoLensError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RepoLensError>;

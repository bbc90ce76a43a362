//! Typed errors surfaced to callers of the retrieval engine.
//!
//! Failures that are recovered locally (a document that will not parse, a
//! semantic query that times out) are logged and never reach these types.

use thiserror::Error;

/// Failure of a full index rebuild. The previous snapshot stays live.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("document source lists no documents")]
    NoDocuments,

    #[error("no content extracted from {documents} document(s) ({failed} failed)")]
    EmptyCorpus { documents: usize, failed: usize },

    #[error("document source failed: {0:#}")]
    Source(anyhow::Error),
}

/// Failure of a retrieval request as a whole.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The semantic query failed or is not configured, and the lexical
    /// index has nothing to fall back on.
    #[error("no usable index: semantic search unavailable ({reason}) and lexical index is empty")]
    IndicesUnavailable { reason: String },
}

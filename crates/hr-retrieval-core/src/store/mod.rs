//! Semantic index contract.
//!
//! The core never implements nearest-neighbour search against a real
//! vector database; it talks to one through [`SemanticIndex`]. The
//! contract is deliberately narrow: insert a batch of `(text, metadata)`
//! records, query the `k` nearest records for a text.
//!
//! Implementations must be `Send + Sync`; queries are awaited without
//! blocking other concurrent requests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ChunkMetadata;

/// One record handed to [`SemanticIndex::insert_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticRecord {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One nearest-neighbour hit, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Smaller is closer.
    pub distance: f64,
}

/// An embedding-backed similarity index owned by an external collaborator.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Insert one bounded batch of records.
    ///
    /// The caller keeps batches small (≈50 records) and retries a failed
    /// batch on its own; implementations need not be atomic across batches.
    async fn insert_batch(&self, records: &[SemanticRecord]) -> Result<()>;

    /// Return up to `k` records nearest to `text`, ordered by ascending distance.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SemanticHit>>;
}

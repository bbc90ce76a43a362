//! Index snapshots and the swappable live index.
//!
//! An [`IndexSnapshot`] is immutable once built: the chunk list, the BM25
//! index over it, and (optionally) the semantic index that was populated
//! from the same chunks. [`IndexHandle`] holds the live snapshot behind an
//! `Arc`; a rebuild constructs a complete new snapshot off to the side and
//! swaps the pointer. Queries clone the `Arc` at the start and keep using it
//! even if a rebuild lands mid-request.
//!
//! Rebuilds are serialized by an async mutex. A failed rebuild leaves the
//! previous snapshot live.

use std::sync::{Arc, RwLock};

use futures::lock::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::ChunkingParams;
use crate::error::RebuildError;
use crate::ingest::{ingest_corpus, DocumentSource};
use crate::lexical::LexicalIndex;
use crate::models::Chunk;
use crate::store::{SemanticIndex, SemanticRecord};

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 50;
pub const DEFAULT_INSERT_RETRIES: usize = 2;

/// How chunks are pushed into the semantic collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub insert_batch_size: usize,
    /// Extra attempts per batch after the first failure.
    pub insert_retries: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            insert_retries: DEFAULT_INSERT_RETRIES,
        }
    }
}

/// Statistics from one successful rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub generation: u64,
    pub documents: usize,
    pub failed_documents: Vec<String>,
    pub chunks: usize,
    pub table_chunks: usize,
    pub semantic_enabled: bool,
    pub semantic_records: usize,
    pub failed_batches: usize,
}

/// One complete, immutable index generation.
pub struct IndexSnapshot {
    generation: u64,
    chunks: Vec<Chunk>,
    lexical: LexicalIndex,
    semantic: Option<Arc<dyn SemanticIndex>>,
}

impl IndexSnapshot {
    /// The snapshot served before the first rebuild: no chunks, no semantic index.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            chunks: Vec::new(),
            lexical: LexicalIndex::default(),
            semantic: None,
        }
    }

    /// Assemble a snapshot from chunks and an already-populated semantic index.
    pub fn new(generation: u64, chunks: Vec<Chunk>, semantic: Option<Arc<dyn SemanticIndex>>) -> Self {
        let lexical = LexicalIndex::from_chunks(&chunks);
        Self {
            generation,
            chunks,
            lexical,
            semantic,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn semantic(&self) -> Option<&Arc<dyn SemanticIndex>> {
        self.semantic.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("generation", &self.generation)
            .field("chunks", &self.chunks.len())
            .field("semantic", &self.semantic.is_some())
            .finish()
    }
}

/// The process-wide live index.
pub struct IndexHandle {
    current: RwLock<Arc<IndexSnapshot>>,
    rebuild_lock: Mutex<()>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::with_snapshot(IndexSnapshot::empty())
    }

    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// The snapshot new queries should use.
    pub fn current(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap(&self, snapshot: IndexSnapshot) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(snapshot);
    }

    /// Discard all index state and rebuild it from `source`.
    ///
    /// `semantic` must be a fresh, empty semantic index (or `None` when
    /// semantic search is disabled); it becomes part of the new snapshot.
    /// Concurrent calls queue behind each other.
    pub async fn rebuild<S>(
        &self,
        source: &S,
        semantic: Option<Arc<dyn SemanticIndex>>,
        options: &BuildOptions,
        params: &ChunkingParams,
    ) -> Result<RebuildReport, RebuildError>
    where
        S: DocumentSource + ?Sized,
    {
        let _exclusive = self.rebuild_lock.lock().await;
        let generation = self.current().generation + 1;

        let corpus = ingest_corpus(source, params).await?;

        let mut report = RebuildReport {
            generation,
            documents: corpus.documents,
            failed_documents: corpus.failed_documents.clone(),
            chunks: corpus.chunks.len(),
            table_chunks: corpus.table_chunks(),
            ..RebuildReport::default()
        };

        let semantic = match semantic {
            Some(index) => {
                let (inserted, failed) =
                    populate_semantic(index.as_ref(), &corpus.chunks, options).await;
                report.semantic_records = inserted;
                report.failed_batches = failed;
                if inserted == 0 {
                    warn!("semantic index received no records; serving lexical-only");
                    None
                } else {
                    Some(index)
                }
            }
            None => None,
        };
        report.semantic_enabled = semantic.is_some();

        self.swap(IndexSnapshot::new(generation, corpus.chunks, semantic));

        info!(
            generation,
            documents = report.documents,
            failed_documents = report.failed_documents.len(),
            chunks = report.chunks,
            table_chunks = report.table_chunks,
            semantic_records = report.semantic_records,
            failed_batches = report.failed_batches,
            "index rebuilt"
        );
        Ok(report)
    }
}

/// Insert chunks in bounded batches, retrying each batch on its own.
///
/// Returns `(records inserted, batches that exhausted their retries)`.
async fn populate_semantic(
    index: &dyn SemanticIndex,
    chunks: &[Chunk],
    options: &BuildOptions,
) -> (usize, usize) {
    let batch_size = options.insert_batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);
    let mut inserted = 0;
    let mut failed_batches = 0;

    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let records: Vec<SemanticRecord> = batch
            .iter()
            .map(|c| SemanticRecord {
                text: c.content.clone(),
                metadata: c.metadata(),
            })
            .collect();

        let mut attempt = 0;
        loop {
            match index.insert_batch(&records).await {
                Ok(()) => {
                    inserted += records.len();
                    break;
                }
                Err(e) if attempt < options.insert_retries => {
                    attempt += 1;
                    warn!(
                        batch = batch_no + 1,
                        total_batches,
                        attempt,
                        error = %format!("{:#}", e),
                        "semantic insert failed, retrying batch"
                    );
                }
                Err(e) => {
                    warn!(
                        batch = batch_no + 1,
                        total_batches,
                        error = %format!("{:#}", e),
                        "semantic insert failed, giving up on batch"
                    );
                    failed_batches += 1;
                    break;
                }
            }
        }
    }

    (inserted, failed_batches)
}

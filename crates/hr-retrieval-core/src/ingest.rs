//! Corpus ingestion: document source → chunks.
//!
//! A [`DocumentSource`] enumerates named documents and extracts their pages.
//! [`ingest_corpus`] walks every document in sorted-name order and turns
//! each page into prose chunks followed by table chunks. A document that
//! fails to extract is logged and skipped; it never aborts the corpus.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::chunk::{chunk_page, ChunkingParams};
use crate::error::RebuildError;
use crate::models::{Chunk, ExtractedDocument};
use crate::table::table_chunk;

/// A named, enumerable set of source documents.
///
/// The core depends only on "list documents" and "extract pages", never on
/// a file format. Implementations decide how page text and tables are found.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Names of all documents currently in the source.
    async fn list_documents(&self) -> Result<Vec<String>>;

    /// Extract the pages of one document.
    ///
    /// Pages that cannot be read should come back with empty text rather
    /// than failing the whole document.
    async fn extract(&self, name: &str) -> Result<ExtractedDocument>;
}

/// All chunks of a corpus plus bookkeeping from the ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub chunks: Vec<Chunk>,
    pub documents: usize,
    pub failed_documents: Vec<String>,
}

impl Corpus {
    pub fn table_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.kind == crate::models::ChunkKind::Table)
            .count()
    }
}

/// Chunk one extracted document under the given name.
///
/// Pages are processed in ascending page order; within a page prose chunks
/// come before table chunks. Sequence indices start at 0 and are contiguous.
pub fn chunk_document(name: &str, doc: &ExtractedDocument, params: &ChunkingParams) -> Vec<Chunk> {
    let mut pages: Vec<_> = doc.pages.iter().collect();
    pages.sort_by_key(|p| p.number);

    let mut next_index = 0u32;
    let mut chunks = Vec::new();
    for page in pages {
        chunks.extend(chunk_page(name, page.number, &page.text, params, &mut next_index));
        for table in &page.tables {
            if let Some(chunk) = table_chunk(name, page.number, table, &mut next_index) {
                chunks.push(chunk);
            }
        }
    }
    chunks
}

/// Ingest every document of a source into one ordered chunk list.
///
/// # Errors
///
/// - [`RebuildError::Source`] if the source cannot be listed.
/// - [`RebuildError::NoDocuments`] if it lists nothing.
/// - [`RebuildError::EmptyCorpus`] if no document yields a single chunk.
pub async fn ingest_corpus<S>(source: &S, params: &ChunkingParams) -> Result<Corpus, RebuildError>
where
    S: DocumentSource + ?Sized,
{
    let mut names = source.list_documents().await.map_err(RebuildError::Source)?;
    names.sort();
    names.dedup();
    if names.is_empty() {
        return Err(RebuildError::NoDocuments);
    }

    let total = names.len();
    let mut corpus = Corpus {
        documents: total,
        ..Corpus::default()
    };

    for (i, name) in names.iter().enumerate() {
        match source.extract(name).await {
            Ok(doc) => {
                let chunks = chunk_document(name, &doc, params);
                info!(
                    document = %name,
                    pages = doc.pages.len(),
                    chunks = chunks.len(),
                    "ingested document {}/{}",
                    i + 1,
                    total
                );
                corpus.chunks.extend(chunks);
            }
            Err(e) => {
                warn!(document = %name, error = %format!("{:#}", e), "skipping document");
                corpus.failed_documents.push(name.clone());
            }
        }
    }

    if corpus.chunks.is_empty() {
        return Err(RebuildError::EmptyCorpus {
            documents: total,
            failed: corpus.failed_documents.len(),
        });
    }

    Ok(corpus)
}

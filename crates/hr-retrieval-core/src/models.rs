//! Core data models shared by ingestion, indexing, and retrieval.

use serde::{Deserialize, Serialize};

/// Whether a chunk holds a prose passage or one rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Table,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Table => "table",
        }
    }
}

/// Where a chunk came from: the source document and its 1-based page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub source_document: String,
    pub source_page: u32,
}

impl Provenance {
    pub fn new(source_document: impl Into<String>, source_page: u32) -> Self {
        Self {
            source_document: source_document.into(),
            source_page,
        }
    }
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub provenance: Provenance,
    pub kind: ChunkKind,
    /// Position within the document. Ordering only, never relevance.
    pub sequence_index: u32,
}

impl Chunk {
    /// Metadata shape handed to the semantic index alongside the text.
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source_document: Some(self.provenance.source_document.clone()),
            source_page: Some(self.provenance.source_page),
            kind: Some(self.kind),
            sequence_index: Some(self.sequence_index),
        }
    }
}

/// Metadata carried through the semantic collaborator.
///
/// Every field is optional because an external vector service may return
/// records written by other tools; missing provenance is cited as a
/// synthetic "Source N" downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChunkKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u32>,
}

impl ChunkMetadata {
    pub fn provenance(&self) -> Option<Provenance> {
        match (&self.source_document, self.source_page) {
            (Some(doc), Some(page)) => Some(Provenance::new(doc.clone(), page)),
            _ => None,
        }
    }
}

/// A table as extracted: the first row is the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<Option<String>>>) -> Self {
        Self { rows }
    }

    /// Convenience constructor for fully-populated tables.
    pub fn from_strings<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| Some(c.into())).collect())
                .collect(),
        }
    }
}

/// One page of an extracted document. Image-only pages carry empty text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
    pub tables: Vec<RawTable>,
}

/// A named source document with its ordered pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub name: String,
    pub pages: Vec<ExtractedPage>,
}

/// Which sub-index produced a retrieval candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Vector,
    Bm25,
}

/// A per-query candidate. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub content: String,
    pub provenance: Option<Provenance>,
    pub kind: ChunkKind,
    /// BM25 score for `Bm25`, distance for `Vector`. Not comparable across sources.
    pub signal: f64,
    pub source: RetrievalSource,
}

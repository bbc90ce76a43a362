//! Hybrid retrieval: semantic + BM25 candidates → context bundle.
//!
//! # Algorithm
//!
//! 1. Query the semantic index for `vector_k` hits and the BM25 index for
//!    `keyword_k` positive-scoring chunks.
//! 2. Concatenate the two lists, vector hits first.
//! 3. Drop exact duplicates by a SHA-256 fingerprint of the first
//!    `fingerprint_prefix_chars` characters. The first occurrence wins.
//! 4. Move every table candidate ahead of every prose candidate, keeping
//!    relative order within each class.
//! 5. Truncate to `max_context_chunks`.
//!
//! Scores from the two sources are never fused or compared; ordering is
//! structural only.
//!
//! # Degradation
//!
//! A semantic query that errors (or a snapshot built without a semantic
//! index) degrades to BM25-only retrieval. Only when the lexical index is
//! also empty does [`retrieve`] fail with [`RetrieveError::IndicesUnavailable`].

use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::RetrieveError;
use crate::index::IndexSnapshot;
use crate::models::{ChunkKind, RetrievalResult, RetrievalSource};
use crate::store::SemanticHit;
use crate::table::is_table_content;

pub const DEFAULT_VECTOR_K: usize = 15;
pub const DEFAULT_KEYWORD_K: usize = 10;
pub const DEFAULT_MAX_CONTEXT_CHUNKS: usize = 12;
pub const DEFAULT_FINGERPRINT_PREFIX_CHARS: usize = 100;

const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

/// Tunable retrieval sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub vector_k: usize,
    pub keyword_k: usize,
    pub max_context_chunks: usize,
    pub fingerprint_prefix_chars: usize,
    /// Semantic hits farther than this are dropped. `None` keeps every hit.
    pub max_vector_distance: Option<f64>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            vector_k: DEFAULT_VECTOR_K,
            keyword_k: DEFAULT_KEYWORD_K,
            max_context_chunks: DEFAULT_MAX_CONTEXT_CHUNKS,
            fingerprint_prefix_chars: DEFAULT_FINGERPRINT_PREFIX_CHARS,
            max_vector_distance: None,
        }
    }
}

/// Whether answers must come from the policy corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveMode {
    /// Answer only from retrieved context.
    Restricted,
    /// Skip retrieval; the generator answers from its own knowledge.
    Open,
}

/// Outcome of a retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Context(ContextBundle),
    /// Restricted mode found nothing relevant.
    NoContextFound,
    /// Open mode: retrieval was not performed.
    Skipped,
}

/// The deduplicated, table-first, size-capped context for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBundle {
    pub entries: Vec<RetrievalResult>,
    /// True when semantic retrieval was unavailable for this query.
    pub degraded: bool,
}

impl ContextBundle {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Citation for the entry at `position`: `"<document>, page <n>"`, or
    /// `"Source <position + 1>"` when provenance is missing.
    pub fn citation(&self, position: usize) -> String {
        match self.entries.get(position).and_then(|e| e.provenance.as_ref()) {
            Some(p) => format!("{}, page {}", p.source_document, p.source_page),
            None => format!("Source {}", position + 1),
        }
    }

    /// Serialize for the prompt: each entry under a labelled citation header.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let label = if is_table(entry) {
                    "RELEVANT TABLE DATA"
                } else {
                    "RELEVANT CONTEXT"
                };
                format!("[{} - {}]\n{}", label, self.citation(i), entry.content)
            })
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR)
    }
}

/// Table-bearing if flagged as a table or carrying table markers.
pub fn is_table(result: &RetrievalResult) -> bool {
    result.kind == ChunkKind::Table || is_table_content(&result.content)
}

/// Vector candidates followed by BM25 candidates.
pub fn merge_candidates(
    vector: Vec<RetrievalResult>,
    bm25: Vec<RetrievalResult>,
) -> Vec<RetrievalResult> {
    let mut merged = vector;
    merged.extend(bm25);
    merged
}

fn fingerprint(content: &str, prefix_chars: usize) -> Vec<u8> {
    let prefix: String = content.chars().take(prefix_chars).collect();
    Sha256::digest(prefix.as_bytes()).to_vec()
}

/// Keep the first candidate for each content fingerprint.
pub fn dedup_by_fingerprint(
    candidates: Vec<RetrievalResult>,
    prefix_chars: usize,
) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(fingerprint(&c.content, prefix_chars)))
        .collect()
}

/// Stable partition: all tables, then all prose.
pub fn prioritize_tables(candidates: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let (mut tables, prose): (Vec<_>, Vec<_>) = candidates.into_iter().partition(is_table);
    tables.extend(prose);
    tables
}

fn from_semantic_hit(hit: SemanticHit) -> RetrievalResult {
    let kind = hit.metadata.kind.unwrap_or_else(|| {
        if is_table_content(&hit.text) {
            ChunkKind::Table
        } else {
            ChunkKind::Text
        }
    });
    RetrievalResult {
        provenance: hit.metadata.provenance(),
        content: hit.text,
        kind,
        signal: hit.distance,
        source: RetrievalSource::Vector,
    }
}

async fn semantic_candidates(
    snapshot: &IndexSnapshot,
    question: &str,
    params: &RetrievalParams,
) -> Result<Vec<RetrievalResult>, String> {
    let Some(index) = snapshot.semantic() else {
        return Err("semantic index not configured".to_string());
    };
    let hits = index
        .query(question, params.vector_k)
        .await
        .map_err(|e| format!("{:#}", e))?;
    Ok(hits
        .into_iter()
        .filter(|h| params.max_vector_distance.map_or(true, |max| h.distance <= max))
        .map(from_semantic_hit)
        .collect())
}

fn lexical_candidates(
    snapshot: &IndexSnapshot,
    question: &str,
    params: &RetrievalParams,
) -> Vec<RetrievalResult> {
    snapshot
        .lexical()
        .top_n(question, params.keyword_k)
        .into_iter()
        .filter_map(|(pos, score)| {
            let chunk = snapshot.chunks().get(pos)?;
            Some(RetrievalResult {
                content: chunk.content.clone(),
                provenance: Some(chunk.provenance.clone()),
                kind: chunk.kind,
                signal: score,
                source: RetrievalSource::Bm25,
            })
        })
        .collect()
}

/// Retrieve a context bundle for an (already expanded) question.
pub async fn retrieve(
    snapshot: &IndexSnapshot,
    question: &str,
    mode: RetrieveMode,
    params: &RetrievalParams,
) -> Result<Retrieval, RetrieveError> {
    if mode == RetrieveMode::Open {
        return Ok(Retrieval::Skipped);
    }

    let lexical = lexical_candidates(snapshot, question, params);
    let (vector, degraded) = match semantic_candidates(snapshot, question, params).await {
        Ok(hits) => (hits, false),
        Err(reason) => {
            if snapshot.lexical().is_empty() {
                return Err(RetrieveError::IndicesUnavailable { reason });
            }
            if snapshot.semantic().is_some() {
                warn!(reason = %reason, "semantic query failed, using keyword results only");
            }
            (Vec::new(), true)
        }
    };

    let (vector_hits, bm25_hits) = (vector.len(), lexical.len());
    let merged = merge_candidates(vector, lexical);
    let unique = dedup_by_fingerprint(merged, params.fingerprint_prefix_chars);
    let mut ordered = prioritize_tables(unique);
    ordered.truncate(params.max_context_chunks);

    for (i, c) in ordered.iter().enumerate() {
        debug!(
            rank = i + 1,
            source = ?c.source,
            kind = c.kind.as_str(),
            signal = c.signal,
            "context candidate"
        );
    }
    info!(
        vector_hits,
        bm25_hits,
        kept = ordered.len(),
        tables = ordered.iter().filter(|c| is_table(c)).count(),
        degraded,
        "retrieval complete"
    );

    if ordered.is_empty() {
        return Ok(Retrieval::NoContextFound);
    }
    Ok(Retrieval::Context(ContextBundle {
        entries: ordered,
        degraded,
    }))
}

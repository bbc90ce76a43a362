//! In-memory [`SemanticIndex`] over an [`Embedder`].
//!
//! Vectors live in a `Vec` behind `std::sync::RwLock`. Queries scan every
//! vector and report `1 − cosine` as the distance.

use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_distance, Embedder};

use super::{SemanticHit, SemanticIndex, SemanticRecord};

struct StoredVector {
    record: SemanticRecord,
    vector: Vec<f32>,
}

/// Brute-force vector index for local use and tests.
pub struct InMemorySemanticIndex {
    embedder: Arc<dyn Embedder>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemorySemanticIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            vectors: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    async fn insert_batch(&self, records: &[SemanticRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != records.len() {
            bail!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                records.len()
            );
        }

        let mut stored = self
            .vectors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (record, vector) in records.iter().zip(vectors) {
            stored.push(StoredVector {
                record: record.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<SemanticHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let stored = self
            .vectors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut hits: Vec<SemanticHit> = stored
            .iter()
            .map(|sv| SemanticHit {
                text: sv.record.text.clone(),
                metadata: sv.record.metadata.clone(),
                distance: cosine_distance(&query_vec, &sv.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use futures::executor::block_on;

    /// Bag-of-letters embedder: deterministic and good enough to rank.
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes() {
                        if c.is_ascii_lowercase() {
                            v[(c - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    fn record(text: &str) -> SemanticRecord {
        SemanticRecord {
            text: text.to_string(),
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_query_orders_by_distance() {
        let index = InMemorySemanticIndex::new(Arc::new(LetterEmbedder));
        block_on(index.insert_batch(&[record("zzzz"), record("leave"), record("aaaa")])).unwrap();
        assert_eq!(index.len(), 3);

        let hits = block_on(index.query("leave", 2)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "leave");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_empty_batch_and_zero_k() {
        let index = InMemorySemanticIndex::new(Arc::new(LetterEmbedder));
        block_on(index.insert_batch(&[])).unwrap();
        assert!(index.is_empty());
        assert!(block_on(index.query("leave", 0)).unwrap().is_empty());
    }
}

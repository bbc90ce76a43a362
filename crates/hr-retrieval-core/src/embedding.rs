//! Embedder trait and vector utilities.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the
//! `hr-assistant` crate; this module only defines the contract the
//! in-memory semantic index depends on.

use anyhow::Result;
use async_trait::async_trait;

/// An embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Cosine of the angle between `a` and `b`.
///
/// Mismatched lengths, empty input, and zero vectors all yield `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norm = (aa * bb).sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}

/// `1 - cosine_similarity`: 0 for identical direction, up to 2 for opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    f64::from(1.0 - cosine_similarity(a, b))
}

//! BM25 keyword index over the chunk corpus.
//!
//! Wraps the [`bm25`](https://crates.io/crates/bm25) crate. The embedder is
//! fit to the whole corpus (average document length) and every chunk is
//! upserted into a [`Scorer`] keyed by its position. There is no
//! incremental update: a new corpus means a new index, which the snapshot
//! machinery in [`crate::index`] builds off to the side before swapping.
//!
//! # Scoring
//!
//! Okapi BM25 with `k1 = 1.5`, `b = 0.75` and the non-negative IDF the crate
//! uses, so a chunk scores above zero exactly when it shares at least one
//! token with the query. Callers treat "positive score" as "has term
//! overlap".

use bm25::{Embedder, EmbedderBuilder, Scorer, Tokenizer};

use crate::models::Chunk;

pub const BM25_K1: f32 = 1.5;
pub const BM25_B: f32 = 0.75;

/// Whitespace tokenization with case folding.
///
/// Leading and trailing punctuation is trimmed from each token so that
/// `"policy?"` matches `"policy"`; tokens that are pure punctuation (table
/// pipes, bullets) are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// [`tokenize`] as a `bm25` tokenizer: no stemming, no stop words.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyTokenizer;

impl Tokenizer for PolicyTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

struct Bm25 {
    embedder: Embedder<u32, PolicyTokenizer>,
    scorer: Scorer<usize>,
}

/// A BM25 ranking structure over a fixed corpus.
#[derive(Default)]
pub struct LexicalIndex {
    inner: Option<Bm25>,
    len: usize,
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex").field("len", &self.len).finish()
    }
}

impl LexicalIndex {
    /// Build an index over raw texts; positions follow input order.
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Self {
        if texts.is_empty() {
            return Self::default();
        }
        let corpus: Vec<&str> = texts.iter().map(|t| t.as_ref()).collect();
        let embedder = EmbedderBuilder::<u32, PolicyTokenizer>::with_tokenizer_and_fit_to_corpus(
            PolicyTokenizer,
            &corpus,
        )
        .k1(BM25_K1)
        .b(BM25_B)
        .build();

        let mut scorer = Scorer::<usize>::new();
        for (pos, text) in corpus.iter().enumerate() {
            scorer.upsert(&pos, embedder.embed(text));
        }

        Self {
            inner: Some(Bm25 { embedder, scorer }),
            len: corpus.len(),
        }
    }

    /// Build an index over chunk contents.
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        Self::build(&texts)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Score every indexed text against a query; zero where nothing overlaps.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let mut scores = vec![0.0; self.len];
        let Some(bm25) = &self.inner else {
            return scores;
        };
        let query = bm25.embedder.embed(query);
        for hit in bm25.scorer.matches(&query) {
            if let Some(slot) = scores.get_mut(hit.id) {
                *slot = f64::from(hit.score);
            }
        }
        scores
    }

    /// Top `n` positions by descending score, positive scores only.
    ///
    /// Ties are broken by ascending position so results are deterministic.
    pub fn top_n(&self, query: &str, n: usize) -> Vec<(usize, f64)> {
        if n == 0 || tokenize(query).is_empty() {
            return Vec::new();
        }
        let mut ranked: Vec<(usize, f64)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "Employees get 12 days of casual leave per year.",
            "The work from home policy allows two remote days per week.",
            "Sick leave requires a medical certificate after three days.",
            "Office timings are 9:30 to 18:30 on weekdays.",
        ]
    }

    #[test]
    fn test_tokenize_case_folds_and_trims_punctuation() {
        assert_eq!(
            tokenize("What is the WFH policy? | Days |"),
            vec!["what", "is", "the", "wfh", "policy", "days"]
        );
        assert!(tokenize("  | --- |  ").is_empty());
    }

    #[test]
    fn test_query_punctuation_and_case_ignored() {
        let index = LexicalIndex::build(&["The WFH policy allows two days.", "Dress code rules."]);
        let hits = index.top_n("wfh?", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_top_n_ranks_matching_chunks() {
        let index = LexicalIndex::build(&corpus());
        let hits = index.top_n("sick leave certificate", 10);
        assert_eq!(hits[0].0, 2);
        assert!(hits.iter().any(|(i, _)| *i == 0));
        assert!(hits.iter().all(|(_, s)| *s > 0.0));
    }

    #[test]
    fn test_no_overlap_returns_nothing() {
        let index = LexicalIndex::build(&corpus());
        assert!(index.top_n("pension gratuity", 10).is_empty());
    }

    #[test]
    fn test_non_positive_scores_excluded() {
        let index = LexicalIndex::build(&corpus());
        let hits = index.top_n("leave", 10);
        let positions: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions.len(), 2);
        assert!(positions.contains(&0) && positions.contains(&2));
    }

    #[test]
    fn test_term_in_every_document_still_scores() {
        let index = LexicalIndex::build(&["leave policy", "leave rules"]);
        let scores = index.scores("leave");
        assert!(scores.iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_top_n_truncates() {
        let index = LexicalIndex::build(&corpus());
        assert_eq!(index.top_n("days", 1).len(), 1);
        assert!(index.top_n("days", 0).is_empty());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let a = LexicalIndex::build(&corpus());
        let b = LexicalIndex::build(&corpus());
        assert_eq!(a.top_n("casual leave days", 10), b.top_n("casual leave days", 10));
    }

    #[test]
    fn test_empty_index() {
        let index = LexicalIndex::build::<&str>(&[]);
        assert!(index.is_empty());
        assert!(index.top_n("leave", 10).is_empty());
    }

    #[test]
    fn test_shorter_document_ranks_higher_for_same_tf() {
        let index = LexicalIndex::build(&[
            "leave policy details and a great many other unrelated words appear here",
            "leave policy",
        ]);
        let hits = index.top_n("leave", 2);
        assert_eq!(hits[0].0, 1);
    }
}

//! Query preprocessing: acronym expansion and optional paraphrasing.
//!
//! The default strategy is [`AcronymExpander`], a pure table-driven rewrite.
//! [`ParaphraseExpander`] decorates any expander with a best-effort call to
//! a [`Generator`]; every failure on that path returns the inner result
//! unchanged.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::generation::{parse_structured, Generator, ParsedResponse};

/// Built-in HR acronyms and shorthand, keyed case-insensitively.
pub const DEFAULT_ACRONYMS: &[(&str, &str)] = &[
    ("wfh", "work from home policy"),
    ("pto", "paid time off policy"),
    ("loa", "leave of absence policy"),
    ("nda", "Non Compete and Non Disclosure"),
    ("od", "on duty policy"),
    ("hrbp", "human resources business partner"),
    ("kra", "KRA Policy - Promoting Transparency"),
    ("regularization", "Time change Request/ Regularization"),
    ("regularisation", "Time change Request/ Regularization"),
    ("posh", "Policy On Prevention of Sexual Harassment"),
    ("appraisal", "PERFORMANCE APPRAISAL & PROMOTION POLICY"),
    ("promotion", "PERFORMANCE APPRAISAL & PROMOTION POLICY"),
    ("prep", "Performance Review & Enhancement Program"),
    ("grade", "GRADE STRUCTURE & FLEXIBILITY"),
    ("leave", "LEAVE POLICY"),
    ("office timings", "Office Timing and Attendance Policy"),
    ("pet", "pet policy"),
    ("sprint", "Weekly Sprint Policy"),
    ("work ethics", "WORK PLACE ETHICS"),
];

/// Case-insensitive whole-word replacement table.
///
/// Keys are matched longest first at each word start, in a single pass over
/// the input; replacement text is emitted as-is and never re-scanned.
/// Text that matches no key keeps its original case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcronymMap {
    entries: Vec<(String, String)>,
}

impl AcronymMap {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut by_key: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in pairs {
            let key = k.as_ref().trim().to_lowercase();
            if !key.is_empty() {
                by_key.insert(key, v.into());
            }
        }
        let mut entries: Vec<(String, String)> = by_key.into_iter().collect();
        entries.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite every whole-word occurrence of a key with its expansion.
    pub fn expand(&self, question: &str) -> String {
        if self.entries.is_empty() {
            return question.to_string();
        }
        let mut out = String::with_capacity(question.len() * 2);
        let mut pos = 0;
        let mut prev: Option<char> = None;

        while pos < question.len() {
            let rest = &question[pos..];
            let at_word_start = !prev.is_some_and(|c| c.is_alphanumeric());
            if at_word_start {
                let hit = self
                    .entries
                    .iter()
                    .find_map(|(key, value)| match_word(rest, key).map(|len| (len, value)));
                if let Some((len, value)) = hit {
                    out.push_str(value);
                    prev = rest[..len].chars().next_back();
                    pos += len;
                    continue;
                }
            }
            let Some(c) = rest.chars().next() else {
                break;
            };
            out.push(c);
            prev = Some(c);
            pos += c.len_utf8();
        }
        out
    }
}

/// Byte length of `key` at the start of `haystack`, if it matches
/// case-insensitively and ends on a word boundary.
fn match_word(haystack: &str, key: &str) -> Option<usize> {
    let mut hay = haystack.char_indices();
    for kc in key.chars() {
        let (_, hc) = hay.next()?;
        if !hc.to_lowercase().eq(kc.to_lowercase()) {
            return None;
        }
    }
    let end = hay.next().map(|(i, _)| i).unwrap_or(haystack.len());
    if haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric()) {
        return None;
    }
    Some(end)
}

/// A question before and after preprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedQuestion {
    pub original: String,
    /// The text handed to both indices.
    pub expanded: String,
}

impl ExpandedQuestion {
    pub fn unchanged(question: &str) -> Self {
        Self {
            original: question.to_string(),
            expanded: question.to_string(),
        }
    }
}

/// A recall-improving rewrite of the user's question. Never fails.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, question: &str) -> ExpandedQuestion;
}

/// Deterministic acronym expansion.
#[derive(Debug, Clone)]
pub struct AcronymExpander {
    map: AcronymMap,
}

impl AcronymExpander {
    pub fn new(map: AcronymMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &AcronymMap {
        &self.map
    }
}

impl Default for AcronymExpander {
    fn default() -> Self {
        Self::new(AcronymMap::new(DEFAULT_ACRONYMS.iter().copied()))
    }
}

#[async_trait]
impl QueryExpander for AcronymExpander {
    async fn expand(&self, question: &str) -> ExpandedQuestion {
        ExpandedQuestion {
            original: question.to_string(),
            expanded: self.map.expand(question),
        }
    }
}

/// Appends model-suggested phrasings to the inner expansion.
pub struct ParaphraseExpander<E, G> {
    inner: E,
    generator: G,
    max_phrasings: usize,
}

impl<E, G> ParaphraseExpander<E, G> {
    pub fn new(inner: E, generator: G) -> Self {
        Self {
            inner,
            generator,
            max_phrasings: 5,
        }
    }

    pub fn with_max_phrasings(mut self, max: usize) -> Self {
        self.max_phrasings = max;
        self
    }
}

fn paraphrase_prompt(question: &str, max: usize) -> String {
    format!(
        "Provide up to {max} alternative phrasings and related HR terms for the question below. \
         Keep the original key words in every phrasing.\n\
         Respond with JSON only, in the form {{\"phrasings\": [\"...\"]}}.\n\n\
         Question: {question}"
    )
}

fn phrasings_from(value: &Value, max: usize) -> Vec<String> {
    value
        .get("phrasings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .take(max)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl<E, G> QueryExpander for ParaphraseExpander<E, G>
where
    E: QueryExpander,
    G: Generator,
{
    async fn expand(&self, question: &str) -> ExpandedQuestion {
        let base = self.inner.expand(question).await;
        let prompt = paraphrase_prompt(&base.expanded, self.max_phrasings);

        let raw = match self.generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "query paraphrasing failed, using unexpanded question");
                return base;
            }
        };
        let phrasings = match parse_structured(&raw) {
            ParsedResponse::Parsed(v) => phrasings_from(&v, self.max_phrasings),
            ParsedResponse::Malformed(_) => Vec::new(),
        };
        if phrasings.is_empty() {
            warn!("query paraphrasing returned nothing usable, using unexpanded question");
            return base;
        }

        debug!(count = phrasings.len(), "query paraphrased");
        ExpandedQuestion {
            expanded: format!("{} {}", base.expanded, phrasings.join(" ")),
            original: base.original,
        }
    }
}

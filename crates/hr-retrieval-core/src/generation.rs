//! Generation collaborator contract and tolerant structured-output parsing.
//!
//! Models asked for JSON routinely wrap it in Markdown fences, prefix it
//! with prose, or leave trailing commas. [`parse_structured`] absorbs all of
//! that and returns a tagged result instead of an error; business logic
//! only ever sees [`ParsedResponse::Parsed`] or the raw text.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

/// Incremental response text, in arrival order.
pub type TextStream = BoxStream<'static, Result<String>>;

/// A text-generation service (the answer composer's model).
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send one prompt and return the complete response text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Send one prompt and return the response as it is produced.
    ///
    /// The default yields the complete [`generate`](Self::generate) output
    /// as a single item.
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        (**self).stream(prompt).await
    }
}

/// Result of parsing a response that was expected to be JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Parsed(Value),
    Malformed(String),
}

impl ParsedResponse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParsedResponse::Parsed(_))
    }

    /// The parsed value, or an empty JSON object when malformed.
    pub fn into_value_or_default(self) -> Value {
        match self {
            ParsedResponse::Parsed(v) => v,
            ParsedResponse::Malformed(_) => Value::Object(Default::default()),
        }
    }
}

/// Parse model output that should contain a JSON value.
///
/// Attempts, in order: the fence-stripped text, the outermost `{ … }`
/// substring, and that substring with trailing commas removed.
pub fn parse_structured(raw: &str) -> ParsedResponse {
    let text = strip_code_fence(raw);
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return ParsedResponse::Parsed(v);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let candidate = &text[start..=end];
            if let Ok(v) = serde_json::from_str::<Value>(candidate) {
                return ParsedResponse::Parsed(v);
            }
            if let Ok(v) = serde_json::from_str::<Value>(&strip_trailing_commas(candidate)) {
                return ParsedResponse::Parsed(v);
            }
        }
    }

    ParsedResponse::Malformed(raw.to_string())
}

fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (`json`, `JSON`, ...) up to the first newline.
        text = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
        if let Some(inner) = text.trim_end().strip_suffix("```") {
            text = inner;
        }
    }
    text.trim()
}

/// Remove commas that directly precede `}` or `]`, outside string literals.
fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

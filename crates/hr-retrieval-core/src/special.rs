//! Canned answers that short-circuit retrieval.
//!
//! Greetings, "who are you" style questions, and holiday-calendar lookups
//! are answered from static text before any index is touched.

use serde::{Deserialize, Serialize};

use crate::lexical::tokenize;

/// Exact-match greetings (after lower-casing and trimming `?!.` and spaces).
pub const GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

/// Identity phrases, matched as whole-word token sequences.
///
/// A question is an identity question only when it is made up entirely of
/// these phrases and [`IDENTITY_FILLER`] words, so "what do you do if you
/// are sick" still goes to retrieval.
pub const IDENTITY_PHRASES: &[&str] = &[
    "who are you",
    "who are u",
    "who r u",
    "who r yu",
    "who u",
    "who dis",
    "who's this",
    "whoz u",
    "whu r u",
    "whi r u",
    "hoo r u",
    "who you be",
    "who tf r u",
    "u bot",
    "what are you",
    "what are u",
    "wat r u",
    "what is your name",
    "what is your full name",
    "whats ur name",
    "whts ur name",
    "wht is ur name",
    "wat is your name",
    "wat iz ur name",
    "wots ur name",
    "whut ur name",
    "ur name",
    "can you tell me your name",
    "what should i call you",
    "how do i address you",
    "what do people call you",
    "who built you",
    "who built u",
    "whu built u",
    "who created you",
    "who made you",
    "who made u",
    "who made this bot",
    "who's your maker",
    "who designed you",
    "who programmed you",
    "who dun made u",
    "hoo maid u",
    "how were you created",
    "what can you do",
    "wat cn u do",
    "what do you do",
    "what u do",
    "whut do u do",
    "whachu do",
    "can you tell me what you do",
    "what are you capable of",
    "what skills do you have",
    "what services do you provide",
    "what is your role",
    "wats ur function",
    "whats ur function",
    "whats ur deal",
    "tell me about yourself",
    "tell me about you",
    "describe yourself",
    "explain yourself",
    "can you introduce yourself",
    "could you tell me what you are",
    "give me some details about you",
    "tell me your background",
];

/// Words allowed around identity phrases, as in "hey, who are you exactly?".
pub const IDENTITY_FILLER: &[&str] = &[
    "hi", "hello", "hey", "so", "and", "then", "ok", "okay", "please", "pls", "exactly",
    "actually", "again", "there", "bot", "buddy", "btw",
];

/// Who the assistant says it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotProfile {
    pub name: String,
    pub creator: String,
    pub responsibility: String,
    pub capabilities: String,
}

impl Default for BotProfile {
    fn default() -> Self {
        Self {
            name: "PeopleBot".to_string(),
            creator: "PeopleLogic".to_string(),
            responsibility: "Help recruiters in HR policies, benefits & with any other questions!"
                .to_string(),
            capabilities: "Help recruiters in HR policies, benefits & with any other questions"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialQuery {
    Greeting,
    Identity,
    Holiday,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CannedAnswer {
    pub kind: SpecialQuery,
    pub text: String,
}

/// Routes questions to canned answers.
#[derive(Debug, Clone)]
pub struct SpecialQueryRouter {
    profile: BotProfile,
    holiday_calendar: Option<String>,
    identity: Vec<Vec<String>>,
    name_tokens: Vec<String>,
}

impl Default for SpecialQueryRouter {
    fn default() -> Self {
        Self::new(BotProfile::default())
    }
}

impl SpecialQueryRouter {
    pub fn new(profile: BotProfile) -> Self {
        let mut identity: Vec<Vec<String>> = IDENTITY_PHRASES
            .iter()
            .map(|p| tokenize(p))
            .filter(|p| !p.is_empty())
            .collect();
        // Longest phrase first at each position.
        identity.sort_by(|a, b| b.len().cmp(&a.len()));
        Self {
            name_tokens: tokenize(&profile.name),
            profile,
            holiday_calendar: None,
            identity,
        }
    }

    /// Answer holiday questions with this Markdown text.
    pub fn with_holiday_calendar(mut self, calendar: impl Into<String>) -> Self {
        let calendar = calendar.into();
        self.holiday_calendar = (!calendar.trim().is_empty()).then_some(calendar);
        self
    }

    pub fn profile(&self) -> &BotProfile {
        &self.profile
    }

    /// Return a canned answer, or `None` to continue to retrieval.
    pub fn route(&self, question: &str) -> Option<CannedAnswer> {
        let normalized = question
            .trim()
            .trim_matches(|c: char| matches!(c, '?' | '!' | '.') || c.is_whitespace())
            .to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        if GREETINGS.contains(&normalized.as_str()) {
            return Some(CannedAnswer {
                kind: SpecialQuery::Greeting,
                text: format!(
                    "Hello! I'm {}, your HR assistant. How can I help you today?",
                    self.profile.name
                ),
            });
        }

        let tokens = tokenize(&normalized);
        if self.is_identity_question(&tokens) {
            return Some(CannedAnswer {
                kind: SpecialQuery::Identity,
                text: self.identity_answer(&tokens),
            });
        }

        if let Some(calendar) = &self.holiday_calendar {
            if tokens.iter().any(|t| t == "holiday" || t == "holidays") {
                return Some(CannedAnswer {
                    kind: SpecialQuery::Holiday,
                    text: calendar.clone(),
                });
            }
        }

        None
    }

    /// True when `tokens` is covered by identity phrases and filler words,
    /// with at least one phrase.
    fn is_identity_question(&self, tokens: &[String]) -> bool {
        let mut i = 0;
        let mut matched = false;
        while i < tokens.len() {
            if let Some(phrase) = self.identity.iter().find(|p| tokens[i..].starts_with(p)) {
                i += phrase.len();
                matched = true;
            } else if IDENTITY_FILLER.contains(&tokens[i].as_str())
                || self.name_tokens.contains(&tokens[i])
            {
                i += 1;
            } else {
                return false;
            }
        }
        matched
    }

    fn identity_answer(&self, tokens: &[String]) -> String {
        let p = &self.profile;
        let has = |phrase: &str| contains_sequence(tokens, &tokenize(phrase));
        if has("who") || has("what is your name") {
            format!(
                "I'm {}, an AI assistant built by {}. {}",
                p.name, p.creator, p.responsibility
            )
        } else if has("created") || has("built") {
            format!("I was created by {} to {}", p.creator, p.responsibility)
        } else if has("can you do") || has("do you do") {
            format!("I can {}", p.capabilities)
        } else {
            format!(
                "I'm {}, an AI assistant created by {}. {}",
                p.name, p.creator, p.capabilities
            )
        }
    }
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

//! Question answering over the policy corpus.
//!
//! [`Assistant`] ties the retrieval engine to its collaborators. One
//! question flows through:
//!
//! 1. special-query routing (greeting, identity, holiday calendar)
//! 2. acronym expansion, plus model paraphrasing when `query.llm_expansion`
//! 3. hybrid retrieval (restricted), or none at all in online mode
//! 4. prompt composition
//! 5. generation, complete or streamed
//!
//! Restricted questions with no relevant context get a fixed reply without
//! a generator call. Generation starts only after the context bundle is
//! complete.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use hr_retrieval_core::chunk::ChunkingParams;
use hr_retrieval_core::embedding::Embedder;
use hr_retrieval_core::generation::{Generator, TextStream};
use hr_retrieval_core::index::{BuildOptions, IndexHandle, RebuildReport};
use hr_retrieval_core::ingest::DocumentSource;
use hr_retrieval_core::query::{AcronymExpander, ExpandedQuestion, ParaphraseExpander, QueryExpander};
use hr_retrieval_core::search::{retrieve, ContextBundle, Retrieval, RetrievalParams, RetrieveMode};
use hr_retrieval_core::special::{SpecialQuery, SpecialQueryRouter};
use hr_retrieval_core::store::memory::InMemorySemanticIndex;
use hr_retrieval_core::store::SemanticIndex;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::ChatClient;
use crate::prompt::{no_context_reply, open_prompt, restricted_prompt};
use crate::source_fs::FolderSource;

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Greeting,
    Identity,
    Holiday,
    /// Restricted mode found nothing; fixed reply.
    NoContext,
    /// Generated from retrieved policy context.
    Grounded,
    /// Generated from the model's own knowledge (online mode).
    Open,
}

impl From<SpecialQuery> for AnswerKind {
    fn from(kind: SpecialQuery) -> Self {
        match kind {
            SpecialQuery::Greeting => AnswerKind::Greeting,
            SpecialQuery::Identity => AnswerKind::Identity,
            SpecialQuery::Holiday => AnswerKind::Holiday,
        }
    }
}

/// A complete answer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub kind: AnswerKind,
    pub text: String,
    pub context: Option<ContextBundle>,
}

/// An answer whose text is still arriving.
pub struct StreamingAnswer {
    pub kind: AnswerKind,
    pub context: Option<ContextBundle>,
    pub text: TextStream,
}

/// Debug view of retrieval for one question.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub question: String,
    pub expanded_question: String,
    pub generation: u64,
    pub no_context_found: bool,
    pub context: Option<ContextBundle>,
    pub rendered: Option<String>,
}

enum Plan {
    Reply(AnswerKind, String),
    Generate {
        kind: AnswerKind,
        prompt: String,
        context: Option<ContextBundle>,
    },
}

pub struct Assistant {
    index: IndexHandle,
    source: Arc<dyn DocumentSource>,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Arc<dyn Generator>,
    router: SpecialQueryRouter,
    expander: Arc<dyn QueryExpander>,
    chunking: ChunkingParams,
    retrieval: RetrievalParams,
    build_options: BuildOptions,
}

impl Assistant {
    /// Build the assistant with the configured folder source, embedding
    /// provider and chat client. The index starts empty; call
    /// [`rebuild`](Self::rebuild).
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = Arc::new(FolderSource::new(&config.documents)?);
        let embedder = create_embedder(&config.embedding)?;
        let generator = Arc::new(ChatClient::new(&config.generation)?);
        Self::with_components(config, source, embedder, generator)
    }

    /// Build the assistant around caller-supplied collaborators.
    pub fn with_components(
        config: &Config,
        source: Arc<dyn DocumentSource>,
        embedder: Option<Arc<dyn Embedder>>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let mut router = SpecialQueryRouter::new(config.assistant.profile());
        if let Some(path) = &config.assistant.holiday_calendar {
            match std::fs::read_to_string(path) {
                Ok(calendar) => router = router.with_holiday_calendar(calendar),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "holiday calendar unreadable, holiday questions go to retrieval"
                ),
            }
        }

        let acronyms = AcronymExpander::new(config.query.acronym_map());
        let expander: Arc<dyn QueryExpander> = if config.query.llm_expansion {
            Arc::new(ParaphraseExpander::new(acronyms, Arc::clone(&generator)))
        } else {
            Arc::new(acronyms)
        };

        Ok(Self {
            index: IndexHandle::new(),
            source,
            embedder,
            generator,
            router,
            expander,
            chunking: config.chunking.params(),
            retrieval: config.retrieval.params(),
            build_options: config.retrieval.build_options(),
        })
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn semantic_enabled(&self) -> bool {
        self.embedder.is_some()
    }

    /// Rebuild both indices from the document source. On failure the
    /// previous snapshot keeps serving.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let semantic = self.embedder.as_ref().map(|embedder| {
            Arc::new(InMemorySemanticIndex::new(Arc::clone(embedder))) as Arc<dyn SemanticIndex>
        });
        let report = self
            .index
            .rebuild(self.source.as_ref(), semantic, &self.build_options, &self.chunking)
            .await
            .context("index rebuild failed")?;
        Ok(report)
    }

    /// Expand and retrieve without generating.
    pub async fn search(&self, question: &str) -> Result<SearchReport> {
        let question = non_empty(question)?;
        let expanded = self.expander.expand(question).await;
        let snapshot = self.index.current();
        let retrieval = retrieve(&snapshot, &expanded.expanded, RetrieveMode::Restricted, &self.retrieval).await?;

        let context = match retrieval {
            Retrieval::Context(bundle) => Some(bundle),
            Retrieval::NoContextFound | Retrieval::Skipped => None,
        };
        Ok(SearchReport {
            question: expanded.original,
            expanded_question: expanded.expanded,
            generation: snapshot.generation(),
            no_context_found: context.is_none(),
            rendered: context.as_ref().map(ContextBundle::render),
            context,
        })
    }

    /// Answer a question, waiting for the complete text.
    pub async fn ask(&self, question: &str, online: bool) -> Result<Answer> {
        match self.plan(question, online).await? {
            Plan::Reply(kind, text) => Ok(Answer {
                kind,
                text,
                context: None,
            }),
            Plan::Generate {
                kind,
                prompt,
                context,
            } => {
                let text = self
                    .generator
                    .generate(&prompt)
                    .await
                    .context("answer generation failed")?;
                Ok(Answer {
                    kind,
                    text,
                    context,
                })
            }
        }
    }

    /// Answer a question, streaming the text as it is generated.
    pub async fn ask_streaming(&self, question: &str, online: bool) -> Result<StreamingAnswer> {
        match self.plan(question, online).await? {
            Plan::Reply(kind, text) => Ok(StreamingAnswer {
                kind,
                context: None,
                text: stream::once(async move { Ok(text) }).boxed(),
            }),
            Plan::Generate {
                kind,
                prompt,
                context,
            } => {
                let text = self
                    .generator
                    .stream(&prompt)
                    .await
                    .context("answer generation failed")?;
                Ok(StreamingAnswer {
                    kind,
                    context,
                    text,
                })
            }
        }
    }

    async fn plan(&self, question: &str, online: bool) -> Result<Plan> {
        let question = non_empty(question)?;

        if let Some(canned) = self.router.route(question) {
            info!(kind = ?canned.kind, "answered from canned response");
            return Ok(Plan::Reply(canned.kind.into(), canned.text));
        }

        let expanded: ExpandedQuestion = self.expander.expand(question).await;
        let mode = if online {
            RetrieveMode::Open
        } else {
            RetrieveMode::Restricted
        };
        let snapshot = self.index.current();
        let plan = match retrieve(&snapshot, &expanded.expanded, mode, &self.retrieval).await? {
            Retrieval::Skipped => Plan::Generate {
                kind: AnswerKind::Open,
                prompt: open_prompt(&expanded.original),
                context: None,
            },
            Retrieval::NoContextFound => {
                Plan::Reply(AnswerKind::NoContext, no_context_reply(&expanded.original))
            }
            Retrieval::Context(bundle) => Plan::Generate {
                kind: AnswerKind::Grounded,
                prompt: restricted_prompt(&expanded.original, &bundle),
                context: Some(bundle),
            },
        };
        Ok(plan)
    }
}

fn non_empty(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question must not be empty");
    }
    Ok(question)
}

//! # HR Retrieval Core
//!
//! Runtime-free retrieval logic for the HR assistant: data models, chunking,
//! table rendering, the BM25 lexical index, the semantic-index contract,
//! hybrid retrieval, and query preprocessing.
//!
//! This crate contains no tokio, network, or filesystem dependencies. The
//! application crate supplies document sources, embedding providers, and
//! generation clients through the traits defined here.
//!
//! ## Data Flow
//!
//! ```text
//!  DocumentSource ──▶ ingest ──▶ chunk / table ──▶ IndexSnapshot
//!                                                  ├── LexicalIndex (BM25)
//!                                                  └── SemanticIndex (vectors)
//!
//!  question ──▶ special ──▶ query ──▶ search::retrieve ──▶ ContextBundle
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Chunks, provenance, extracted pages and tables |
//! | [`chunk`] | Overlapping, boundary-preferring text splitter |
//! | [`table`] | Table normalization, Markdown rendering, topic enrichment |
//! | [`lexical`] | In-memory BM25 index |
//! | [`embedding`] | Embedder trait and vector math |
//! | [`store`] | Semantic index contract and in-memory backend |
//! | [`ingest`] | Document source trait and corpus ingestion |
//! | [`index`] | Immutable index snapshots with atomic swap |
//! | [`search`] | Hybrid retriever and context bundle |
//! | [`query`] | Acronym expansion and paraphrase expansion |
//! | [`special`] | Canned answers for greetings, identity, holidays |
//! | [`generation`] | Generator trait and tolerant JSON parsing |
//! | [`error`] | Typed rebuild and retrieval errors |

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod lexical;
pub mod models;
pub mod query;
pub mod search;
pub mod special;
pub mod store;
pub mod table;

//! # HR Assistant
//!
//! Answers employee and recruiter questions from a folder of company policy
//! documents (PDF, DOCX, Markdown, text). Retrieval is hybrid: a BM25
//! keyword index and an optional embedding-backed semantic index, merged,
//! deduplicated and ordered tables-first by [`hr_retrieval_core`]. Answers
//! come from any OpenAI-compatible chat endpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Policy folder│──▶│ Extract+Chunk│──▶│ IndexSnapshot│
//! │ pdf/docx/md  │   │ tables→md    │   │ BM25 + vec   │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                    ┌──────────┐        ┌──────────┐
//!                    │   CLI    │        │   HTTP   │
//!                    │ (hrbot)  │        │  (axum)  │
//!                    └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hrbot rebuild                                   # index the policy folder
//! hrbot search "casual leave"                     # inspect retrieved context
//! hrbot ask "How many casual leaves do I get?"
//! hrbot ask "What is an OKR?" --online
//! hrbot serve                                     # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`source_fs`] | Policy folder document source |
//! | [`extract`] | PDF, DOCX, Markdown and text extraction |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, local) |
//! | [`generation`] | OpenAI-compatible chat client with streaming |
//! | [`prompt`] | Answer prompt templates |
//! | [`assistant`] | End-to-end question answering |
//! | [`server`] | HTTP API |

pub mod assistant;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
mod http;
mod pdf_layout;
pub mod prompt;
pub mod server;
pub mod source_fs;

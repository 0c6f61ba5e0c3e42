//! # Corpus Chat
//!
//! Ingest an archive of loosely-encoded plain-text documents into a clean
//! UTF-8 corpus, then hold a turn-based conversation with an LLM seeded from it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌─────────┐   ┌───────────┐
//! │ Archive │──▶│ Walker │──▶│ Decoder │──▶│ Aggregator│──▶ CorpusReport
//! │  (zip)  │   │        │   │fallback │   │           │
//! └─────────┘   └────────┘   └─────────┘   └───────────┘
//!
//! user text ──▶ Conversation ──▶ CompletionProvider ──▶ assistant reply
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cchat ingest ./works.zip              # decode and report
//! cchat ingest ./works.zip --cleanse    # also run the normalization pass
//! cchat chat --archive ./works.zip      # interactive session
//! cchat serve                           # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`archive`] | Archive loading and scoped extraction |
//! | [`walker`] | Candidate file discovery |
//! | [`decode`] | Encoding-fallback decoding |
//! | [`corpus`] | Corpus aggregation and reports |
//! | [`cache`] | Content-addressed report cache |
//! | [`normalize`] | Normalization pass |
//! | [`ingest`] | Pipeline orchestration |
//! | [`completion`] | Completion provider abstraction |
//! | [`secrets`] | Credential and seed resolution |
//! | [`session`] | Conversation state machine |
//! | [`sessions`] | Session-keyed conversation registry |
//! | [`server`] | HTTP serving layer |

pub mod archive;
pub mod cache;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod secrets;
pub mod server;
pub mod session;
pub mod sessions;
pub mod walker;

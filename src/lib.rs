//! # Ambient Context
//!
//! Context cards for chat drafts. While someone writes (or reads) a message,
//! the service retrieves the most relevant project notes, people and issues
//! from a knowledge corpus and condenses them into a short card: a topic, a
//! summary, open questions and the sources behind them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Dataset    │──▶│ Corpus index │──▶│  Retrieval   │
//! │ items/users  │   │ chunk + IDF  │   │ ACL, scoring │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                                       ┌──────▼───────┐   ┌────────────┐
//!                                       │ContextEngine │──▶│ Synthesizer│
//!                                       │cache, coalesce│  │ (optional) │
//!                                       └──────┬───────┘   └────────────┘
//!                              ┌───────────────┤
//!                              ▼               ▼
//!                         ┌─────────┐    ┌──────────┐
//!                         │   CLI   │    │   HTTP   │
//!                         └─────────┘    └──────────┘
//! ```
//!
//! Indexing, search and retrieval live in the portable
//! `ambient-context-core` crate; this crate adds serving state, generation,
//! configuration and the process surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! ambient index                                   # build and print index stats
//! ambient search "billing migration rollback"     # ranked retrieval hits
//! ambient suggest "is the rollback plan ready?" --recipient user-jordan
//! ambient serve                                   # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`dataset`] | Corpus, user and channel loading |
//! | [`engine`] | Cache, coalescing, rate limiting, load shedding |
//! | [`generation`] | Synthesizer abstraction and Anthropic adapter |
//! | [`heuristics`] | Cited-issue extraction and open-question derivation |
//! | [`server`] | HTTP API |
//! | [`types`] | Request and response shapes |

pub mod cache;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod heuristics;
pub mod index_cmd;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod suggest;
pub mod types;

//! # Ambient Context Core
//!
//! Portable retrieval logic for Ambient Context: knowledge models, the
//! tokenizer, paragraph/sentence chunking, the in-memory inverted index,
//! the query engine, and the retrieval façade used by the orchestrator.
//!
//! This crate contains no tokio, networking, or filesystem I/O. Everything
//! here is synchronous and deterministic for a fixed corpus.

pub mod access;
pub mod chunk;
pub mod corpus;
pub mod index;
pub mod models;
pub mod retrieval;
pub mod search;
pub mod tokenize;

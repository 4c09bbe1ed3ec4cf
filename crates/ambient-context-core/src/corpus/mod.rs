//! Corpus abstraction.
//!
//! The [`Corpus`] trait is the boundary to the knowledge-corpus loader: a
//! read-only source of [`KnowledgeItem`]s that the index is built from.
//! Implementations must be `Send + Sync` so one corpus can back an index
//! shared across request handlers.

pub mod memory;

use std::sync::Arc;

use crate::models::KnowledgeItem;

pub use memory::StaticCorpus;

/// Read-only access to the knowledge corpus.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_items`](Corpus::list_items) | All items, in a stable order |
/// | [`get_item`](Corpus::get_item) | One item by id |
pub trait Corpus: Send + Sync {
    /// All items in the corpus, in a stable order.
    fn list_items(&self) -> Vec<Arc<KnowledgeItem>>;

    /// Look up one item by id.
    fn get_item(&self, id: &str) -> Option<Arc<KnowledgeItem>>;
}

//! Core data models shared by the indexer, query engine, and orchestrator.
//!
//! [`KnowledgeItem`] is the immutable corpus record. Everything else here is
//! derived from it: [`IndexedChunk`]s at build time, [`ChunkHit`]s and
//! [`DocHit`]s per query.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The fixed set of document kinds in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Project,
    User,
    Note,
}

impl ItemKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Project => "project",
            ItemKind::User => "user",
            ItemKind::Note => "note",
        }
    }
}

/// System a knowledge item was originally captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceSystem {
    Slack,
    Confluence,
    Jira,
    Github,
    GoogleDrive,
    InternalWiki,
}

/// Access-control list attached to an item.
///
/// An absent or empty principal list means the item is public.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    #[serde(default)]
    pub principals: Vec<String>,
}

/// A single record in the knowledge corpus. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Entity strings mentioned by the item; `None` means no entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    /// Ids of other items this one references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `None` means public.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<SourceSystem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Freshness timestamp, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at_ms: Option<i64>,
}

impl KnowledgeItem {
    /// Entities, defaulting to an empty slice.
    pub fn entities(&self) -> &[String] {
        self.entities.as_deref().unwrap_or(&[])
    }

    /// Linked item ids, defaulting to an empty slice.
    pub fn links(&self) -> &[String] {
        self.links.as_deref().unwrap_or(&[])
    }

    /// ACL principals, or `None` when the item is public.
    pub fn acl_principals(&self) -> Option<&[String]> {
        match &self.acl {
            Some(acl) if !acl.principals.is_empty() => Some(&acl.principals),
            _ => None,
        }
    }

    /// Whether this item is, or links to, the given id.
    pub fn relates_to(&self, id: &str) -> bool {
        self.id == id || self.links().iter().any(|l| l == id)
    }
}

/// One indexed excerpt of a [`KnowledgeItem`]. Never mutated after build.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// `"{item_id}#{n}"`.
    pub chunk_id: String,
    /// Position of the parent item in the index's item table.
    pub item_idx: usize,
    pub doc_id: String,
    /// Title/summary/tags header followed by the chunk body.
    pub text: String,
    pub tokens: Vec<String>,
    pub token_counts: HashMap<String, u32>,
    /// Lowercased entities inherited from the parent item.
    pub entities: Vec<String>,
    /// Inherited from the parent item; `None` is public.
    pub acl: Option<Vec<String>>,
}

/// A scored chunk for one query.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk_idx: usize,
    pub chunk_id: String,
    pub doc_id: String,
    pub score: f64,
}

/// Explainability trail: the chunks that contributed to a document score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitTrail {
    pub top_chunk_ids: Vec<String>,
    pub top_chunk_scores: Vec<f64>,
}

/// A document-level search result.
#[derive(Debug, Clone)]
pub struct DocHit {
    pub item: Arc<KnowledgeItem>,
    pub score: f64,
    pub why: HitTrail,
}

/// A retrieval-façade result, as consumed by the orchestrator.
///
/// `why` is `None` when the item was injected rather than scored (for
/// example, a source cited explicitly in the query text).
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: Arc<KnowledgeItem>,
    pub score: f64,
    pub why: Option<HitTrail>,
}

impl From<DocHit> for ScoredItem {
    fn from(hit: DocHit) -> Self {
        Self {
            item: hit.item,
            score: hit.score,
            why: Some(hit.why),
        }
    }
}

//! In-memory inverted index over the knowledge corpus.
//!
//! [`CorpusIndex::build`] chunks every item, tokenizes each chunk, and
//! builds the lookup structures the query engine reads:
//!
//! | Structure | Key | Value |
//! |-----------|-----|-------|
//! | postings | token | chunk indices containing it |
//! | prefixes | first `fuzzy_prefix_len` chars | vocabulary tokens with that prefix |
//! | entities | lowercased entity | chunk indices of items naming it |
//! | links | item id | chunk indices of items linking to it |
//! | idf | token | `ln(1 + N / (1 + df)) + 1` over N chunks |
//!
//! Every chunk's indexed text is the item's title, summary, and tags
//! followed by the chunk body, so each chunk is independently
//! title/summary-aware.
//!
//! [`IndexHandle`] owns the lazily built index for a corpus and guarantees
//! a single build under concurrent first access.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};

use crate::chunk::{chunk_body, DEFAULT_MAX_CHUNK_CHARS};
use crate::corpus::Corpus;
use crate::models::{IndexedChunk, KnowledgeItem};
use crate::tokenize::{count_tokens, tokenize};

/// Build-time options.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Character budget per chunk body.
    pub max_chunk_chars: usize,
    /// Prefix length used for partial-match candidate expansion.
    pub fuzzy_prefix_len: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            fuzzy_prefix_len: 3,
        }
    }
}

/// Summary of a built index.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IndexStats {
    pub items: usize,
    pub skipped_items: usize,
    pub chunks: usize,
    pub vocabulary: usize,
    pub entities: usize,
    /// SHA-256 over chunk ids and texts.
    pub digest: String,
}

/// Immutable index structures for one corpus snapshot.
#[derive(Debug)]
pub struct CorpusIndex {
    items: Vec<Arc<KnowledgeItem>>,
    by_id: HashMap<String, usize>,
    by_url: HashMap<String, usize>,
    chunks: Vec<IndexedChunk>,
    item_chunks: Vec<Vec<usize>>,
    postings: HashMap<String, Vec<usize>>,
    prefixes: HashMap<String, Vec<String>>,
    entities: HashMap<String, Vec<usize>>,
    links: HashMap<String, Vec<usize>>,
    idf: HashMap<String, f64>,
    fuzzy_prefix_len: usize,
    skipped_items: usize,
    digest: String,
}

impl CorpusIndex {
    /// Build all index structures. Never fails; items without an id or
    /// title are skipped and counted in [`IndexStats::skipped_items`].
    pub fn build(items: &[Arc<KnowledgeItem>], options: &IndexOptions) -> Self {
        let mut index = Self {
            items: Vec::with_capacity(items.len()),
            by_id: HashMap::new(),
            by_url: HashMap::new(),
            chunks: Vec::new(),
            item_chunks: Vec::with_capacity(items.len()),
            postings: HashMap::new(),
            prefixes: HashMap::new(),
            entities: HashMap::new(),
            links: HashMap::new(),
            idf: HashMap::new(),
            fuzzy_prefix_len: options.fuzzy_prefix_len.max(1),
            skipped_items: 0,
            digest: String::new(),
        };

        for item in items {
            if item.id.trim().is_empty()
                || item.title.trim().is_empty()
                || index.by_id.contains_key(&item.id)
            {
                index.skipped_items += 1;
                continue;
            }
            index.add_item(item.clone(), options.max_chunk_chars);
        }

        index.build_postings();
        index.build_idf();
        index.digest = index.compute_digest();
        index
    }

    fn add_item(&mut self, item: Arc<KnowledgeItem>, max_chunk_chars: usize) {
        let item_idx = self.items.len();
        self.by_id.insert(item.id.clone(), item_idx);
        if let Some(url) = item.url.as_deref().filter(|u| !u.is_empty()) {
            self.by_url.entry(url.to_string()).or_insert(item_idx);
        }

        let acl = item.acl_principals().map(<[String]>::to_vec);
        let entities: Vec<String> = item
            .entities()
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let header = format!("{}\n{}\n{}", item.title, item.summary, item.tags.join(" "));

        let mut parts = chunk_body(&item.body, max_chunk_chars);
        let blank = parts.is_empty() && item.summary.trim().is_empty();
        if parts.is_empty() && !blank {
            parts.push(item.summary.clone());
        }
        if blank {
            parts.push(String::new());
        }

        let mut chunk_ids = Vec::with_capacity(parts.len());
        for (n, part) in parts.iter().enumerate() {
            // An item with neither body nor summary is indexed as an empty chunk.
            let text = if blank {
                String::new()
            } else {
                format!("{}\n\n{}", header, part).trim().to_string()
            };
            let tokens = tokenize(&text);
            let token_counts = count_tokens(&tokens);

            chunk_ids.push(self.chunks.len());
            self.chunks.push(IndexedChunk {
                chunk_id: format!("{}#{}", item.id, n),
                item_idx,
                doc_id: item.id.clone(),
                text,
                tokens,
                token_counts,
                entities: entities.clone(),
                acl: acl.clone(),
            });
        }

        for entity in &entities {
            let posting = self.entities.entry(entity.clone()).or_default();
            for &c in &chunk_ids {
                if posting.last() != Some(&c) {
                    posting.push(c);
                }
            }
        }
        for link in item.links() {
            self.links
                .entry(link.clone())
                .or_default()
                .extend(chunk_ids.iter().copied());
        }

        self.item_chunks.push(chunk_ids);
        self.items.push(item);
    }

    fn build_postings(&mut self) {
        for (idx, chunk) in self.chunks.iter().enumerate() {
            for token in chunk.token_counts.keys() {
                self.postings.entry(token.clone()).or_default().push(idx);
            }
        }

        let prefix_len = self.fuzzy_prefix_len;
        for token in self.postings.keys() {
            if let Some(prefix) = token.get(..prefix_len) {
                self.prefixes
                    .entry(prefix.to_string())
                    .or_default()
                    .push(token.clone());
            }
        }
        for tokens in self.prefixes.values_mut() {
            tokens.sort();
        }
        for links in self.links.values_mut() {
            links.sort_unstable();
            links.dedup();
        }
    }

    fn build_idf(&mut self) {
        let n = self.chunks.len().max(1) as f64;
        self.idf = self
            .postings
            .iter()
            .map(|(token, posting)| {
                let df = posting.len() as f64;
                (token.clone(), (1.0 + n / (1.0 + df)).ln() + 1.0)
            })
            .collect();
    }

    fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for chunk in &self.chunks {
            hasher.update(chunk.chunk_id.as_bytes());
            hasher.update([0u8]);
            hasher.update(chunk.text.as_bytes());
            hasher.update([b'\n']);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    pub fn chunk(&self, idx: usize) -> &IndexedChunk {
        &self.chunks[idx]
    }

    pub fn item(&self, item_idx: usize) -> &Arc<KnowledgeItem> {
        &self.items[item_idx]
    }

    pub fn item_by_id(&self, id: &str) -> Option<&Arc<KnowledgeItem>> {
        self.by_id.get(id).map(|&i| &self.items[i])
    }

    /// Look up the item whose `url` equals `url` exactly.
    pub fn item_by_url(&self, url: &str) -> Option<&Arc<KnowledgeItem>> {
        self.by_url.get(url).map(|&i| &self.items[i])
    }

    /// Chunk indices containing `token`.
    pub fn postings(&self, token: &str) -> &[usize] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Vocabulary tokens that share `token`'s prefix and contain, or are
    /// contained in, `token`. Excludes `token` itself.
    pub fn partial_matches<'a>(&'a self, token: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let bucket = token
            .get(..self.fuzzy_prefix_len)
            .filter(|_| token.len() >= self.fuzzy_prefix_len)
            .and_then(|prefix| self.prefixes.get(prefix));
        bucket
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(move |t| *t != token && (t.contains(token) || token.contains(*t)))
    }

    /// Chunk indices of items whose entity list contains a string that
    /// occurs in `lowered_query`.
    pub fn entity_matches(&self, lowered_query: &str) -> HashSet<usize> {
        self.entities
            .iter()
            .filter(|(entity, _)| lowered_query.contains(entity.as_str()))
            .flat_map(|(_, chunks)| chunks.iter().copied())
            .collect()
    }

    /// Chunk indices belonging to `item_id` or to items that link to it.
    pub fn related_chunks(&self, item_id: &str) -> HashSet<usize> {
        let own = self
            .by_id
            .get(item_id)
            .map(|&i| self.item_chunks[i].as_slice())
            .unwrap_or(&[]);
        let linking = self.links.get(item_id).map(Vec::as_slice).unwrap_or(&[]);
        own.iter().chain(linking).copied().collect()
    }

    /// Smoothed inverse document frequency; 1.0 for unknown tokens.
    pub fn idf(&self, token: &str) -> f64 {
        self.idf.get(token).copied().unwrap_or(1.0)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            items: self.items.len(),
            skipped_items: self.skipped_items,
            chunks: self.chunks.len(),
            vocabulary: self.postings.len(),
            entities: self.entities.len(),
            digest: self.digest.clone(),
        }
    }
}

/// Lazily built, explicitly invalidated index for one corpus.
///
/// The first [`ensure_built`](IndexHandle::ensure_built) call builds the
/// index while holding the slot lock, so concurrent first callers wait for
/// that single build instead of starting their own.
pub struct IndexHandle {
    corpus: Arc<dyn Corpus>,
    options: IndexOptions,
    slot: Mutex<Option<Arc<CorpusIndex>>>,
    builds: AtomicU64,
}

impl IndexHandle {
    pub fn new(corpus: Arc<dyn Corpus>, options: IndexOptions) -> Self {
        Self {
            corpus,
            options,
            slot: Mutex::new(None),
            builds: AtomicU64::new(0),
        }
    }

    /// Return the built index, building it first if needed.
    pub fn ensure_built(&self) -> Arc<CorpusIndex> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slot.as_ref() {
            return index.clone();
        }
        let index = Arc::new(CorpusIndex::build(&self.corpus.list_items(), &self.options));
        self.builds.fetch_add(1, Ordering::Relaxed);
        *slot = Some(index.clone());
        index
    }

    /// The built index, if any, without triggering a build.
    pub fn current(&self) -> Option<Arc<CorpusIndex>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the built index; the next access rebuilds from the corpus.
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of builds performed so far.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}

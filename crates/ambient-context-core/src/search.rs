//! Query engine over a [`CorpusIndex`].
//!
//! The engine never scans the whole corpus: it scores only the chunks that
//! share some lexical signal with the query, then collapses chunk scores
//! into document scores.
//!
//! # Scoring Algorithm
//!
//! 1. Tokenize the query; no tokens means no results.
//! 2. Candidates: union of the posting lists of every query token, plus the
//!    postings of vocabulary tokens that share a query token's prefix and
//!    contain (or are contained in) it.
//! 3. Drop candidates the viewer may not see.
//! 4. Per chunk:
//!    - `lexical = Σ (1 + ln tf) × idf` over query tokens present,
//!    - `overlap = exact + partial_weight × partial`,
//!    - `score = lexical × lexical_weight + overlap × overlap_weight`,
//!    - × `entity_boost` when one of the chunk's entities occurs in the
//!      query, × `recipient_boost` when biased toward a recipient the chunk
//!      belongs or links to.
//! 5. Keep the best `top_k_chunks`; a document scores the sum of its best
//!    `chunks_per_doc` chunks.
//! 6. Sort documents by score and truncate to `top_n_docs`.
//!
//! Ties keep chunk index order, so results are reproducible for a fixed
//! corpus.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::access::Principals;
use crate::index::CorpusIndex;
use crate::models::{ChunkHit, DocHit, HitTrail, IndexedChunk};
use crate::tokenize::tokenize;

/// Scoring tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct ScoringParams {
    pub lexical_weight: f64,
    pub overlap_weight: f64,
    /// Credit for a query token that only partially matches a chunk token.
    pub partial_weight: f64,
    pub entity_boost: f64,
    pub recipient_boost: f64,
    /// Chunk hits kept before collapsing to documents.
    pub top_k_chunks: usize,
    /// Best chunks summed into a document score.
    pub chunks_per_doc: usize,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            lexical_weight: 2.0,
            overlap_weight: 1.4,
            partial_weight: 0.2,
            entity_boost: 1.15,
            recipient_boost: 1.25,
            top_k_chunks: 25,
            chunks_per_doc: 2,
        }
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub viewer: &'a Principals,
    pub recipient_id: Option<&'a str>,
    pub top_n_docs: usize,
    pub apply_recipient_bias: bool,
    pub params: &'a ScoringParams,
}

/// Ranked documents plus the chunk hits they were collapsed from.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<DocHit>,
    pub chunk_hits: Vec<ChunkHit>,
    /// Chunks scored after candidate generation and access filtering.
    pub scored_candidates: usize,
}

/// Run a search against a built index.
pub fn search(index: &CorpusIndex, req: &SearchRequest<'_>) -> SearchOutcome {
    let query_tokens = tokenize(req.query);
    if query_tokens.is_empty() {
        return SearchOutcome::default();
    }

    let mut seen = HashSet::new();
    let unique_tokens: Vec<&str> = query_tokens
        .iter()
        .map(String::as_str)
        .filter(|t| seen.insert(*t))
        .collect();

    let candidates = gather_candidates(index, &unique_tokens);

    let entity_chunks = index.entity_matches(&req.query.to_lowercase());
    let recipient_chunks = match (req.apply_recipient_bias, req.recipient_id) {
        (true, Some(id)) => index.related_chunks(id),
        _ => HashSet::new(),
    };

    let params = req.params;
    let mut scored_candidates = 0;
    let mut chunk_hits: Vec<ChunkHit> = Vec::new();

    for idx in candidates {
        let chunk = index.chunk(idx);
        if !req.viewer.can_see(chunk.acl.as_deref()) {
            continue;
        }
        scored_candidates += 1;

        let lexical = lexical_score(index, &query_tokens, chunk);
        let overlap = overlap_score(&unique_tokens, chunk, params.partial_weight);

        let mut score = lexical * params.lexical_weight + overlap * params.overlap_weight;
        if entity_chunks.contains(&idx) {
            score *= params.entity_boost;
        }
        if recipient_chunks.contains(&idx) {
            score *= params.recipient_boost;
        }

        if score > 0.0 {
            chunk_hits.push(ChunkHit {
                chunk_idx: idx,
                chunk_id: chunk.chunk_id.clone(),
                doc_id: chunk.doc_id.clone(),
                score,
            });
        }
    }

    chunk_hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    chunk_hits.truncate(params.top_k_chunks);

    let mut hits = collapse_to_documents(index, &chunk_hits, params.chunks_per_doc);
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(req.top_n_docs);

    SearchOutcome {
        hits,
        chunk_hits,
        scored_candidates,
    }
}

/// Union of exact and partial-match posting lists, in chunk order.
fn gather_candidates(index: &CorpusIndex, tokens: &[&str]) -> BTreeSet<usize> {
    let mut candidates = BTreeSet::new();
    for token in tokens {
        candidates.extend(index.postings(token).iter().copied());
        for related in index.partial_matches(token) {
            candidates.extend(index.postings(related).iter().copied());
        }
    }
    candidates
}

fn lexical_score(index: &CorpusIndex, query_tokens: &[String], chunk: &IndexedChunk) -> f64 {
    query_tokens
        .iter()
        .filter_map(|qt| {
            let tf = *chunk.token_counts.get(qt)?;
            Some((1.0 + f64::from(tf).ln()) * index.idf(qt))
        })
        .sum()
}

/// Deterministic lexical stand-in for semantic similarity: exact token
/// overlap plus fractional credit for substring/superstring matches.
fn overlap_score(unique_tokens: &[&str], chunk: &IndexedChunk, partial_weight: f64) -> f64 {
    let mut exact = 0.0;
    let mut partial = 0.0;
    for qt in unique_tokens {
        if chunk.token_counts.contains_key(*qt) {
            exact += 1.0;
        }
        let has_partial = chunk
            .token_counts
            .keys()
            .any(|ct| ct.as_str() != *qt && (ct.contains(*qt) || qt.contains(ct.as_str())));
        if has_partial {
            partial += partial_weight;
        }
    }
    exact + partial
}

fn collapse_to_documents(
    index: &CorpusIndex,
    chunk_hits: &[ChunkHit],
    chunks_per_doc: usize,
) -> Vec<DocHit> {
    struct DocAgg {
        item_idx: usize,
        trail: HitTrail,
    }

    let mut order: Vec<DocAgg> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    // chunk_hits is sorted by score, so the first chunks seen per document
    // are its best ones.
    for hit in chunk_hits {
        let pos = *positions.entry(hit.doc_id.as_str()).or_insert_with(|| {
            order.push(DocAgg {
                item_idx: index.chunk(hit.chunk_idx).item_idx,
                trail: HitTrail::default(),
            });
            order.len() - 1
        });
        let trail = &mut order[pos].trail;
        if trail.top_chunk_ids.len() < chunks_per_doc {
            trail.top_chunk_ids.push(hit.chunk_id.clone());
            trail.top_chunk_scores.push(hit.score);
        }
    }

    order
        .into_iter()
        .map(|agg| DocHit {
            item: index.item(agg.item_idx).clone(),
            score: agg.trail.top_chunk_scores.iter().sum(),
            why: agg.trail,
        })
        .collect()
}

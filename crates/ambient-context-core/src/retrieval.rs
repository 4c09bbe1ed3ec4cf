//! Retrieval façade: the only retrieval entry point the orchestrator uses.
//!
//! Wraps [`search`] with a minimum-score threshold and a result cap. The
//! threshold suppresses low-confidence cards instead of always showing
//! something.

use crate::access::Principals;
use crate::index::CorpusIndex;
use crate::models::ScoredItem;
use crate::search::{search, ScoringParams, SearchRequest};
use crate::tokenize::tokenize;

/// Per-call retrieval options.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_n: usize,
    pub min_score: f64,
    pub apply_recipient_bias: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_n: 3,
            min_score: 2.0,
            apply_recipient_bias: true,
        }
    }
}

/// Retrieves scored items for a fixed viewer.
#[derive(Debug, Clone)]
pub struct Retriever {
    viewer: Principals,
    params: ScoringParams,
}

impl Retriever {
    pub fn new(viewer: Principals, params: ScoringParams) -> Self {
        Self { viewer, params }
    }

    pub fn viewer(&self) -> &Principals {
        &self.viewer
    }

    /// Ranked items scoring at least `options.min_score`, best first.
    pub fn retrieve(
        &self,
        index: &CorpusIndex,
        text: &str,
        recipient_id: Option<&str>,
        options: &RetrievalOptions,
    ) -> Vec<ScoredItem> {
        if tokenize(text).is_empty() {
            return Vec::new();
        }

        let outcome = search(
            index,
            &SearchRequest {
                query: text,
                viewer: &self.viewer,
                recipient_id,
                top_n_docs: options.top_n,
                apply_recipient_bias: options.apply_recipient_bias,
                params: &self.params,
            },
        );

        outcome
            .hits
            .into_iter()
            .filter(|hit| hit.score >= options.min_score)
            .map(ScoredItem::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexOptions;
    use crate::models::{ItemKind, KnowledgeItem};
    use std::sync::Arc;

    fn item(id: &str, title: &str, summary: &str, body: &str) -> KnowledgeItem {
        KnowledgeItem {
            id: id.to_string(),
            kind: ItemKind::Project,
            title: title.to_string(),
            summary: summary.to_string(),
            body: body.to_string(),
            tags: vec!["billing".to_string(), "migration".to_string()],
            entities: None,
            links: None,
            url: None,
            acl: None,
            source_system: None,
            container: None,
            updated_at_ms: None,
        }
    }

    fn corpus_index() -> CorpusIndex {
        let items = vec![
            item(
                "proj-billing",
                "Billing Database Migration — Dual-Write Strategy",
                "Moving billing tables to the new cluster with dual writes.",
                "Phase one enables dual-write to both databases.\n\n\
                 Rollback plan: disable the dual-write flag and replay from the old primary.",
            ),
            item(
                "note-lunch",
                "Team lunch",
                "Friday tacos.",
                "We are ordering tacos on Friday for the team.",
            ),
            item(
                "note-schema",
                "Schema review",
                "Index changes for invoices.",
                "Review the migration scripts for the invoices table.",
            ),
        ];
        let items: Vec<_> = items.into_iter().map(Arc::new).collect();
        CorpusIndex::build(&items, &IndexOptions::default())
    }

    fn retriever() -> Retriever {
        Retriever::new(Principals::new(["group:all"]), ScoringParams::default())
    }

    #[test]
    fn test_billing_migration_rollback_top_hit() {
        let index = corpus_index();
        let results = retriever().retrieve(
            &index,
            "billing migration rollback",
            None,
            &RetrievalOptions::default(),
        );
        assert!(!results.is_empty());
        assert_eq!(results[0].item.id, "proj-billing");
        assert!(results[0].score > 0.0);
        assert!(results[0].why.is_some());
    }

    #[test]
    fn test_short_circuits_on_stop_words() {
        let index = corpus_index();
        let results =
            retriever().retrieve(&index, "hey, how is it?", None, &RetrievalOptions::default());
        assert!(results.is_empty());
    }

    #[test]
    fn test_min_score_filters() {
        let index = corpus_index();
        let options = RetrievalOptions {
            min_score: 1_000.0,
            ..RetrievalOptions::default()
        };
        assert!(retriever()
            .retrieve(&index, "billing migration", None, &options)
            .is_empty());
    }

    #[test]
    fn test_threshold_monotonicity() {
        let index = corpus_index();
        let queries = ["billing migration rollback", "tacos", "invoices migration", "dual-write"];
        for query in queries {
            let mut previous = usize::MAX;
            for min_score in [0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0] {
                let options = RetrievalOptions {
                    top_n: 6,
                    min_score,
                    apply_recipient_bias: false,
                };
                let count = retriever().retrieve(&index, query, None, &options).len();
                assert!(count <= previous, "{} at {}", query, min_score);
                previous = count;
            }
        }
    }

    #[test]
    fn test_results_sorted_descending() {
        let index = corpus_index();
        let options = RetrievalOptions {
            top_n: 6,
            min_score: 0.0,
            apply_recipient_bias: false,
        };
        let results = retriever().retrieve(&index, "billing migration invoices", None, &options);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

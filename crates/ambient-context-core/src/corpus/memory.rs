//! In-memory [`Corpus`] implementation backed by a static item list.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::KnowledgeItem;

use super::Corpus;

/// A corpus loaded once and never modified.
///
/// Duplicate ids keep the first occurrence.
#[derive(Debug, Default)]
pub struct StaticCorpus {
    items: Vec<Arc<KnowledgeItem>>,
    by_id: HashMap<String, usize>,
}

impl StaticCorpus {
    pub fn new(items: Vec<KnowledgeItem>) -> Self {
        let mut kept = Vec::with_capacity(items.len());
        let mut by_id = HashMap::with_capacity(items.len());
        for item in items {
            if by_id.contains_key(&item.id) {
                continue;
            }
            by_id.insert(item.id.clone(), kept.len());
            kept.push(Arc::new(item));
        }
        Self { items: kept, by_id }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Corpus for StaticCorpus {
    fn list_items(&self) -> Vec<Arc<KnowledgeItem>> {
        self.items.clone()
    }

    fn get_item(&self, id: &str) -> Option<Arc<KnowledgeItem>> {
        self.by_id.get(id).map(|&i| self.items[i].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;

    fn item(id: &str, title: &str) -> KnowledgeItem {
        KnowledgeItem {
            id: id.to_string(),
            kind: ItemKind::Note,
            title: title.to_string(),
            summary: String::new(),
            body: String::new(),
            tags: Vec::new(),
            entities: None,
            links: None,
            url: None,
            acl: None,
            source_system: None,
            container: None,
            updated_at_ms: None,
        }
    }

    #[test]
    fn test_lookup_by_id() {
        let corpus = StaticCorpus::new(vec![item("a", "Alpha"), item("b", "Beta")]);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get_item("b").unwrap().title, "Beta");
        assert!(corpus.get_item("zzz").is_none());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let corpus = StaticCorpus::new(vec![item("a", "First"), item("a", "Second")]);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.get_item("a").unwrap().title, "First");
        assert_eq!(corpus.list_items()[0].title, "First");
    }
}

//! Dataset loading: knowledge items plus the user and channel directory.
//!
//! The dataset is a single JSON document:
//!
//! ```json
//! {
//!   "items":    [ { "id": "...", "type": "project", "title": "...", ... } ],
//!   "users":    [ { "id": "user-jordan", "name": "Jordan Lee", "role": "Billing lead" } ],
//!   "channels": [ { "id": "chan-billing", "name": "#billing", "purpose": "..." } ]
//! }
//! ```
//!
//! Items are decoded one at a time. A malformed item is logged and skipped,
//! so one bad record never takes the whole corpus down.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use ambient_context_core::models::KnowledgeItem;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Deserialize)]
struct RawDataset {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    channels: Vec<Channel>,
}

/// Recipients and channels known to the service.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
}

impl Directory {
    pub fn new(users: Vec<User>, channels: Vec<Channel>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            channels: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn is_known_recipient(&self, id: &str) -> bool {
        self.users.contains_key(id)
    }

    /// Display name used in generation prompts.
    pub fn recipient_name(&self, id: &str) -> String {
        self.user(id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "teammate".to_string())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub items: Vec<KnowledgeItem>,
    pub directory: Directory,
    /// Items dropped while decoding.
    pub skipped: usize,
}

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    parse_dataset(&content).with_context(|| format!("Invalid dataset: {}", path.display()))
}

pub fn parse_dataset(content: &str) -> Result<Dataset> {
    let raw: RawDataset = serde_json::from_str(content)?;

    let mut items = Vec::with_capacity(raw.items.len());
    let mut skipped = 0;
    for (position, value) in raw.items.into_iter().enumerate() {
        match serde_json::from_value::<KnowledgeItem>(value) {
            Ok(item) if !item.id.trim().is_empty() && !item.title.trim().is_empty() => {
                items.push(item)
            }
            Ok(item) => {
                skipped += 1;
                tracing::warn!(position, id = %item.id, "skipping item without id or title");
            }
            Err(err) => {
                skipped += 1;
                tracing::warn!(position, error = %err, "skipping malformed item");
            }
        }
    }

    Ok(Dataset {
        items,
        directory: Directory::new(raw.users, raw.channels),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "items": [
            {"id": "proj-1", "type": "project", "title": "Billing", "body": "dual write"},
            {"id": "bad", "type": "spaceship", "title": "Nope"},
            {"id": "", "type": "note", "title": "No id"},
            {"id": "note-1", "type": "note", "title": "Standup",
             "acl": {"principals": ["user-alex"]}}
        ],
        "users": [{"id": "user-jordan", "name": "Jordan Lee", "role": "Billing lead"}],
        "channels": [{"id": "chan-billing", "name": "#billing", "purpose": "Billing work"}]
    }"##;

    #[test]
    fn test_parse_skips_malformed_items() {
        let dataset = parse_dataset(SAMPLE).unwrap();
        let ids: Vec<_> = dataset.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["proj-1", "note-1"]);
        assert_eq!(dataset.skipped, 2);
    }

    #[test]
    fn test_directory_lookups() {
        let dataset = parse_dataset(SAMPLE).unwrap();
        let dir = &dataset.directory;
        assert!(dir.is_known_recipient("user-jordan"));
        assert!(!dir.is_known_recipient("user-nobody"));
        assert_eq!(dir.recipient_name("user-jordan"), "Jordan Lee");
        assert_eq!(dir.recipient_name("user-nobody"), "teammate");
        assert_eq!(
            dir.channel("chan-billing").and_then(|c| c.purpose.as_deref()),
            Some("Billing work")
        );
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let dataset = parse_dataset("{}").unwrap();
        assert!(dataset.items.is_empty());
        assert_eq!(dataset.directory.user_count(), 0);
    }

    #[test]
    fn test_load_dataset_missing_file_errors() {
        let err = load_dataset(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read dataset"));
    }
}

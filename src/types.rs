//! Request and response shapes of the context API.
//!
//! All types serialize with camelCase field names. Optional response fields
//! are omitted when unset, so [`ContextResponse::default()`] serializes to
//! `{}`: the "no suggestion" answer.

use serde::{Deserialize, Serialize};

use ambient_context_core::models::{HitTrail, ItemKind, ScoredItem};

/// Whose message the draft text is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// The viewer is writing to the recipient.
    #[default]
    Compose,
    /// The viewer is reading a message from the recipient.
    IncomingLookup,
}

impl ContextMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Compose => "compose",
            ContextMode::IncomingLookup => "incoming_lookup",
        }
    }
}

impl std::str::FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compose" => Ok(ContextMode::Compose),
            "incoming_lookup" | "incoming-lookup" => Ok(ContextMode::IncomingLookup),
            other => Err(format!(
                "unknown mode '{}', expected compose or incoming_lookup",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    pub draft_text: String,
    pub recipient_id: String,
    #[serde(default)]
    pub mode: ContextMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Rate-limit identity. Never part of the fingerprint.
    #[serde(default)]
    pub client_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Med,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServingTier {
    Cache,
    Retrieval,
    Synthesis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&ScoredItem> for ContextSource {
    fn from(scored: &ScoredItem) -> Self {
        Self {
            id: scored.item.id.clone(),
            title: scored.item.title.clone(),
            kind: scored.item.kind,
            url: scored.item.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<HitTrail>,
}

impl From<&ScoredItem> for RetrievedEntry {
    fn from(scored: &ScoredItem) -> Self {
        Self {
            id: scored.item.id.clone(),
            title: Some(scored.item.title.clone()),
            score: scored.score,
            why: scored.why.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub retrieved: Vec<RetrievedEntry>,
    /// Generation skipped because the global in-flight ceiling was reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overloaded: Option<bool>,
    /// Generation skipped because this client exceeded its window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_questions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ContextSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_tier: Option<ServingTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

impl ContextResponse {
    /// True for the "no suggestion" answer.
    pub fn is_empty(&self) -> bool {
        self.topic.is_none() && self.sources.as_ref().map_or(true, |s| s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response_serializes_to_empty_object() {
        let json = serde_json::to_string(&ContextResponse::default()).unwrap();
        assert_eq!(json, "{}");
        assert!(ContextResponse::default().is_empty());
    }

    #[test]
    fn test_request_mode_defaults_to_compose() {
        let req: ContextRequest =
            serde_json::from_str(r#"{"draftText":"hi there","recipientId":"u1"}"#).unwrap();
        assert_eq!(req.mode, ContextMode::Compose);
        assert!(req.channel_id.is_none());
        assert_eq!(req.client_key, "");
    }

    #[test]
    fn test_incoming_lookup_wire_name() {
        let req: ContextRequest = serde_json::from_str(
            r#"{"draftText":"x","recipientId":"u1","mode":"incoming_lookup","channelId":"c1"}"#,
        )
        .unwrap();
        assert_eq!(req.mode, ContextMode::IncomingLookup);
        assert_eq!("incoming-lookup".parse::<ContextMode>(), Ok(ContextMode::IncomingLookup));
        assert!("shout".parse::<ContextMode>().is_err());
    }

    #[test]
    fn test_response_field_names() {
        let response = ContextResponse {
            topic: Some("Billing".into()),
            open_questions: Some(vec![]),
            serving_tier: Some(ServingTier::Retrieval),
            confidence: Some(Confidence::Med),
            freshness_ms: Some(0),
            debug: Some(DebugInfo {
                retrieved: vec![],
                overloaded: None,
                rate_limited: Some(true),
            }),
            ..ContextResponse::default()
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["servingTier"], "retrieval");
        assert_eq!(value["confidence"], "med");
        assert_eq!(value["freshnessMs"], 0);
        assert_eq!(value["debug"]["rateLimited"], true);
        assert!(value["debug"].get("overloaded").is_none());
        assert!(value.get("openQuestions").is_some());
    }
}

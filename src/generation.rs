//! Generation adapter: turns ranked snippets into a context card.
//!
//! Defines the [`Synthesizer`] trait and its implementations:
//! - **[`DisabledSynthesizer`]** always fails with [`GenerationError::Disabled`];
//!   used when `generation.provider = "disabled"`.
//! - **[`AnthropicSynthesizer`]** calls the Anthropic Messages API.
//!
//! Every failure is a typed [`GenerationError`]. The engine treats all of
//! them the same way: log, then serve the retrieval-only card.
//!
//! # Model fallback
//!
//! The Anthropic adapter tries the configured model, then each fallback in
//! order. A 404 whose body names a model marks that model unavailable for
//! the life of the process. The first model that answers is remembered and
//! used directly afterwards.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::types::ContextMode;

const API_KEY_VARS: [&str; 3] = ["ANTHROPIC_API_KEY", "ANTHROPIC_KEY", "CLAUDE_API_KEY"];
const ANTHROPIC_VERSION: &str = "2023-06-01";

const COMPOSE_SYSTEM_PROMPT: &str = "You are an invisible collaborator in a workplace messaging app. \
The user is writing a message. Only use the provided snippets; do not invent facts.\n\n\
Return ONLY valid JSON:\n\
{\"topic\":\"3-8 word label\",\"summary\":\"1-2 sentences\",\"openQuestions\":[\"question\",...]} \
or {\"insufficient\":true}";

const LOOKUP_SYSTEM_PROMPT: &str = "You are an invisible collaborator in a workplace messaging app. \
The user is reading a message they received. Explain the context it refers to. \
Only use the provided snippets; do not invent facts.\n\n\
Return ONLY valid JSON:\n\
{\"topic\":\"3-8 word label\",\"summary\":\"1-2 sentences\",\"openQuestions\":[\"question\",...]} \
or {\"insufficient\":true}";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation is disabled")]
    Disabled,
    #[error("no API key set (tried ANTHROPIC_API_KEY, ANTHROPIC_KEY, CLAUDE_API_KEY)")]
    MissingCredentials,
    #[error("API key rejected (401 Unauthorized)")]
    InvalidCredentials,
    #[error("no configured model is available")]
    ModelUnavailable,
    #[error("generation request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

impl GenerationError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Disabled => "disabled",
            GenerationError::MissingCredentials => "missing_credentials",
            GenerationError::InvalidCredentials => "invalid_credentials",
            GenerationError::ModelUnavailable => "model_unavailable",
            GenerationError::Timeout => "timeout",
            GenerationError::Transport(_) => "transport",
            GenerationError::Upstream { .. } => "upstream",
            GenerationError::MalformedOutput(_) => "malformed_output",
        }
    }
}

/// One ranked excerpt handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub title: String,
    pub summary: String,
    pub body_excerpt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelContext {
    pub name: String,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Already clipped to the generation draft limit.
    pub draft: String,
    pub recipient_name: String,
    pub mode: ContextMode,
    pub channel: Option<ChannelContext>,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis {
    Card {
        topic: String,
        summary: String,
        open_questions: Vec<String>,
    },
    /// The model declined: the snippets don't support a card.
    Insufficient,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Synthesis, GenerationError>;
}

// ============ Disabled ============

pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Synthesis, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

// ============ Anthropic ============

#[derive(Debug, Default)]
struct ModelState {
    resolved: Option<String>,
    unavailable: HashSet<String>,
}

pub struct AnthropicSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    models: Vec<String>,
    max_tokens: u32,
    state: Mutex<ModelState>,
}

/// First non-empty key among the supported environment variables.
pub fn api_key_from_env() -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

impl AnthropicSynthesizer {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Self::with_api_key(config, api_key_from_env())
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut seen = HashSet::new();
        let models: Vec<String> = std::iter::once(&config.model)
            .chain(config.fallback_models.iter())
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        if models.is_empty() {
            bail!("generation.model must not be empty");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            models,
            max_tokens: config.max_tokens,
            state: Mutex::new(ModelState::default()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn candidates(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = &state.resolved {
            if !state.unavailable.contains(model) {
                return vec![model.clone()];
            }
        }
        self.models
            .iter()
            .filter(|m| !state.unavailable.contains(*m))
            .cloned()
            .collect()
    }

    fn mark_unavailable(&self, model: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.unavailable.insert(model.to_string());
        if state.resolved.as_deref() == Some(model) {
            state.resolved = None;
        }
    }

    fn mark_resolved(&self, model: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.resolved = Some(model.to_string());
    }

    /// One Messages API call. `Ok(None)` means the model does not exist.
    async fn call_model(
        &self,
        api_key: &str,
        model: &str,
        request: &SynthesisRequest,
    ) -> Result<Option<String>, GenerationError> {
        let system = match request.mode {
            ContextMode::Compose => COMPOSE_SYSTEM_PROMPT,
            ContextMode::IncomingLookup => LOOKUP_SYSTEM_PROMPT,
        };
        let body = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": build_user_prompt(request) }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await.map_err(transport_error)?;
            return first_text_block(&json).map(Some);
        }

        let message = response.text().await.map_err(transport_error)?;
        match status.as_u16() {
            401 => Err(GenerationError::InvalidCredentials),
            404 if message.to_lowercase().contains("model:") => Ok(None),
            code => Err(GenerationError::Upstream {
                status: code,
                message,
            }),
        }
    }
}

#[async_trait]
impl Synthesizer for AnthropicSynthesizer {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Synthesis, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredentials)?;

        for model in self.candidates() {
            match self.call_model(api_key, &model, request).await? {
                Some(text) => {
                    self.mark_resolved(&model);
                    return parse_synthesis(&text);
                }
                None => {
                    tracing::warn!(model = %model, "model unavailable, trying next");
                    self.mark_unavailable(&model);
                }
            }
        }

        Err(GenerationError::ModelUnavailable)
    }
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(err.to_string())
    }
}

fn first_text_block(json: &serde_json::Value) -> Result<String, GenerationError> {
    json.get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::MalformedOutput("no text block in response".to_string()))
}

/// Compact user prompt: draft, recipient, optional channel, numbered snippets.
pub fn build_user_prompt(request: &SynthesisRequest) -> String {
    let channel_line = match &request.channel {
        Some(channel) => match &channel.purpose {
            Some(purpose) => format!("\nChannel: {} ({})", channel.name, purpose),
            None => format!("\nChannel: {}", channel.name),
        },
        None => String::new(),
    };

    let snippets = request
        .snippets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut block = format!("[{}] {}\n{}", i + 1, s.title, s.summary);
            if !s.body_excerpt.is_empty() {
                block.push('\n');
                block.push_str(&s.body_excerpt);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let header = match request.mode {
        ContextMode::Compose => format!("Draft to {}.", request.recipient_name),
        ContextMode::IncomingLookup => format!("Incoming from {}:", request.recipient_name),
    };

    format!(
        "{}{}\n{}\n\nSnippets:\n{}",
        header, channel_line, request.draft, snippets
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCard {
    #[serde(default)]
    insufficient: bool,
    topic: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    open_questions: Vec<String>,
}

/// Parse model output, tolerating a surrounding markdown code fence.
pub fn parse_synthesis(text: &str) -> Result<Synthesis, GenerationError> {
    let raw: RawCard = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| GenerationError::MalformedOutput(e.to_string()))?;

    if raw.insufficient {
        return Ok(Synthesis::Insufficient);
    }

    let topic = raw.topic.map(|t| t.trim().to_string()).unwrap_or_default();
    let summary = raw.summary.map(|s| s.trim().to_string()).unwrap_or_default();
    if topic.is_empty() || summary.is_empty() {
        return Err(GenerationError::MalformedOutput(
            "missing topic or summary".to_string(),
        ));
    }

    Ok(Synthesis::Card {
        topic,
        summary,
        open_questions: raw
            .open_questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// Create a synthesizer from configuration.
///
/// | Config Value | Synthesizer |
/// |-------------|-------------|
/// | `"disabled"` | [`DisabledSynthesizer`] |
/// | `"anthropic"` | [`AnthropicSynthesizer`] |
pub fn create_synthesizer(config: &GenerationConfig) -> Result<Arc<dyn Synthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSynthesizer)),
        "anthropic" => {
            let synthesizer = AnthropicSynthesizer::new(config)?;
            if !synthesizer.has_api_key() {
                tracing::warn!(
                    "generation is enabled but no API key is set \
                     (ANTHROPIC_API_KEY, ANTHROPIC_KEY, CLAUDE_API_KEY); \
                     every request will be served retrieval-only"
                );
            }
            Ok(Arc::new(synthesizer))
        }
        other => bail!("Unknown generation provider: {}", other),
    }
}

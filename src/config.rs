//! TOML configuration.
//!
//! Every tuning constant of the retrieval and orchestration pipeline is a
//! named field with a serde default, so a config file only needs to name
//! what it overrides. [`load_config`] parses and validates.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ambient_context_core::index::IndexOptions;
use ambient_context_core::retrieval::RetrievalOptions;
use ambient_context_core::search::ScoringParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    /// JSON file with `items`, `users`, and `channels`.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccessConfig {
    #[serde(default = "default_viewer_principals")]
    pub viewer_principals: Vec<String>,
    /// Appended to `viewer_principals` when set.
    #[serde(default)]
    pub current_user_id: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            viewer_principals: default_viewer_principals(),
            current_user_id: None,
        }
    }
}

fn default_viewer_principals() -> Vec<String> {
    vec!["group:all".to_string()]
}

impl AccessConfig {
    pub fn principals(&self) -> Vec<String> {
        let mut principals = self.viewer_principals.clone();
        if let Some(user) = &self.current_user_id {
            principals.push(user.clone());
        }
        principals
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_top_k_chunks")]
    pub top_k_chunks: usize,
    #[serde(default = "default_top_n_docs")]
    pub top_n_docs: usize,
    #[serde(default = "default_chunks_per_doc")]
    pub chunks_per_doc: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Candidates pulled per orchestrated request.
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_overlap_weight")]
    pub overlap_weight: f64,
    #[serde(default = "default_partial_weight")]
    pub partial_weight: f64,
    #[serde(default = "default_entity_boost")]
    pub entity_boost: f64,
    #[serde(default = "default_recipient_boost")]
    pub recipient_boost: f64,
    #[serde(default = "default_fuzzy_prefix_len")]
    pub fuzzy_prefix_len: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            top_k_chunks: default_top_k_chunks(),
            top_n_docs: default_top_n_docs(),
            chunks_per_doc: default_chunks_per_doc(),
            min_score: default_min_score(),
            candidate_pool: default_candidate_pool(),
            lexical_weight: default_lexical_weight(),
            overlap_weight: default_overlap_weight(),
            partial_weight: default_partial_weight(),
            entity_boost: default_entity_boost(),
            recipient_boost: default_recipient_boost(),
            fuzzy_prefix_len: default_fuzzy_prefix_len(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    520
}
fn default_top_k_chunks() -> usize {
    25
}
fn default_top_n_docs() -> usize {
    3
}
fn default_chunks_per_doc() -> usize {
    2
}
fn default_min_score() -> f64 {
    2.0
}
fn default_candidate_pool() -> usize {
    6
}
fn default_lexical_weight() -> f64 {
    2.0
}
fn default_overlap_weight() -> f64 {
    1.4
}
fn default_partial_weight() -> f64 {
    0.2
}
fn default_entity_boost() -> f64 {
    1.15
}
fn default_recipient_boost() -> f64 {
    1.25
}
fn default_fuzzy_prefix_len() -> usize {
    3
}

impl RetrievalConfig {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            max_chunk_chars: self.max_chunk_chars,
            fuzzy_prefix_len: self.fuzzy_prefix_len,
        }
    }

    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            lexical_weight: self.lexical_weight,
            overlap_weight: self.overlap_weight,
            partial_weight: self.partial_weight,
            entity_boost: self.entity_boost,
            recipient_boost: self.recipient_boost,
            top_k_chunks: self.top_k_chunks,
            chunks_per_doc: self.chunks_per_doc,
        }
    }

    /// Options for direct (CLI) searches.
    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_n: self.top_n_docs,
            min_score: self.min_score,
            apply_recipient_bias: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: i64,
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: i64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    #[serde(default = "default_max_inflight_synthesis")]
    pub max_inflight_synthesis: usize,
    #[serde(default = "default_fingerprint_max_chars")]
    pub fingerprint_max_chars: usize,
    /// Drafts shorter than this are answered with `{}` at the HTTP boundary.
    #[serde(default = "default_min_draft_chars")]
    pub min_draft_chars: usize,
    #[serde(default = "default_compose_score_threshold")]
    pub compose_score_threshold: f64,
    #[serde(default = "default_compose_length_threshold")]
    pub compose_length_threshold: usize,
    #[serde(default = "default_lookup_score_threshold")]
    pub lookup_score_threshold: f64,
    #[serde(default = "default_lookup_length_threshold")]
    pub lookup_length_threshold: usize,
    /// Score multiplier for `user` items in incoming-lookup mode.
    #[serde(default = "default_lookup_user_weight")]
    pub lookup_user_weight: f64,
    #[serde(default = "default_confidence_high")]
    pub confidence_high: f64,
    #[serde(default = "default_confidence_med")]
    pub confidence_med: f64,
    /// Added to the top score for a source cited by URL in the draft.
    #[serde(default = "default_cited_source_bonus")]
    pub cited_source_bonus: f64,
    #[serde(default = "default_max_open_questions")]
    pub max_open_questions: usize,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_snippet_body_chars")]
    pub snippet_body_chars: usize,
    #[serde(default = "default_max_draft_chars_for_generation")]
    pub max_draft_chars_for_generation: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            max_cache_entries: default_max_cache_entries(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            max_inflight_synthesis: default_max_inflight_synthesis(),
            fingerprint_max_chars: default_fingerprint_max_chars(),
            min_draft_chars: default_min_draft_chars(),
            compose_score_threshold: default_compose_score_threshold(),
            compose_length_threshold: default_compose_length_threshold(),
            lookup_score_threshold: default_lookup_score_threshold(),
            lookup_length_threshold: default_lookup_length_threshold(),
            lookup_user_weight: default_lookup_user_weight(),
            confidence_high: default_confidence_high(),
            confidence_med: default_confidence_med(),
            cited_source_bonus: default_cited_source_bonus(),
            max_open_questions: default_max_open_questions(),
            max_snippets: default_max_snippets(),
            snippet_body_chars: default_snippet_body_chars(),
            max_draft_chars_for_generation: default_max_draft_chars_for_generation(),
        }
    }
}

fn default_cache_ttl_ms() -> i64 {
    45_000
}
fn default_max_cache_entries() -> usize {
    5_000
}
fn default_rate_limit_window_ms() -> i64 {
    10_000
}
fn default_rate_limit_max_requests() -> u32 {
    20
}
fn default_max_inflight_synthesis() -> usize {
    24
}
fn default_fingerprint_max_chars() -> usize {
    240
}
fn default_min_draft_chars() -> usize {
    6
}
fn default_compose_score_threshold() -> f64 {
    3.2
}
fn default_compose_length_threshold() -> usize {
    18
}
fn default_lookup_score_threshold() -> f64 {
    2.2
}
fn default_lookup_length_threshold() -> usize {
    110
}
fn default_lookup_user_weight() -> f64 {
    0.45
}
fn default_confidence_high() -> f64 {
    8.0
}
fn default_confidence_med() -> f64 {
    4.0
}
fn default_cited_source_bonus() -> f64 {
    12.0
}
fn default_max_open_questions() -> usize {
    4
}
fn default_max_snippets() -> usize {
    3
}
fn default_snippet_body_chars() -> usize {
    120
}
fn default_max_draft_chars_for_generation() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Tried in order when the configured model is unavailable.
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            fallback_models: default_fallback_models(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_fallback_models() -> Vec<String> {
    vec!["claude-3-haiku-20240307".to_string()]
}
fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_tokens() -> u32 {
    180
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;

    // Resolve a relative dataset path against the config file's directory.
    if config.dataset.path.is_relative() {
        if let Some(dir) = path.parent() {
            config.dataset.path = dir.join(&config.dataset.path);
        }
    }

    Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let retrieval = &config.retrieval;
    if retrieval.max_chunk_chars == 0 {
        bail!("retrieval.max_chunk_chars must be > 0");
    }
    if retrieval.top_n_docs == 0 {
        bail!("retrieval.top_n_docs must be >= 1");
    }
    if retrieval.top_k_chunks == 0 || retrieval.chunks_per_doc == 0 {
        bail!("retrieval.top_k_chunks and retrieval.chunks_per_doc must be >= 1");
    }
    if retrieval.candidate_pool == 0 {
        bail!("retrieval.candidate_pool must be >= 1");
    }

    let engine = &config.engine;
    if engine.cache_ttl_ms <= 0 {
        bail!("engine.cache_ttl_ms must be > 0");
    }
    if engine.max_cache_entries == 0 {
        bail!("engine.max_cache_entries must be > 0");
    }
    if engine.rate_limit_window_ms <= 0 || engine.rate_limit_max_requests == 0 {
        bail!("engine.rate_limit_window_ms and engine.rate_limit_max_requests must be > 0");
    }
    if engine.fingerprint_max_chars == 0 {
        bail!("engine.fingerprint_max_chars must be > 0");
    }

    match config.generation.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }
    if config.generation.is_enabled() && config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }

    Ok(config)
}

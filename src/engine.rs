//! Context orchestrator.
//!
//! [`ContextEngine`] owns all mutable serving state: the lazily built
//! index, the response cache, the in-flight registry, the per-client rate
//! limiter and the generation load counter. Construct one per process and
//! share it by cloning (clones share state).
//!
//! # Algorithm
//!
//! For each request:
//!
//! 1. Blank draft → empty response.
//! 2. Under one lock, with no await in between: a fresh cache entry is
//!    returned as `servingTier = "cache"`; an in-flight computation for the
//!    same fingerprint is joined; otherwise a computation is registered and
//!    spawned.
//! 3. The computation prunes the cache and rate table, retrieves a candidate
//!    pool, forces cited GitHub sources to the top, down-weights `user`
//!    items in incoming-lookup mode, and resolves to empty if nothing
//!    survives.
//! 4. Generation runs only when neither the global in-flight ceiling nor the
//!    client's rate window is exceeded and the score/length thresholds for
//!    the mode are met. Any generation failure falls back to the
//!    retrieval-only card.
//! 5. Missing open questions are derived heuristically; incoming-lookup
//!    mode prefers non-`user` sources.
//! 6. Non-empty results are cached; the in-flight marker is always removed.
//!
//! The computation runs on its own task. A caller that stops waiting does
//! not cancel it and does not affect other waiters.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use ambient_context_core::access::Principals;
use ambient_context_core::corpus::{Corpus, StaticCorpus};
use ambient_context_core::index::{CorpusIndex, IndexHandle, IndexOptions, IndexStats};
use ambient_context_core::models::{ItemKind, ScoredItem};
use ambient_context_core::retrieval::{RetrievalOptions, Retriever};
use ambient_context_core::search::ScoringParams;

use crate::cache::ResponseCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, EngineConfig};
use crate::dataset::{load_dataset, Directory};
use crate::fingerprint::fingerprint;
use crate::generation::{
    create_synthesizer, ChannelContext, Snippet, Synthesis, SynthesisRequest, Synthesizer,
};
use crate::heuristics::{cited_github_urls, derive_open_questions};
use crate::rate_limit::RateLimiter;
use crate::types::{
    Confidence, ContextMode, ContextRequest, ContextResponse, ContextSource, DebugInfo,
    RetrievedEntry, ServingTier,
};

const LOG_QUERY_CHARS: usize = 60;

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub viewer: Principals,
    pub scoring: ScoringParams,
    pub index: IndexOptions,
    /// Candidates retrieved per request.
    pub candidate_pool: usize,
    pub min_score: f64,
    pub engine: EngineConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            viewer: Principals::new(["group:all"]),
            scoring: ScoringParams::default(),
            index: IndexOptions::default(),
            candidate_pool: 6,
            min_score: 2.0,
            engine: EngineConfig::default(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            viewer: Principals::new(config.access.principals()),
            scoring: config.retrieval.scoring_params(),
            index: config.retrieval.index_options(),
            candidate_pool: config.retrieval.candidate_pool,
            min_score: config.retrieval.min_score,
            engine: config.engine.clone(),
        }
    }
}

/// Point-in-time counters, served by `GET /stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub cache_size: usize,
    pub inflight_keys: usize,
    pub inflight_synthesis: usize,
    pub computations: u64,
    pub tracked_clients: usize,
    pub index_builds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexStats>,
}

type SharedResult = watch::Receiver<Option<Arc<ContextResponse>>>;

struct EngineState {
    cache: ResponseCache,
    inflight: HashMap<String, SharedResult>,
    limiter: RateLimiter,
}

struct EngineInner {
    index: IndexHandle,
    retriever: Retriever,
    directory: Directory,
    synthesizer: Arc<dyn Synthesizer>,
    clock: Arc<dyn Clock>,
    candidate_pool: usize,
    min_score: f64,
    config: EngineConfig,
    state: Mutex<EngineState>,
    /// One permit per concurrent generation call.
    synthesis_permits: Arc<Semaphore>,
    synthesis_capacity: usize,
    computations: AtomicU64,
}

#[derive(Clone)]
pub struct ContextEngine {
    inner: Arc<EngineInner>,
}

impl ContextEngine {
    pub fn new(
        corpus: Arc<dyn Corpus>,
        directory: Directory,
        synthesizer: Arc<dyn Synthesizer>,
        options: EngineOptions,
    ) -> Self {
        Self::with_clock(corpus, directory, synthesizer, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        corpus: Arc<dyn Corpus>,
        directory: Directory,
        synthesizer: Arc<dyn Synthesizer>,
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = options.engine;
        let synthesis_capacity = config.max_inflight_synthesis.min(Semaphore::MAX_PERMITS);
        let state = EngineState {
            cache: ResponseCache::new(config.cache_ttl_ms, config.max_cache_entries),
            inflight: HashMap::new(),
            limiter: RateLimiter::new(config.rate_limit_window_ms, config.rate_limit_max_requests),
        };
        Self {
            inner: Arc::new(EngineInner {
                index: IndexHandle::new(corpus, options.index),
                retriever: Retriever::new(options.viewer, options.scoring),
                directory,
                synthesizer,
                clock,
                candidate_pool: options.candidate_pool,
                min_score: options.min_score,
                config,
                state: Mutex::new(state),
                synthesis_permits: Arc::new(Semaphore::new(synthesis_capacity)),
                synthesis_capacity,
                computations: AtomicU64::new(0),
            }),
        }
    }

    /// Loads the dataset and synthesizer named by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let dataset = load_dataset(&config.dataset.path)?;
        if dataset.skipped > 0 {
            tracing::warn!(skipped = dataset.skipped, "dataset items skipped");
        }
        let synthesizer = create_synthesizer(&config.generation)?;
        Ok(Self::new(
            Arc::new(StaticCorpus::new(dataset.items)),
            dataset.directory,
            synthesizer,
            EngineOptions::from_config(config),
        ))
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Builds the index now instead of on the first request.
    pub fn warm_up(&self) -> IndexStats {
        self.inner.ensure_index().stats()
    }

    /// Answer one request. Never fails: the worst case is an empty response.
    pub async fn suggest(&self, request: ContextRequest) -> ContextResponse {
        if request.draft_text.trim().is_empty() {
            return ContextResponse::default();
        }

        let key = fingerprint(&request, self.inner.config.fingerprint_max_chars);

        let mut shared = {
            let mut state = self.inner.lock_state();
            let now = self.inner.clock.now_ms();

            if let Some(hit) = state.cache.get(&key, now) {
                let mut response = (*hit.response).clone();
                response.serving_tier = Some(ServingTier::Cache);
                response.freshness_ms = Some(hit.age_ms);
                tracing::debug!(key = %key, age_ms = hit.age_ms, "cache hit");
                return response;
            }

            match state.inflight.get(&key) {
                Some(existing) => {
                    tracing::debug!(key = %key, "joining in-flight computation");
                    existing.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.inflight.insert(key.clone(), rx.clone());
                    let inner = self.inner.clone();
                    tokio::spawn(async move {
                        let _guard = InflightGuard {
                            inner: inner.clone(),
                            key: key.clone(),
                        };
                        let response = Arc::new(inner.compute(request).await);
                        inner.publish(&key, &response);
                        let _ = tx.send(Some(response));
                    });
                    rx
                }
            }
        };

        let result = match shared.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };

        match result {
            Some(response) => (*response).clone(),
            None => {
                tracing::warn!("in-flight computation ended without a result");
                ContextResponse::default()
            }
        }
    }

    /// Drops the built index and every cached response.
    pub fn invalidate(&self) {
        self.inner.index.invalidate();
        self.inner.lock_state().cache.clear();
        tracing::info!("index and response cache invalidated");
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.inner.lock_state();
        EngineStats {
            cache_size: state.cache.len(),
            inflight_keys: state.inflight.len(),
            inflight_synthesis: self.inner.synthesis_inflight(),
            computations: self.inner.computations.load(Ordering::SeqCst),
            tracked_clients: state.limiter.tracked_clients(),
            index_builds: self.inner.index.build_count(),
            index: self.inner.index.current().map(|index| index.stats()),
        }
    }
}

/// Removes the in-flight marker however the computation ends.
struct InflightGuard {
    inner: Arc<EngineInner>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner.lock_state().inflight.remove(&self.key);
    }
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn synthesis_inflight(&self) -> usize {
        self.synthesis_capacity
            .saturating_sub(self.synthesis_permits.available_permits())
    }

    /// The built index. A first build runs on the blocking pool so it never
    /// stalls a runtime worker.
    async fn built_index(self: &Arc<Self>) -> Arc<CorpusIndex> {
        if let Some(index) = self.index.current() {
            return index;
        }
        let inner = self.clone();
        match tokio::task::spawn_blocking(move || inner.ensure_index()).await {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!(error = %err, "index build task failed, building inline");
                self.ensure_index()
            }
        }
    }

    fn ensure_index(&self) -> Arc<CorpusIndex> {
        let builds_before = self.index.build_count();
        let started = Instant::now();
        let index = self.index.ensure_built();
        if self.index.build_count() != builds_before {
            let stats = index.stats();
            tracing::info!(
                items = stats.items,
                skipped = stats.skipped_items,
                chunks = stats.chunks,
                vocabulary = stats.vocabulary,
                digest = %stats.digest,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "index built"
            );
        }
        index
    }

    fn publish(&self, key: &str, response: &Arc<ContextResponse>) {
        if response.is_empty() {
            return;
        }
        let now = self.clock.now_ms();
        self.lock_state()
            .cache
            .insert(key.to_string(), response.clone(), now);
    }

    async fn compute(self: &Arc<Self>, request: ContextRequest) -> ContextResponse {
        self.computations.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let now = self.clock.now_ms();
        {
            let mut state = self.lock_state();
            let pruned = state.cache.prune(now);
            state.limiter.prune(now);
            if pruned > 0 {
                tracing::debug!(pruned, "cache pruned");
            }
        }

        let draft = request.draft_text.trim();
        let index = self.built_index().await;
        let candidates = self.candidates(&index, draft, &request);
        let Some(top_score) = candidates.first().map(|c| c.score) else {
            tracing::debug!(mode = request.mode.as_str(), "no candidates");
            return ContextResponse::default();
        };

        // The permit is taken in the same step as the ceiling check and held
        // for the whole generation call.
        let wants_synthesis = self.wants_synthesis(request.mode, top_score, draft);
        let permit = if wants_synthesis {
            self.synthesis_permits.clone().try_acquire_owned().ok()
        } else {
            None
        };
        let overloaded = if wants_synthesis {
            permit.is_none()
        } else {
            self.synthesis_permits.available_permits() == 0
        };
        let rate_limited = self.lock_state().limiter.check(&request.client_key, now);

        let mut response = None;
        if let Some(permit) = permit.filter(|_| !rate_limited) {
            response = self.synthesize(&request, draft, &candidates, permit).await;
        }
        let mut response = response.unwrap_or_else(|| self.retrieval_card(&candidates));

        if response
            .open_questions
            .as_ref()
            .map_or(true, |questions| questions.is_empty())
        {
            let bodies = candidates.iter().map(|c| c.item.body.as_str());
            response.open_questions = Some(derive_open_questions(
                bodies,
                self.config.max_open_questions,
            ));
        }

        if request.mode == ContextMode::IncomingLookup {
            if let Some(sources) = response.sources.as_mut() {
                if sources.iter().any(|s| s.kind != ItemKind::User) {
                    sources.retain(|s| s.kind != ItemKind::User);
                }
            }
        }

        response.freshness_ms = Some(0);
        if overloaded || rate_limited {
            let debug = response.debug.get_or_insert_with(DebugInfo::default);
            debug.overloaded = Some(overloaded);
            debug.rate_limited = Some(rate_limited);
        }

        let cache_size = self.lock_state().cache.len();
        let query: String = draft.chars().take(LOG_QUERY_CHARS).collect();
        tracing::debug!(
            mode = request.mode.as_str(),
            tier = ?response.serving_tier,
            candidates = candidates.len(),
            top_score,
            overloaded,
            rate_limited,
            cache_size,
            inflight_synthesis = self.synthesis_inflight(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            query = %query,
            "context computed"
        );

        response
    }

    /// Ranked candidates after cited-source boosting and mode weighting.
    fn candidates(
        &self,
        index: &CorpusIndex,
        draft: &str,
        request: &ContextRequest,
    ) -> Vec<ScoredItem> {
        let options = RetrievalOptions {
            top_n: self.candidate_pool,
            min_score: self.min_score,
            apply_recipient_bias: request.mode == ContextMode::Compose,
        };
        let mut scored =
            self.retriever
                .retrieve(index, draft, Some(request.recipient_id.as_str()), &options);

        self.boost_cited_sources(index, draft, &mut scored);

        if request.mode == ContextMode::IncomingLookup {
            for candidate in scored.iter_mut() {
                if candidate.item.kind == ItemKind::User {
                    candidate.score *= self.config.lookup_user_weight;
                }
            }
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }

    /// Forces every visible item cited by GitHub URL above the current top.
    fn boost_cited_sources(&self, index: &CorpusIndex, draft: &str, scored: &mut Vec<ScoredItem>) {
        let urls = cited_github_urls(draft);
        if urls.is_empty() {
            return;
        }

        let forced = scored.first().map_or(0.0, |s| s.score) + self.config.cited_source_bonus;
        for url in urls {
            let Some(item) = index.item_by_url(&url) else {
                continue;
            };
            if !self.retriever.viewer().can_see(item.acl_principals()) {
                continue;
            }
            match scored.iter().position(|s| s.item.id == item.id) {
                Some(pos) => scored[pos].score = scored[pos].score.max(forced),
                None => scored.push(ScoredItem {
                    item: item.clone(),
                    score: forced,
                    why: None,
                }),
            }
        }
    }

    fn wants_synthesis(&self, mode: ContextMode, top_score: f64, draft: &str) -> bool {
        let length = draft.chars().count();
        match mode {
            ContextMode::Compose => {
                top_score >= self.config.compose_score_threshold
                    || length >= self.config.compose_length_threshold
            }
            ContextMode::IncomingLookup => {
                top_score >= self.config.lookup_score_threshold
                    || length >= self.config.lookup_length_threshold
            }
        }
    }

    async fn synthesize(
        &self,
        request: &ContextRequest,
        draft: &str,
        candidates: &[ScoredItem],
        permit: OwnedSemaphorePermit,
    ) -> Option<ContextResponse> {
        let synthesis_request = SynthesisRequest {
            draft: clip(draft, self.config.max_draft_chars_for_generation),
            recipient_name: self.directory.recipient_name(&request.recipient_id),
            mode: request.mode,
            channel: request
                .channel_id
                .as_deref()
                .and_then(|id| self.directory.channel(id))
                .map(|channel| ChannelContext {
                    name: channel.name.clone(),
                    purpose: channel.purpose.clone(),
                }),
            snippets: candidates
                .iter()
                .take(self.config.max_snippets)
                .map(|c| Snippet {
                    title: c.item.title.clone(),
                    summary: c.item.summary.clone(),
                    body_excerpt: c
                        .item
                        .body
                        .chars()
                        .take(self.config.snippet_body_chars)
                        .collect(),
                })
                .collect(),
        };

        let result = self.synthesizer.synthesize(&synthesis_request).await;
        drop(permit);

        match result {
            Ok(Synthesis::Card {
                topic,
                summary,
                open_questions,
            }) => Some(ContextResponse {
                topic: Some(topic),
                summary: Some(summary),
                open_questions: Some(open_questions),
                serving_tier: Some(ServingTier::Synthesis),
                ..self.retrieval_card(candidates)
            }),
            Ok(Synthesis::Insufficient) => {
                tracing::debug!("generation reported insufficient evidence");
                None
            }
            Err(err) => {
                tracing::warn!(
                    synthesizer = self.synthesizer.name(),
                    kind = err.kind(),
                    error = %err,
                    "generation failed, serving retrieval-only"
                );
                None
            }
        }
    }

    fn retrieval_card(&self, candidates: &[ScoredItem]) -> ContextResponse {
        let Some(top) = candidates.first() else {
            return ContextResponse::default();
        };
        let confidence = if top.score >= self.config.confidence_high {
            Confidence::High
        } else if top.score >= self.config.confidence_med {
            Confidence::Med
        } else {
            Confidence::Low
        };

        ContextResponse {
            topic: Some(top.item.title.clone()),
            summary: Some(top.item.summary.clone()),
            open_questions: Some(Vec::new()),
            sources: Some(candidates.iter().map(ContextSource::from).collect()),
            confidence: Some(confidence),
            serving_tier: Some(ServingTier::Retrieval),
            freshness_ms: None,
            debug: Some(DebugInfo {
                retrieved: candidates.iter().map(RetrievedEntry::from).collect(),
                overloaded: None,
                rate_limited: None,
            }),
        }
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push('…');
    clipped
}

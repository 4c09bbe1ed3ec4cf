use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ambient_context::clock::ManualClock;
use ambient_context::config::EngineConfig;
use ambient_context::dataset::{parse_dataset, Dataset};
use ambient_context::engine::{ContextEngine, EngineOptions};
use ambient_context::generation::{
    DisabledSynthesizer, GenerationError, Synthesis, SynthesisRequest, Synthesizer,
};
use ambient_context::types::{ContextMode, ContextRequest, ContextResponse, ServingTier};
use ambient_context_core::access::Principals;
use ambient_context_core::corpus::{Corpus, StaticCorpus};
use ambient_context_core::models::{ItemKind, KnowledgeItem};

fn dataset() -> Dataset {
    parse_dataset(include_str!("fixtures/knowledge.json")).unwrap()
}

/// Answers every call with a fixed card after an optional delay.
struct CountingSynthesizer {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingSynthesizer {
    fn new(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for CountingSynthesizer {
    fn name(&self) -> &str {
        "counting"
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Synthesis, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Synthesis::Card {
            topic: "Billing cutover".to_string(),
            summary: "Dual writes are live; cutover is scheduled.".to_string(),
            open_questions: vec!["Is finance signed off?".to_string()],
        })
    }
}

/// Fails every call.
struct FailingSynthesizer;

#[async_trait]
impl Synthesizer for FailingSynthesizer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Synthesis, GenerationError> {
        Err(GenerationError::Timeout)
    }
}

struct Setup {
    engine: ContextEngine,
    clock: Arc<ManualClock>,
}

fn setup(synthesizer: Arc<dyn Synthesizer>, engine_config: EngineConfig) -> Setup {
    setup_with_viewer(synthesizer, engine_config, Principals::new(["group:all"]))
}

fn setup_with_viewer(
    synthesizer: Arc<dyn Synthesizer>,
    engine_config: EngineConfig,
    viewer: Principals,
) -> Setup {
    let data = dataset();
    let clock = Arc::new(ManualClock::new(1_000_000));
    let options = EngineOptions {
        viewer,
        engine: engine_config,
        ..EngineOptions::default()
    };
    let engine = ContextEngine::with_clock(
        Arc::new(StaticCorpus::new(data.items)),
        data.directory,
        synthesizer,
        options,
        clock.clone(),
    );
    Setup { engine, clock }
}

fn request(draft: &str) -> ContextRequest {
    ContextRequest {
        draft_text: draft.to_string(),
        recipient_id: "user-priya".to_string(),
        mode: ContextMode::Compose,
        channel_id: None,
        client_key: "10.0.0.1".to_string(),
    }
}

fn source_ids(response: &ContextResponse) -> Vec<String> {
    response
        .sources
        .as_ref()
        .map(|s| s.iter().map(|s| s.id.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_billing_rollback_top_hit() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let response = engine.suggest(request("billing migration rollback")).await;

    assert_eq!(source_ids(&response)[0], "proj-billing-migration");
    let debug = response.debug.as_ref().unwrap();
    assert!(debug.retrieved[0].score > 0.0);
    assert_eq!(response.serving_tier, Some(ServingTier::Retrieval));
    assert_eq!(response.freshness_ms, Some(0));
    assert_eq!(
        response.topic.as_deref(),
        Some("Billing Database Migration — Dual-Write Strategy")
    );
}

#[tokio::test]
async fn test_blank_draft_is_empty_response() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    for draft in ["", "   ", "\n\t "] {
        let response = engine.suggest(request(draft)).await;
        assert_eq!(response, ContextResponse::default());
        assert_eq!(serde_json::to_string(&response).unwrap(), "{}");
    }
    assert_eq!(engine.stats().computations, 0);
}

#[tokio::test]
async fn test_cited_issue_shorthand_is_forced_into_sources() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let response = engine
        .suggest(request("seeing it again, see facebook/react-native#55027"))
        .await;

    let sources = response.sources.unwrap();
    assert_eq!(sources[0].id, "issue-rn-55027");
    assert_eq!(
        sources[0].url.as_deref(),
        Some("https://github.com/facebook/react-native/issues/55027")
    );
}

#[tokio::test]
async fn test_cited_issue_respects_access_control() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let response = engine
        .suggest(request("billing migration, also acme/secret#42"))
        .await;
    assert!(!source_ids(&response).contains(&"note-zanzibar".to_string()));
}

#[tokio::test]
async fn test_generation_failure_falls_back_to_retrieval() {
    let Setup { engine, .. } = setup(Arc::new(FailingSynthesizer), EngineConfig::default());
    let response = engine
        .suggest(request("what's the status of the billing migration rollback plan?"))
        .await;

    assert_eq!(response.serving_tier, Some(ServingTier::Retrieval));
    assert_eq!(source_ids(&response)[0], "proj-billing-migration");
}

#[tokio::test]
async fn test_synthesis_tier_when_generation_succeeds() {
    let synth = CountingSynthesizer::new(0);
    let Setup { engine, .. } = setup(synth.clone(), EngineConfig::default());
    let response = engine
        .suggest(request("what's the status of the billing migration rollback plan?"))
        .await;

    assert_eq!(response.serving_tier, Some(ServingTier::Synthesis));
    assert_eq!(response.topic.as_deref(), Some("Billing cutover"));
    assert_eq!(
        response.open_questions,
        Some(vec!["Is finance signed off?".to_string()])
    );
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn test_retrieval_card_derives_open_questions() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let response = engine.suggest(request("billing migration rollback")).await;

    let questions = response.open_questions.unwrap();
    assert!(!questions.is_empty() && questions.len() <= 4);
    assert!(questions.iter().any(|q| q.contains("Priya")));
    assert!(questions.iter().any(|q| q.contains("rollback plan")));
}

#[tokio::test]
async fn test_concurrent_identical_requests_coalesce() {
    let synth = CountingSynthesizer::new(150);
    let Setup { engine, .. } = setup(synth.clone(), EngineConfig::default());
    let draft = "can we confirm the billing migration rollback plan?";

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.suggest(request(draft)).await })
        })
        .collect();

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.unwrap());
    }

    assert_eq!(synth.calls(), 1);
    assert_eq!(engine.stats().computations, 1);
    assert_eq!(engine.stats().inflight_keys, 0);
    for response in &responses {
        assert_eq!(response.topic.as_deref(), Some("Billing cutover"));
    }
}

#[tokio::test]
async fn test_dropped_waiter_does_not_cancel_computation() {
    let synth = CountingSynthesizer::new(150);
    let Setup { engine, .. } = setup(synth.clone(), EngineConfig::default());
    let draft = "can we confirm the billing migration rollback plan?";

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.suggest(request(draft)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    first.abort();

    let response = engine.suggest(request(draft)).await;
    assert_eq!(response.serving_tier, Some(ServingTier::Synthesis));
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn test_cache_hit_matches_original_payload() {
    let Setup { engine, clock } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let first = engine.suggest(request("billing migration rollback")).await;

    clock.advance(1_500);
    let second = engine.suggest(request("  Billing   MIGRATION rollback ")).await;
    let third = engine.suggest(request("billing migration rollback")).await;

    assert_eq!(second.serving_tier, Some(ServingTier::Cache));
    assert_eq!(second.freshness_ms, Some(1_500));
    assert_eq!(engine.stats().computations, 1);

    let strip = |mut r: ContextResponse| {
        r.serving_tier = None;
        r.freshness_ms = None;
        r
    };
    assert_eq!(strip(first), strip(second.clone()));
    assert_eq!(strip(second), strip(third));
}

#[tokio::test]
async fn test_cache_expires_after_ttl() {
    let config = EngineConfig {
        cache_ttl_ms: 1_000,
        ..EngineConfig::default()
    };
    let Setup { engine, clock } = setup(Arc::new(DisabledSynthesizer), config);
    engine.suggest(request("billing migration rollback")).await;
    clock.advance(1_001);
    let again = engine.suggest(request("billing migration rollback")).await;
    assert_eq!(again.serving_tier, Some(ServingTier::Retrieval));
    assert_eq!(engine.stats().computations, 2);
}

#[tokio::test]
async fn test_empty_results_are_not_cached() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let response = engine.suggest(request("quasar nebula photometry")).await;
    assert_eq!(response, ContextResponse::default());
    assert_eq!(engine.stats().cache_size, 0);
}

#[tokio::test]
async fn test_private_items_never_surface() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    for draft in [
        "zanzibar acquisition valuation",
        "zanzibar earn-out schedule",
        "billing migration zanzibar",
    ] {
        let response = engine.suggest(request(draft)).await;
        assert!(!source_ids(&response).contains(&"note-zanzibar".to_string()));
        if let Some(debug) = response.debug {
            assert!(debug.retrieved.iter().all(|r| r.id != "note-zanzibar"));
        }
    }

    let Setup { engine, .. } = setup_with_viewer(
        Arc::new(DisabledSynthesizer),
        EngineConfig::default(),
        Principals::new(["group:all", "user-alex"]),
    );
    let response = engine.suggest(request("zanzibar acquisition valuation")).await;
    assert_eq!(source_ids(&response)[0], "note-zanzibar");
}

#[tokio::test]
async fn test_rate_limit_suppresses_generation() {
    let synth = CountingSynthesizer::new(0);
    let config = EngineConfig {
        rate_limit_max_requests: 2,
        rate_limit_window_ms: 10_000,
        ..EngineConfig::default()
    };
    let Setup { engine, clock } = setup(synth.clone(), config);

    let drafts = [
        "billing migration rollback plan, first pass",
        "billing migration rollback plan, second pass",
        "billing migration rollback plan, third pass",
    ];
    let mut responses = Vec::new();
    for draft in drafts {
        responses.push(engine.suggest(request(draft)).await);
    }

    assert_eq!(responses[1].serving_tier, Some(ServingTier::Synthesis));
    assert!(responses[1].debug.as_ref().unwrap().rate_limited.is_none());

    let limited = &responses[2];
    assert_eq!(limited.serving_tier, Some(ServingTier::Retrieval));
    let debug = limited.debug.as_ref().unwrap();
    assert_eq!(debug.rate_limited, Some(true));
    assert_eq!(debug.overloaded, Some(false));
    assert_eq!(synth.calls(), 2);

    // Another client is unaffected.
    let mut other = request("billing migration rollback plan, other client");
    other.client_key = "10.0.0.2".to_string();
    assert_eq!(engine.suggest(other).await.serving_tier, Some(ServingTier::Synthesis));

    clock.advance(10_000);
    let fresh = engine
        .suggest(request("billing migration rollback plan, next window"))
        .await;
    assert_eq!(fresh.serving_tier, Some(ServingTier::Synthesis));
}

#[tokio::test]
async fn test_overload_sheds_generation() {
    let synth = CountingSynthesizer::new(0);
    let config = EngineConfig {
        max_inflight_synthesis: 0,
        ..EngineConfig::default()
    };
    let Setup { engine, .. } = setup(synth.clone(), config);
    let response = engine
        .suggest(request("what's the status of the billing migration rollback plan?"))
        .await;

    assert_eq!(response.serving_tier, Some(ServingTier::Retrieval));
    let debug = response.debug.unwrap();
    assert_eq!(debug.overloaded, Some(true));
    assert_eq!(debug.rate_limited, Some(false));
    assert_eq!(synth.calls(), 0);
}

/// Records the highest number of calls running at once.
struct PeakSynthesizer {
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Synthesizer for PeakSynthesizer {
    fn name(&self) -> &str {
        "peak"
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Synthesis, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Synthesis::Card {
            topic: "Billing cutover".to_string(),
            summary: "Dual writes are live.".to_string(),
            open_questions: Vec::new(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_generation_ceiling_holds_under_parallel_load() {
    let synth = Arc::new(PeakSynthesizer {
        running: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });
    let config = EngineConfig {
        max_inflight_synthesis: 1,
        ..EngineConfig::default()
    };
    let Setup { engine, .. } = setup(synth.clone(), config);

    let mut handles = Vec::new();
    for i in 0..64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut req = request(&format!("billing migration rollback plan, variant {}", i));
            req.client_key = format!("10.0.1.{}", i);
            engine.suggest(req).await
        }));
    }

    let mut shed = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        if response.debug.and_then(|d| d.overloaded) == Some(true) {
            assert_eq!(response.serving_tier, Some(ServingTier::Retrieval));
            shed += 1;
        }
    }

    assert_eq!(synth.peak.load(Ordering::SeqCst), 1);
    assert!(synth.calls.load(Ordering::SeqCst) >= 1);
    assert!(shed > 0);
    assert_eq!(engine.stats().inflight_synthesis, 0);
}

#[tokio::test]
async fn test_cache_evicts_oldest_writes() {
    let config = EngineConfig {
        max_cache_entries: 2,
        ..EngineConfig::default()
    };
    let Setup { engine, clock } = setup(Arc::new(DisabledSynthesizer), config);
    let drafts = [
        "billing migration rollback",
        "billing dual-write cutover",
        "billing postgres cluster",
        "billing invoices backfill",
        "billing migration deploy window",
    ];
    for draft in &drafts[..4] {
        engine.suggest(request(draft)).await;
        clock.advance(1);
    }
    // Pruning runs before each insert, so the cache holds at most one
    // entry over the cap.
    assert_eq!(engine.stats().cache_size, 3);

    // This computation prunes down to the cap, then inserts.
    engine.suggest(request(drafts[4])).await;
    clock.advance(1);
    assert!(engine.stats().cache_size <= 3);

    let newest = engine.suggest(request(drafts[4])).await;
    assert_eq!(newest.serving_tier, Some(ServingTier::Cache));
    let previous = engine.suggest(request(drafts[3])).await;
    assert_eq!(previous.serving_tier, Some(ServingTier::Cache));

    let second_oldest = engine.suggest(request(drafts[1])).await;
    assert_eq!(second_oldest.serving_tier, Some(ServingTier::Retrieval));
    let oldest = engine.suggest(request(drafts[0])).await;
    assert_eq!(oldest.serving_tier, Some(ServingTier::Retrieval));
    assert!(engine.stats().cache_size <= 3);
}

#[tokio::test]
async fn test_incoming_lookup_prefers_non_user_sources() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    let mut req = request("jordan asked about the billing migration sign-off");
    req.recipient_id = "user-jordan".to_string();
    req.mode = ContextMode::IncomingLookup;

    let response = engine.suggest(req).await;
    let sources = response.sources.unwrap();
    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s.kind != ItemKind::User));
}

/// A corpus whose listing takes a while, like a remote loader.
struct SlowCorpus {
    inner: StaticCorpus,
    delay: Duration,
}

impl Corpus for SlowCorpus {
    fn list_items(&self) -> Vec<Arc<KnowledgeItem>> {
        std::thread::sleep(self.delay);
        self.inner.list_items()
    }

    fn get_item(&self, id: &str) -> Option<Arc<KnowledgeItem>> {
        self.inner.get_item(id)
    }
}

#[tokio::test]
async fn test_index_build_leaves_runtime_free() {
    let data = dataset();
    let corpus = SlowCorpus {
        inner: StaticCorpus::new(data.items),
        delay: Duration::from_millis(200),
    };
    let engine = ContextEngine::new(
        Arc::new(corpus),
        data.directory,
        Arc::new(DisabledSynthesizer),
        EngineOptions::default(),
    );

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let response = engine.suggest(request("billing migration rollback")).await;
    ticker.abort();

    assert_eq!(source_ids(&response)[0], "proj-billing-migration");
    assert!(ticks.load(Ordering::SeqCst) >= 5);
    assert_eq!(engine.stats().index_builds, 1);
}

#[tokio::test]
async fn test_invalidate_rebuilds_index_and_clears_cache() {
    let Setup { engine, .. } = setup(Arc::new(DisabledSynthesizer), EngineConfig::default());
    engine.suggest(request("billing migration rollback")).await;
    let before = engine.stats();
    assert_eq!(before.index_builds, 1);
    assert_eq!(before.cache_size, 1);
    let digest = before.index.unwrap().digest;

    engine.invalidate();
    assert_eq!(engine.stats().cache_size, 0);
    assert!(engine.stats().index.is_none());

    let response = engine.suggest(request("billing migration rollback")).await;
    assert_eq!(response.serving_tier, Some(ServingTier::Retrieval));
    let after = engine.stats();
    assert_eq!(after.index_builds, 2);
    assert_eq!(after.index.unwrap().digest, digest);
}

#[tokio::test]
async fn test_ranking_is_deterministic() {
    let first = setup(Arc::new(DisabledSynthesizer), EngineConfig::default())
        .engine
        .suggest(request("billing migration postgres"))
        .await;
    let second = setup(Arc::new(DisabledSynthesizer), EngineConfig::default())
        .engine
        .suggest(request("billing migration postgres"))
        .await;
    assert_eq!(first, second);
}

#[test]
fn test_fixture_skips_malformed_item() {
    let data = dataset();
    assert_eq!(data.skipped, 1);
    assert!(data.items.iter().all(|i| i.id != "broken-item"));
}

//! End-to-end engine tests.
//!
//! Drives the full plan → execute → evaluate → synthesize cycle against a
//! routed mock oracle that answers each phase by inspecting its prompt, and
//! exercises the background queue through the service facade.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use veridex_core::{ProviderDescriptor, VeridexResult};
use veridex_engine::{QueryExecutor, ResearchConfig, ResearchEngine, ResearchQueue, ResearchService};
use veridex_oracle::{OracleBackend, OracleReply, OracleRequest, RetryPolicy};

// ---------------------------------------------------------------------------
// Routed mock oracle — answers per phase based on the prompt contents
// ---------------------------------------------------------------------------

struct RoutedOracle {
    eval_calls: AtomicU32,
    /// The evaluator asks to stop starting with this call number.
    stop_after: u32,
    /// Provider key the planner requests for its queries.
    requested_provider: &'static str,
}

impl RoutedOracle {
    fn new(stop_after: u32, requested_provider: &'static str) -> Arc<Self> {
        Arc::new(Self {
            eval_calls: AtomicU32::new(0),
            stop_after,
            requested_provider,
        })
    }
}

#[async_trait]
impl OracleBackend for RoutedOracle {
    async fn chat(&self, request: &OracleRequest) -> VeridexResult<OracleReply> {
        let prompt = &request.message;

        if prompt.contains("Propose up to") {
            return Ok(OracleReply {
                content: format!(
                    r#"```json
{{"queries": [
    {{"text": "primary evidence", "focus": "primary", "provider": "{p}"}},
    {{"text": "counter evidence", "focus": "counter", "provider": "{p}"}}
], "rationale": "cover both sides"}}
```"#,
                    p = self.requested_provider
                ),
                sources: vec![],
            });
        }

        if prompt.contains("sufficient") {
            let call = self.eval_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let stop = call >= self.stop_after;
            return Ok(OracleReply {
                content: format!(
                    r#"{{"should_stop": {stop}, "reason": "round {call} verdict", "confidence": 0.8}}"#
                ),
                sources: vec![],
            });
        }

        if prompt.contains("Synthesize") {
            return Ok(OracleReply {
                content: r#"{"summary": "the claim is supported", "key_findings": ["two independent confirmations"], "conclusion": "supported", "confidence": 0.8}"#.to_string(),
                sources: vec![],
            });
        }

        // A search-backed answer for an executed query.
        Ok(OracleReply {
            content: format!("evidence for: {}", prompt),
            sources: vec![
                "https://evidence.example/a".to_string(),
                "https://Evidence.example/a/".to_string(),
                "https://evidence.example/b".to_string(),
            ],
        })
    }
}

fn build_engine(
    oracle: Arc<dyn OracleBackend>,
    providers: Vec<ProviderDescriptor>,
    mutate: impl FnOnce(&mut ResearchConfig),
) -> Arc<ResearchEngine> {
    let mut config = ResearchConfig::default();
    config.providers = providers;
    config.fast_provider = "fast".to_string();
    config.retry = RetryPolicy {
        max_attempts: 1,
        backoff_ms: 0,
    };
    config.round_timeout_ms = 10_000;
    mutate(&mut config);
    let config = Arc::new(config);
    let executor = QueryExecutor::new(oracle.clone(), config.clone());
    Arc::new(ResearchEngine::new(oracle, executor, config))
}

fn enabled_provider(key: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        key: key.to_string(),
        label: key.to_string(),
        model_id: format!("model-{key}"),
        enabled: true,
    }
}

fn disabled_provider(key: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        enabled: false,
        ..enabled_provider(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_cycle_runs_two_rounds_and_synthesizes() {
    let oracle = RoutedOracle::new(2, "thorough");
    let engine = build_engine(
        oracle,
        vec![enabled_provider("thorough")],
        |c| c.max_iterations = 3,
    );

    let (report, history) = engine.run_with_history("the claim under test").await;

    // The evaluator declined to stop once, then stopped.
    assert_eq!(history.len(), 2);
    assert_eq!(report.rounds, 2);

    // One finding per planned query; no fast provider, so no supplementals.
    for round in &history {
        assert_eq!(round.findings.len(), round.plan.queries.len());
        assert!(round.findings.iter().all(|f| !f.failed));
    }

    // Sources are deduplicated across rounds and URL-normalized.
    assert_eq!(report.sources.len(), 2);

    assert_eq!(report.summary, "the claim is supported");
    assert_eq!(report.confidence, 0.8);
    assert!((0.0..=1.0).contains(&report.confidence));
}

#[tokio::test]
async fn disabled_requested_provider_is_substituted_not_failed() {
    // The planner keeps requesting "offline", which is disabled; queries
    // must run under the first enabled provider instead.
    let oracle = RoutedOracle::new(1, "offline");
    let engine = build_engine(
        oracle,
        vec![disabled_provider("offline"), enabled_provider("thorough")],
        |c| c.max_iterations = 1,
    );

    let (_, history) = engine.run_with_history("claim").await;
    assert_eq!(history.len(), 1);
    for finding in &history[0].findings {
        assert!(!finding.failed);
        assert_eq!(finding.source, "thorough");
    }
}

#[tokio::test]
async fn all_providers_disabled_still_yields_a_report() {
    let oracle = RoutedOracle::new(1, "any");
    let engine = build_engine(
        oracle,
        vec![disabled_provider("thorough")],
        |c| c.max_iterations = 2,
    );

    let (report, history) = engine.run_with_history("claim").await;

    // Planning, evaluation, and synthesis all degrade to local fallbacks;
    // each round carries the synthetic per-query failure.
    assert_eq!(history.len(), 2);
    for round in &history {
        assert!(round.findings.iter().all(|f| f.failed));
    }
    assert_eq!(report.confidence, 0.0);
    assert!(report.conclusion.contains("No usable evidence"));
}

#[tokio::test]
async fn confidence_stays_clamped_through_the_full_pipeline() {
    struct WildConfidenceOracle;

    #[async_trait]
    impl OracleBackend for WildConfidenceOracle {
        async fn chat(&self, request: &OracleRequest) -> VeridexResult<OracleReply> {
            let prompt = &request.message;
            let content = if prompt.contains("Propose up to") {
                r#"{"queries": [{"text": "q", "focus": "f"}], "rationale": "r"}"#.to_string()
            } else if prompt.contains("sufficient") {
                // A nonsense confidence the evaluator parser must coerce.
                r#"{"should_stop": true, "reason": "done", "confidence": "high"}"#.to_string()
            } else if prompt.contains("Synthesize") {
                r#"{"summary": "s", "conclusion": "c", "confidence": 17}"#.to_string()
            } else {
                "evidence".to_string()
            };
            Ok(OracleReply {
                content,
                sources: vec![],
            })
        }
    }

    let engine = build_engine(
        Arc::new(WildConfidenceOracle),
        vec![enabled_provider("thorough")],
        |c| c.max_iterations = 1,
    );

    let (report, history) = engine.run_with_history("claim").await;
    assert_eq!(history[0].evaluation.confidence, 0.9); // "high"
    assert_eq!(report.confidence, 1.0); // 17 clamped
}

#[tokio::test]
async fn service_runs_background_task_through_the_queue() {
    let oracle = RoutedOracle::new(1, "thorough");
    let engine = build_engine(
        oracle,
        vec![enabled_provider("thorough")],
        |c| c.max_iterations = 1,
    );
    let queue = ResearchQueue::new(engine.clone(), None);
    let service = ResearchService::new(engine, queue);

    let submitted = service.submit("background claim").await;
    assert!(submitted.starts_with("submitted research task "));
    let id = submitted.rsplit(' ').next().unwrap().to_string();

    let mut result = String::new();
    for _ in 0..300 {
        result = service.result(&id).await;
        if result != "not yet complete" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert!(
        result.contains("Summary: the claim is supported"),
        "unexpected result: {result}"
    );
    let status = service.status(&id).await;
    assert!(status.starts_with("succeeded"), "unexpected status: {status}");
}

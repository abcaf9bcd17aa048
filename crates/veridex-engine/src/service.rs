use crate::engine::ResearchEngine;
use crate::fanout::{gather, FanoutPolicy, ProviderTask};
use crate::queue::ResearchQueue;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use veridex_core::{truncate_chars, Finding, Report, TaskStatus, SNIPPET_MAX_CHARS};
use veridex_oracle::OracleRequest;

const QUICK_CHECK_TARGET: usize = 2;
const QUICK_CHECK_CONFIDENCE: f64 = 0.6;

/// The outward-facing surface of the engine.
///
/// Every operation is total: whatever fails underneath, the caller gets a
/// formatted string back, never an error.
pub struct ResearchService {
    engine: Arc<ResearchEngine>,
    queue: ResearchQueue,
}

impl ResearchService {
    /// Creates the service over an engine and its queue.
    pub fn new(engine: Arc<ResearchEngine>, queue: ResearchQueue) -> Self {
        Self { engine, queue }
    }

    /// Runs the full synchronous research cycle and formats the report.
    pub async fn investigate(&self, claim: &str) -> String {
        let report = self.engine.run(claim).await;
        render_report(&report)
    }

    /// Fans one question out across every enabled provider and returns
    /// whatever settled within the budget.
    pub async fn quick_check(&self, claim: &str) -> String {
        let claim = claim.trim();
        if claim.is_empty() {
            return "No claim was provided.".to_string();
        }

        let config = self.engine.config();
        let oracle = self.engine.oracle();
        let tasks: Vec<ProviderTask> = config
            .providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| {
                let oracle = oracle.clone();
                let request = OracleRequest::new(&p.model_id, claim).with_search();
                let key = p.key.clone();
                let source = key.clone();
                let task: ProviderTask = (
                    key,
                    Box::pin(async move {
                        match oracle.chat(&request).await {
                            Ok(reply) => Finding::new(
                                source,
                                "quick-check",
                                reply.content,
                                reply.sources,
                                QUICK_CHECK_CONFIDENCE,
                            ),
                            Err(e) => Finding::failure(source, "quick-check", e.to_string()),
                        }
                    }),
                );
                task
            })
            .collect();

        if tasks.is_empty() {
            return "Every search provider is disabled; cannot run a quick check.".to_string();
        }

        let policy = FanoutPolicy {
            min_success: QUICK_CHECK_TARGET.min(tasks.len()),
            max_wait_ms: config.round_timeout_ms,
        };
        info!(providers = tasks.len(), "Service: quick check");
        let results = gather(tasks, policy).await;

        if results.is_empty() {
            return "No provider answered within the time budget.".to_string();
        }

        let mut out = String::from("Quick check results:\n");
        for finding in &results {
            out.push_str(&format!(
                "- [{}] {}\n",
                finding.source,
                truncate_chars(&finding.findings, SNIPPET_MAX_CHARS)
            ));
        }
        out
    }

    /// Submits a claim for background research; returns the task id or the
    /// capacity rejection as text.
    pub async fn submit(&self, claim: &str) -> String {
        match self.queue.submit(claim).await {
            Ok(id) => format!("submitted research task {id}"),
            Err(e) => e.to_string(),
        }
    }

    /// Current status of a background task.
    pub async fn status(&self, task_id: &str) -> String {
        let Ok(id) = Uuid::parse_str(task_id.trim()) else {
            return format!("invalid task id: {task_id}");
        };
        match self.queue.status(id).await {
            Some(task) => format!(
                "{} — {:.1}s elapsed",
                task.status,
                task.elapsed_ms() as f64 / 1000.0
            ),
            None => "task not found".to_string(),
        }
    }

    /// Result of a background task: the formatted report, the formatted
    /// failure, "expired", or "not yet complete".
    pub async fn result(&self, task_id: &str) -> String {
        let Ok(id) = Uuid::parse_str(task_id.trim()) else {
            return format!("invalid task id: {task_id}");
        };
        let Some(task) = self.queue.status(id).await else {
            return "task not found".to_string();
        };
        match task.status {
            TaskStatus::Succeeded => task
                .report
                .as_ref()
                .map_or("report missing".to_string(), render_report),
            TaskStatus::Failed => format!(
                "research failed: {}",
                task.error.as_deref().unwrap_or("unknown error")
            ),
            TaskStatus::Expired => "task expired".to_string(),
            TaskStatus::Queued | TaskStatus::Running => "not yet complete".to_string(),
        }
    }
}

/// Renders a report as plain text.
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("Summary: {}\n", report.summary));
    out.push_str(&format!(
        "Confidence: {:.0}% over {} round(s)\n",
        report.confidence * 100.0,
        report.rounds
    ));

    if !report.key_findings.is_empty() {
        out.push_str("\nKey findings:\n");
        for finding in &report.key_findings {
            out.push_str(&format!("- {finding}\n"));
        }
    }

    if !report.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &report.sources {
            out.push_str(&format!("- {source}\n"));
        }
    }

    out.push_str(&format!("\nConclusion: {}\n", report.conclusion));
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::executor::QueryExecutor;
    use async_trait::async_trait;
    use veridex_core::{ProviderDescriptor, VeridexResult};
    use veridex_oracle::{OracleBackend, OracleReply};

    struct EchoOracle;

    #[async_trait]
    impl OracleBackend for EchoOracle {
        async fn chat(&self, request: &OracleRequest) -> VeridexResult<OracleReply> {
            Ok(OracleReply {
                content: format!("answer from {}", request.model_id),
                sources: vec![],
            })
        }
    }

    fn service(mutate: impl FnOnce(&mut ResearchConfig)) -> ResearchService {
        let mut config = ResearchConfig::default();
        config.max_iterations = 1;
        config.round_timeout_ms = 5_000;
        mutate(&mut config);
        let config = Arc::new(config);
        let oracle = Arc::new(EchoOracle);
        let executor = QueryExecutor::new(oracle.clone() as Arc<dyn OracleBackend>, config.clone());
        let engine = Arc::new(ResearchEngine::new(oracle, executor, config));
        let queue = ResearchQueue::new(engine.clone(), None);
        ResearchService::new(engine, queue)
    }

    fn provider(key: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            key: key.to_string(),
            label: key.to_string(),
            model_id: format!("model-{key}"),
            enabled: true,
        }
    }

    #[test]
    fn render_report_includes_all_sections() {
        let report = Report {
            summary: "it holds".to_string(),
            key_findings: vec!["evidence one".to_string()],
            sources: vec!["https://a.com".to_string()],
            confidence: 0.72,
            conclusion: "verified".to_string(),
            rounds: 2,
        };
        let text = render_report(&report);
        assert!(text.contains("Summary: it holds"));
        assert!(text.contains("72%"));
        assert!(text.contains("2 round(s)"));
        assert!(text.contains("- evidence one"));
        assert!(text.contains("- https://a.com"));
        assert!(text.contains("Conclusion: verified"));
    }

    #[test]
    fn render_report_omits_empty_sections() {
        let report = Report {
            summary: "nothing".to_string(),
            key_findings: vec![],
            sources: vec![],
            confidence: 0.0,
            conclusion: "unverified".to_string(),
            rounds: 0,
        };
        let text = render_report(&report);
        assert!(!text.contains("Key findings"));
        assert!(!text.contains("Sources"));
    }

    #[tokio::test]
    async fn investigate_returns_formatted_text_for_any_input() {
        let service = service(|_| {});
        let text = service.investigate("").await;
        assert!(text.contains("Confidence: 0%"));

        let text = service.investigate("some claim").await;
        assert!(text.contains("Summary:"));
    }

    #[tokio::test]
    async fn quick_check_gathers_from_enabled_providers() {
        let service = service(|c| {
            c.providers = vec![provider("one"), provider("two")];
        });
        let text = service.quick_check("is it so").await;
        assert!(text.contains("Quick check results"));
        assert!(text.contains("answer from model-"));
    }

    #[tokio::test]
    async fn quick_check_with_no_providers_is_a_named_condition() {
        let service = service(|_| {});
        let text = service.quick_check("is it so").await;
        assert!(text.contains("disabled"));
    }

    #[tokio::test]
    async fn task_verbs_round_trip() {
        let service = service(|_| {});
        let submitted = service.submit("background claim").await;
        let id = submitted.rsplit(' ').next().unwrap().to_string();

        // Status is a recognizable lifecycle word.
        let status = service.status(&id).await;
        assert!(
            status.starts_with("queued")
                || status.starts_with("running")
                || status.starts_with("succeeded"),
            "unexpected status: {status}"
        );

        // Eventually the result is a rendered report.
        for _ in 0..200 {
            let result = service.result(&id).await;
            if result.contains("Summary:") {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("task never produced a report");
    }

    #[tokio::test]
    async fn bogus_task_ids_are_handled_as_text() {
        let service = service(|_| {});
        assert!(service.status("not-a-uuid").await.contains("invalid task id"));
        assert!(service
            .result(&Uuid::new_v4().to_string())
            .await
            .contains("task not found"));
    }
}

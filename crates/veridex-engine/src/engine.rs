use crate::config::ResearchConfig;
use crate::deadline::with_deadline;
use crate::executor::QueryExecutor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use veridex_core::{
    confidence_from_value, dedup_sources, extract_json, truncate_chars, Evaluation, Finding,
    Report, Round, RoundPlan, SearchQuery, VeridexResult, MAX_KEY_FINDINGS, SNIPPET_MAX_CHARS,
};
use veridex_oracle::{call_with_retry, resolve_provider, OracleBackend, OracleReply, OracleRequest};

const PLANNER_SYSTEM: &str =
    "You are a research planner. Always reply with a single JSON object and nothing else.";
const HISTORY_SNIPPET_CHARS: usize = 300;

/// The iterative round controller: plan → execute → evaluate → repeat →
/// synthesize.
///
/// `run` never errors. Oracle failures are retried and then degrade: a
/// failed round forces convergence with a synthetic terminal round, and a
/// failed synthesis falls back to deterministic local aggregation.
pub struct ResearchEngine {
    oracle: Arc<dyn OracleBackend>,
    executor: QueryExecutor,
    config: Arc<ResearchConfig>,
}

impl ResearchEngine {
    /// Creates an engine over the given oracle and executor.
    pub fn new(
        oracle: Arc<dyn OracleBackend>,
        executor: QueryExecutor,
        config: Arc<ResearchConfig>,
    ) -> Self {
        Self {
            oracle,
            executor,
            config,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// The oracle backend this engine drives.
    pub fn oracle(&self) -> Arc<dyn OracleBackend> {
        self.oracle.clone()
    }

    /// Runs the full research cycle for a claim and returns the report.
    pub async fn run(&self, claim: &str) -> Report {
        self.run_with_history(claim).await.0
    }

    /// Runs the full cycle, also returning the round history.
    pub async fn run_with_history(&self, claim: &str) -> (Report, Vec<Round>) {
        let claim = claim.trim();
        if claim.is_empty() {
            return (empty_claim_report(), Vec::new());
        }

        info!(claim, "Engine: starting research run");
        let mut history: Vec<Round> = Vec::new();

        for index in 0..self.config.max_iterations {
            let started = Instant::now();
            let outcome = with_deadline(
                self.run_round(claim, index, &history),
                Duration::from_millis(self.config.round_timeout_ms),
                "research round",
            )
            .await;

            match outcome {
                Ok(mut round) => {
                    round.elapsed_ms = started.elapsed().as_millis() as u64;
                    let requested_stop = round.evaluation.should_stop;
                    info!(
                        round = index,
                        queries = round.plan.queries.len(),
                        stop = requested_stop,
                        confidence = round.evaluation.confidence,
                        "Engine: round complete"
                    );
                    history.push(round);

                    if requested_stop {
                        if self.gates_met(&history) {
                            break;
                        }
                        // Named condition: the oracle asked to stop but a
                        // configured hard gate is unmet, so iteration
                        // continues best-effort.
                        info!(round = index, "Engine: stop gated, continuing");
                    }
                }
                Err(e) => {
                    warn!(round = index, error = %e, "Engine: round failed, forcing convergence");
                    history.push(failed_round(
                        claim,
                        index,
                        &e,
                        started.elapsed().as_millis() as u64,
                    ));
                    break;
                }
            }
        }

        let report = self.synthesize(claim, &history).await;
        info!(
            rounds = history.len(),
            confidence = report.confidence,
            "Engine: research run complete"
        );
        (report, history)
    }

    /// One plan → execute → evaluate cycle. Errors here are round failures.
    async fn run_round(
        &self,
        claim: &str,
        index: usize,
        history: &[Round],
    ) -> VeridexResult<Round> {
        let plan = self.plan(claim, history).await?;
        let findings = self.executor.execute_plan(&plan).await;
        let evaluation = self.evaluate(claim, index, history, &plan, &findings).await?;
        Ok(Round {
            index,
            plan,
            findings,
            evaluation,
            elapsed_ms: 0,
        })
    }

    /// Asks the oracle for a plan; parse failures fall back to verifying
    /// the whole claim directly. Oracle exhaustion propagates.
    async fn plan(&self, claim: &str, history: &[Round]) -> VeridexResult<RoundPlan> {
        let Some(provider) = resolve_provider(None, &self.config.providers) else {
            return Ok(fallback_plan(claim));
        };

        let prompt = format!(
            "Claim under investigation:\n{claim}\n\n{}Propose up to {} search queries \
             for the next research round. Reply with JSON: {{\"queries\": [{{\"text\": \"...\", \
             \"focus\": \"...\", \"provider\": \"...\", \"backend\": \"...\"}}], \
             \"rationale\": \"...\"}}",
            render_history(history),
            self.config.max_queries_per_round,
        );
        let reply = self.ask(&provider.model_id, &prompt, "plan").await?;
        Ok(parse_plan(
            &reply.content,
            claim,
            self.config.max_queries_per_round,
        ))
    }

    /// Asks the oracle whether the evidence is sufficient. The preview
    /// history includes the current unfinished round under a placeholder
    /// evaluation. Parse failures fall back; oracle exhaustion propagates.
    async fn evaluate(
        &self,
        claim: &str,
        index: usize,
        history: &[Round],
        plan: &RoundPlan,
        findings: &[Finding],
    ) -> VeridexResult<Evaluation> {
        let Some(provider) = resolve_provider(None, &self.config.providers) else {
            return Ok(fallback_evaluation(findings));
        };

        let mut preview = history.to_vec();
        preview.push(Round {
            index,
            plan: plan.clone(),
            findings: findings.to_vec(),
            evaluation: Evaluation::placeholder(),
            elapsed_ms: 0,
        });

        let prompt = format!(
            "Claim under investigation:\n{claim}\n\n{}Is the gathered evidence sufficient \
             to settle the claim? Reply with JSON: {{\"should_stop\": true|false, \
             \"reason\": \"...\", \"confidence\": 0.0-1.0, \"gaps\": [\"...\"]}}",
            render_history(&preview),
        );
        let reply = self.ask(&provider.model_id, &prompt, "evaluate").await?;
        Ok(parse_evaluation(&reply.content, findings))
    }

    /// Produces the final report. Never errors: oracle or parse failure
    /// falls back to deterministic local aggregation.
    async fn synthesize(&self, claim: &str, history: &[Round]) -> Report {
        if let Some(provider) = resolve_provider(None, &self.config.providers) {
            let prompt = format!(
                "Claim under investigation:\n{claim}\n\n{}Synthesize a final report. \
                 Reply with JSON: {{\"summary\": \"...\", \"key_findings\": [\"...\"], \
                 \"conclusion\": \"...\", \"confidence\": 0.0-1.0}}",
                render_history(history),
            );
            match self.ask(&provider.model_id, &prompt, "synthesize").await {
                Ok(reply) => {
                    if let Some(value) = extract_json(&reply.content) {
                        return report_from_value(&value, history);
                    }
                    warn!("Engine: synthesis reply unparsable, using local aggregation");
                }
                Err(e) => {
                    warn!(error = %e, "Engine: synthesis failed, using local aggregation");
                }
            }
        }
        local_aggregate(history)
    }

    /// One retried oracle call with the planner system prompt.
    async fn ask(&self, model_id: &str, prompt: &str, label: &str) -> VeridexResult<OracleReply> {
        let request = OracleRequest::new(model_id, prompt).with_system(PLANNER_SYSTEM);
        let oracle = &self.oracle;
        call_with_retry(&self.config.retry, label, || oracle.chat(&request)).await
    }

    /// Whether the configured hard stop gates are satisfied. The oracle's
    /// stop request is necessary but not sufficient: either unmet gate
    /// vetoes it.
    fn gates_met(&self, history: &[Round]) -> bool {
        if let Some(min) = self.config.min_confidence {
            let confidence = history.last().map_or(0.0, |r| r.evaluation.confidence);
            if confidence < min {
                return false;
            }
        }
        if let Some(min) = self.config.min_sources {
            if all_sources(history).len() < min {
                return false;
            }
        }
        true
    }
}

// --- Fallback builders and local aggregation ---

/// Report for a blank claim: zero rounds, zero confidence, no oracle call.
fn empty_claim_report() -> Report {
    Report {
        summary: "No claim was provided; nothing to research.".to_string(),
        key_findings: Vec::new(),
        sources: Vec::new(),
        confidence: 0.0,
        conclusion: "The claim was empty, so no evidence was gathered.".to_string(),
        rounds: 0,
    }
}

/// Fallback plan: verify the whole claim as one query.
fn fallback_plan(claim: &str) -> RoundPlan {
    RoundPlan {
        queries: vec![SearchQuery::new(claim, "verification")],
        rationale: "fallback: verify the whole claim directly".to_string(),
    }
}

/// Fallback evaluation when the oracle's verdict is unparsable: keep
/// iterating, with confidence taken from the round's own findings.
fn fallback_evaluation(findings: &[Finding]) -> Evaluation {
    Evaluation {
        should_stop: false,
        reason: "evaluation unparsable, continuing".to_string(),
        confidence: mean_confidence(findings),
        gaps: Vec::new(),
    }
}

/// Synthetic terminal round appended when a round fails or times out.
fn failed_round(claim: &str, index: usize, error: &veridex_core::VeridexError, elapsed_ms: u64) -> Round {
    Round {
        index,
        plan: RoundPlan {
            queries: vec![SearchQuery::new(claim, "verification")],
            rationale: "round failed, default convergence".to_string(),
        },
        findings: vec![Finding::failure("engine", "round", error.to_string())],
        evaluation: Evaluation {
            should_stop: true,
            reason: "round failed, forcing stop".to_string(),
            confidence: 0.0,
            gaps: Vec::new(),
        },
        elapsed_ms,
    }
}

/// Parses a plan out of oracle free text, with its dedicated fallback.
fn parse_plan(text: &str, claim: &str, max_queries: usize) -> RoundPlan {
    let Some(value) = extract_json(text) else {
        return fallback_plan(claim);
    };

    let queries: Vec<SearchQuery> = value["queries"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let text = item["text"]
                        .as_str()
                        .or_else(|| item["query"].as_str())?
                        .trim();
                    if text.is_empty() {
                        return None;
                    }
                    let mut q = SearchQuery::new(
                        text,
                        item["focus"].as_str().unwrap_or("general"),
                    );
                    if let Some(p) = item["provider"].as_str() {
                        q = q.with_provider(p);
                    }
                    if let Some(b) = item["backend"].as_str() {
                        q = q.with_backend(b);
                    }
                    let args = &item["args"];
                    if !args.is_null() {
                        q = q.with_backend_args(args.clone());
                    }
                    Some(q)
                })
                .take(max_queries)
                .collect()
        })
        .unwrap_or_default();

    if queries.is_empty() {
        return fallback_plan(claim);
    }

    RoundPlan {
        queries,
        rationale: value["rationale"]
            .as_str()
            .unwrap_or("no rationale given")
            .to_string(),
    }
}

/// Parses an evaluation out of oracle free text, with its dedicated
/// fallback. Loose confidence values are coerced and clamped.
fn parse_evaluation(text: &str, findings: &[Finding]) -> Evaluation {
    let Some(value) = extract_json(text) else {
        return fallback_evaluation(findings);
    };

    Evaluation {
        should_stop: value["should_stop"].as_bool().unwrap_or(false),
        reason: value["reason"]
            .as_str()
            .unwrap_or("no reason given")
            .to_string(),
        confidence: confidence_from_value(value.get("confidence"), mean_confidence(findings)),
        gaps: value["gaps"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|g| g.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Builds a report from a parsed synthesis value. Sources always come from
/// the history itself, deduplicated; missing fields fall back to local
/// aggregation values.
fn report_from_value(value: &serde_json::Value, history: &[Round]) -> Report {
    let local = local_aggregate(history);

    let key_findings: Vec<String> = value["key_findings"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|k| k.as_str())
                .filter(|k| !k.trim().is_empty())
                .take(MAX_KEY_FINDINGS)
                .map(|k| truncate_chars(k, SNIPPET_MAX_CHARS))
                .collect()
        })
        .unwrap_or_default();

    Report {
        summary: value["summary"]
            .as_str()
            .map_or(local.summary.clone(), str::to_string),
        key_findings: if key_findings.is_empty() {
            local.key_findings.clone()
        } else {
            key_findings
        },
        sources: local.sources.clone(),
        confidence: confidence_from_value(value.get("confidence"), local.confidence),
        conclusion: value["conclusion"]
            .as_str()
            .map_or(local.conclusion, str::to_string),
        rounds: history.len(),
    }
}

/// Deterministic local aggregation used when synthesis fails entirely.
fn local_aggregate(history: &[Round]) -> Report {
    let sources = all_sources(history);

    let key_findings: Vec<String> = history
        .iter()
        .flat_map(|r| r.findings.iter())
        .filter(|f| !f.failed && !f.findings.trim().is_empty())
        .take(MAX_KEY_FINDINGS)
        .map(|f| truncate_chars(&f.findings, SNIPPET_MAX_CHARS))
        .collect();

    let confidence = mean_confidence(
        &history
            .iter()
            .flat_map(|r| r.findings.iter())
            .cloned()
            .collect::<Vec<_>>(),
    );

    let gathered = !key_findings.is_empty() || !sources.is_empty();
    let conclusion = if gathered {
        "Evidence was gathered; see the key findings and sources above.".to_string()
    } else {
        "No usable evidence was gathered; the claim remains unverified.".to_string()
    };

    Report {
        summary: format!(
            "Research completed after {} round(s) with {} distinct source(s).",
            history.len(),
            sources.len()
        ),
        key_findings,
        sources,
        confidence,
        conclusion,
        rounds: history.len(),
    }
}

/// Mean confidence of non-failed findings, clamped; 0 when there are none.
fn mean_confidence(findings: &[Finding]) -> f64 {
    let usable: Vec<f64> = findings
        .iter()
        .filter(|f| !f.failed)
        .map(|f| f.confidence)
        .collect();
    if usable.is_empty() {
        0.0
    } else {
        veridex_core::clamp_confidence(usable.iter().sum::<f64>() / usable.len() as f64)
    }
}

/// Distinct normalized sources across all rounds.
fn all_sources(history: &[Round]) -> Vec<String> {
    dedup_sources(
        history
            .iter()
            .flat_map(|r| r.findings.iter())
            .flat_map(|f| f.sources.iter()),
    )
}

/// Renders prior rounds for oracle prompts.
fn render_history(history: &[Round]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut out = String::from("Prior research rounds:\n");
    for round in history {
        out.push_str(&format!(
            "Round {} ({}):\n",
            round.index + 1,
            round.plan.rationale
        ));
        for finding in &round.findings {
            if finding.failed {
                out.push_str(&format!(
                    "- [{}] FAILED: {}\n",
                    finding.source,
                    finding.error.as_deref().unwrap_or("unknown error")
                ));
            } else {
                out.push_str(&format!(
                    "- [{}] {}\n",
                    finding.source,
                    truncate_chars(&finding.findings, HISTORY_SNIPPET_CHARS)
                ));
            }
        }
        out.push_str(&format!(
            "Evaluation: {} (confidence {:.2})\n",
            round.evaluation.reason, round.evaluation.confidence
        ));
    }
    out.push('\n');
    out
}

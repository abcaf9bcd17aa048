use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a key-finding snippet in a [`Report`].
pub const SNIPPET_MAX_CHARS: usize = 220;

/// Maximum number of key findings carried by a [`Report`].
pub const MAX_KEY_FINDINGS: usize = 5;

/// One search query produced by the planner. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The query text handed to whichever backend answers it.
    pub text: String,
    /// Short label describing the angle this query investigates.
    pub focus: String,
    /// Provider the planner would prefer to answer this query.
    #[serde(default)]
    pub provider: Option<String>,
    /// Explicit backend routing hint (e.g. "retrieval", "fetch", "search").
    #[serde(default)]
    pub backend: Option<String>,
    /// Backend-specific arguments (e.g. a target `url` for page fetch).
    #[serde(default)]
    pub backend_args: serde_json::Value,
}

impl SearchQuery {
    /// Creates a plain query with no routing hints.
    pub fn new(text: impl Into<String>, focus: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            focus: focus.into(),
            provider: None,
            backend: None,
            backend_args: serde_json::Value::Null,
        }
    }

    /// Sets the preferred provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the backend routing hint.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Sets backend-specific arguments.
    pub fn with_backend_args(mut self, args: serde_json::Value) -> Self {
        self.backend_args = args;
        self
    }
}

/// The outcome of executing one query. Produced even on failure — a query
/// never disappears silently from a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Identity of whatever answered the query (provider key, backend name).
    pub source: String,
    /// The perspective label, carried over from the query focus.
    pub perspective: String,
    /// The findings text.
    pub findings: String,
    /// Source URLs backing the findings.
    pub sources: Vec<String>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Whether execution failed.
    pub failed: bool,
    /// Error text when `failed` is set.
    #[serde(default)]
    pub error: Option<String>,
}

impl Finding {
    /// Creates a successful finding; confidence is clamped on construction.
    pub fn new(
        source: impl Into<String>,
        perspective: impl Into<String>,
        findings: impl Into<String>,
        sources: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self {
            source: source.into(),
            perspective: perspective.into(),
            findings: findings.into(),
            sources,
            confidence: clamp_confidence(confidence),
            failed: false,
            error: None,
        }
    }

    /// Creates a synthetic failure finding carrying the error text.
    pub fn failure(
        source: impl Into<String>,
        perspective: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            source: source.into(),
            perspective: perspective.into(),
            findings: String::new(),
            sources: Vec::new(),
            confidence: 0.0,
            failed: true,
            error: Some(error),
        }
    }
}

/// The planner's output for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPlan {
    /// Queries to execute this round. Never empty.
    pub queries: Vec<SearchQuery>,
    /// The planner's stated rationale.
    pub rationale: String,
}

/// The evaluator's verdict on the evidence gathered so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the oracle considers the evidence sufficient.
    pub should_stop: bool,
    /// The evaluator's stated reason.
    pub reason: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Remaining evidence gaps, if any were named.
    #[serde(default)]
    pub gaps: Vec<String>,
}

impl Evaluation {
    /// Placeholder evaluation used while the current round is still open.
    pub fn placeholder() -> Self {
        Self {
            should_stop: false,
            reason: "evaluation pending".to_string(),
            confidence: 0.0,
            gaps: Vec::new(),
        }
    }
}

/// One completed plan → execute → evaluate cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// Zero-based round index.
    pub index: usize,
    /// The plan that drove this round.
    pub plan: RoundPlan,
    /// One finding per planned query (failures padded), plus any
    /// supplemental findings appended after the primary results.
    pub findings: Vec<Finding>,
    /// The evaluator's verdict for this round.
    pub evaluation: Evaluation,
    /// Wall-clock time the round took.
    pub elapsed_ms: u64,
}

impl Round {
    /// Distinct normalized source URLs gathered in this round.
    pub fn sources(&self) -> Vec<String> {
        dedup_sources(self.findings.iter().flat_map(|f| f.sources.iter()))
    }
}

/// The synthesized end product of a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Narrative summary of what was found.
    pub summary: String,
    /// Up to [`MAX_KEY_FINDINGS`] snippets, each at most
    /// [`SNIPPET_MAX_CHARS`] characters.
    pub key_findings: Vec<String>,
    /// Deduplicated source URLs across all rounds.
    pub sources: Vec<String>,
    /// Overall confidence in [0, 1].
    pub confidence: f64,
    /// Closing conclusion sentence.
    pub conclusion: String,
    /// Number of rounds executed.
    pub rounds: usize,
}

/// Lifecycle status of a background research task.
///
/// Transitions are one-way: queued → running → succeeded/failed → expired,
/// then removal. A task skips `expired` only by being removed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker slot.
    Queued,
    /// Currently executing.
    Running,
    /// Finished with a report.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Terminal and older than the retention TTL.
    Expired,
}

impl TaskStatus {
    /// Whether the task has finished executing (successfully or not).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A background research task and its lifecycle timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task id.
    pub id: Uuid,
    /// The claim under investigation.
    pub claim: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
    /// When a worker picked the task up.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// The report, once succeeded.
    pub report: Option<Report>,
    /// The error text, once failed.
    pub error: Option<String>,
}

impl TaskRecord {
    /// Creates a freshly queued task for the given claim.
    pub fn new(claim: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            claim: claim.into(),
            status: TaskStatus::Queued,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            report: None,
            error: None,
        }
    }

    /// Marks the task as picked up by a worker.
    pub fn mark_running(&mut self) {
        let now = Utc::now();
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Marks the task as succeeded with its report.
    pub fn mark_succeeded(&mut self, report: Report) {
        let now = Utc::now();
        self.status = TaskStatus::Succeeded;
        self.report = Some(report);
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Marks the task as failed with the error text.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Marks a terminal task as expired.
    pub fn mark_expired(&mut self) {
        self.status = TaskStatus::Expired;
        self.updated_at = Utc::now();
    }

    /// Milliseconds since the task started (or was created, if never
    /// started), up to when it finished (or now, if still going).
    pub fn elapsed_ms(&self) -> i64 {
        let start = self.started_at.unwrap_or(self.created_at);
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - start).num_milliseconds().max(0)
    }
}

/// A named oracle identity that can be asked to answer queries.
///
/// Descriptors are resolved from configuration at call time; they are never
/// cached as global mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Stable lookup key (e.g. "thorough", "fast").
    pub key: String,
    /// Display label.
    pub label: String,
    /// The model identity this provider maps to.
    pub model_id: String,
    /// Whether this provider may be used.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Clamps a confidence value into [0, 1]; NaN collapses to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Reads a confidence out of a loosely typed JSON value.
///
/// Numbers are clamped; the strings "high"/"medium"/"low" map to fixed
/// levels; numeric strings are parsed; anything else falls back to
/// `default` (also clamped).
pub fn confidence_from_value(value: Option<&serde_json::Value>, default: f64) -> f64 {
    match value {
        Some(v) => {
            if let Some(n) = v.as_f64() {
                clamp_confidence(n)
            } else if let Some(s) = v.as_str() {
                match s.trim().to_lowercase().as_str() {
                    "high" => 0.9,
                    "medium" => 0.6,
                    "low" => 0.3,
                    other => other
                        .parse::<f64>()
                        .map(clamp_confidence)
                        .unwrap_or_else(|_| clamp_confidence(default)),
                }
            } else {
                clamp_confidence(default)
            }
        }
        None => clamp_confidence(default),
    }
}

/// Truncates a string to at most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Normalizes a URL for deduplication: trims whitespace, lowercases the
/// scheme and host, and drops a trailing slash. Paths keep their case.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.find("://") {
        Some(scheme_end) => {
            let (scheme, rest) = trimmed.split_at(scheme_end + 3);
            let host_end = rest.find('/').unwrap_or(rest.len());
            let (host, path) = rest.split_at(host_end);
            format!("{}{}{}", scheme.to_lowercase(), host.to_lowercase(), path)
        }
        None => trimmed.to_string(),
    }
}

/// Deduplicates source URLs by normalized form, preserving first-seen order
/// and the first-seen original spelling.
pub fn dedup_sources<'a, I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for s in sources {
        if s.trim().is_empty() {
            continue;
        }
        if seen.insert(normalize_url(s)) {
            out.push(s.clone());
        }
    }
    out
}

use serde::{Deserialize, Serialize};
use veridex_core::ProviderDescriptor;
use veridex_oracle::RetryPolicy;

/// Configuration for the research engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Maximum research rounds per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Cap on queries the planner may schedule per round.
    #[serde(default = "default_max_queries")]
    pub max_queries_per_round: usize,
    /// Per-round deadline in milliseconds.
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,
    /// Optional hard gate: minimum evaluation confidence required before an
    /// oracle-requested stop is honored.
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Optional hard gate: minimum distinct source count across all rounds
    /// required before an oracle-requested stop is honored.
    #[serde(default)]
    pub min_sources: Option<usize>,
    /// Provider identities in preference order.
    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,
    /// Key of the fast provider used for speculative supplementals.
    #[serde(default = "default_fast_provider")]
    pub fast_provider: String,
    /// Oracle retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Which executor capabilities are enabled.
    #[serde(default)]
    pub capabilities: CapabilityConfig,
    /// Speculative supplemental execution tuning.
    #[serde(default)]
    pub supplemental: SupplementalConfig,
    /// Background task queue tuning.
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_queries_per_round: default_max_queries(),
            round_timeout_ms: default_round_timeout_ms(),
            min_confidence: None,
            min_sources: None,
            providers: Vec::new(),
            fast_provider: default_fast_provider(),
            retry: RetryPolicy::default(),
            capabilities: CapabilityConfig::default(),
            supplemental: SupplementalConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl ResearchConfig {
    /// Hard deadline for one background task: full iteration budget plus a
    /// fixed margin, clamped to the task TTL.
    pub fn task_deadline_ms(&self) -> u64 {
        let budget = (self.max_iterations as u64)
            .saturating_mul(self.round_timeout_ms)
            .saturating_add(self.queue.deadline_margin_ms);
        budget.min(self.queue.task_ttl_ms)
    }
}

/// Which execution paths the query executor may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Allow the document/web retrieval tool path.
    #[serde(default = "default_true")]
    pub retrieval_tool: bool,
    /// Allow the page-fetch path.
    #[serde(default = "default_true")]
    pub page_fetch: bool,
    /// Allow the direct low-level search backend path.
    #[serde(default = "default_true")]
    pub direct_search: bool,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            retrieval_tool: true,
            page_fetch: true,
            direct_search: true,
        }
    }
}

/// Tuning for the speculative fast-provider side query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementalConfig {
    /// Fraction of the round budget granted to the supplemental query.
    #[serde(default = "default_supplemental_fraction")]
    pub fraction: f64,
    /// Lower clamp on the supplemental timeout in milliseconds.
    #[serde(default = "default_supplemental_floor_ms")]
    pub floor_ms: u64,
    /// Upper clamp on the supplemental timeout in milliseconds.
    #[serde(default = "default_supplemental_ceiling_ms")]
    pub ceiling_ms: u64,
}

impl Default for SupplementalConfig {
    fn default() -> Self {
        Self {
            fraction: default_supplemental_fraction(),
            floor_ms: default_supplemental_floor_ms(),
            ceiling_ms: default_supplemental_ceiling_ms(),
        }
    }
}

impl SupplementalConfig {
    /// The supplemental deadline: `fraction` of the round budget, clamped
    /// between the floor and the ceiling.
    pub fn timeout_ms(&self, round_timeout_ms: u64) -> u64 {
        let raw = (round_timeout_ms as f64 * self.fraction) as u64;
        raw.clamp(self.floor_ms, self.ceiling_ms.max(self.floor_ms))
    }
}

/// Background task queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum queued + running tasks accepted.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Maximum concurrently running tasks.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Retention TTL for finished tasks in milliseconds.
    #[serde(default = "default_task_ttl_ms")]
    pub task_ttl_ms: u64,
    /// Grace period before expired tasks are removed, in milliseconds.
    #[serde(default = "default_expiry_grace_ms")]
    pub expiry_grace_ms: u64,
    /// Fixed margin added to the task deadline in milliseconds.
    #[serde(default = "default_deadline_margin_ms")]
    pub deadline_margin_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_workers: default_max_workers(),
            task_ttl_ms: default_task_ttl_ms(),
            expiry_grace_ms: default_expiry_grace_ms(),
            deadline_margin_ms: default_deadline_margin_ms(),
        }
    }
}

fn default_max_iterations() -> usize {
    3
}

fn default_max_queries() -> usize {
    4
}

fn default_round_timeout_ms() -> u64 {
    90_000
}

fn default_fast_provider() -> String {
    "fast".to_string()
}

fn default_true() -> bool {
    true
}

fn default_supplemental_fraction() -> f64 {
    0.25
}

fn default_supplemental_floor_ms() -> u64 {
    3_000
}

fn default_supplemental_ceiling_ms() -> u64 {
    20_000
}

fn default_capacity() -> usize {
    8
}

fn default_max_workers() -> usize {
    2
}

fn default_task_ttl_ms() -> u64 {
    30 * 60_000
}

fn default_expiry_grace_ms() -> u64 {
    60_000
}

fn default_deadline_margin_ms() -> u64 {
    10_000
}

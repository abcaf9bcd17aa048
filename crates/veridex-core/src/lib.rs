//! Core types and error definitions for the Veridex research engine.
//!
//! This crate provides the foundational types shared across all Veridex
//! crates: the error enum, the research data model (queries, findings,
//! rounds, reports, task records), and the resilient JSON extractor used to
//! pull structured data out of oracle free text.
//!
//! # Main types
//!
//! - [`VeridexError`] — Unified error enum for all Veridex subsystems.
//! - [`VeridexResult`] — Convenience alias for `Result<T, VeridexError>`.
//! - [`SearchQuery`] / [`Finding`] — One planned query and its outcome.
//! - [`RoundPlan`] / [`Evaluation`] / [`Round`] — One research iteration.
//! - [`Report`] — The synthesized end product of a research run.
//! - [`TaskRecord`] — A background research task and its lifecycle.

/// Best-effort JSON extraction from oracle free text.
pub mod extract;
/// The research data model.
pub mod types;

pub use extract::extract_json;
pub use types::{
    clamp_confidence, confidence_from_value, dedup_sources, normalize_url, truncate_chars,
    Evaluation, Finding, ProviderDescriptor, Report, Round, RoundPlan, SearchQuery, TaskRecord,
    TaskStatus, MAX_KEY_FINDINGS, SNIPPET_MAX_CHARS,
};

/// Top-level error type for the Veridex engine.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum VeridexError {
    /// An error from the reasoning oracle (after retries are exhausted).
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error from an external search backend.
    #[error("Search error: {0}")]
    Search(String),

    /// An error raised by a platform tool during invocation.
    #[error("Tool error: {0}")]
    Tool(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A cooperative deadline elapsed; the payload names the guarded work.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The background task queue rejected a submission at capacity.
    #[error("Task queue full: {queued} queued, {running} running (capacity {capacity})")]
    QueueFull {
        /// Tasks currently waiting for a worker.
        queued: usize,
        /// Tasks currently executing.
        running: usize,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// A task id that no longer (or never did) resolve to a task.
    #[error("Task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`VeridexError`].
pub type VeridexResult<T> = Result<T, VeridexError>;

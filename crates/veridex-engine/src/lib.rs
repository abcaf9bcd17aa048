//! The Veridex research engine: iterative round control, query execution,
//! provider fan-out, and background task queueing.
//!
//! Implements the plan → execute → evaluate → synthesize cycle over an
//! unreliable free-text oracle, with deadline-bounded rounds and graceful
//! degradation at every layer. No public entry point in this crate errors:
//! every failure mode degrades to a best-effort value.
//!
//! # Main types
//!
//! - [`ResearchEngine`] — The round controller; `run(claim)` yields a Report.
//! - [`QueryExecutor`] — Routes one query to a tool, a search backend, or
//!   the oracle, with provider resolution and speculative supplementals.
//! - [`ResearchQueue`] — Bounded background execution with worker
//!   concurrency and time-based expiry.
//! - [`ResearchService`] — The total, string-returning facade consumed by
//!   callers outside the core.

/// Engine configuration.
pub mod config;
/// Cooperative deadline wrapper.
pub mod deadline;
/// The round controller.
pub mod engine;
/// Per-query routing and speculative supplemental execution.
pub mod executor;
/// Early-return multi-provider gather.
pub mod fanout;
/// Best-effort push collaborator contract.
pub mod notify;
/// Bounded background task queue.
pub mod queue;
/// The outward-facing service facade.
pub mod service;

pub use config::{QueueConfig, ResearchConfig, SupplementalConfig};
pub use deadline::with_deadline;
pub use engine::ResearchEngine;
pub use executor::QueryExecutor;
pub use fanout::{gather, FanoutPolicy};
pub use notify::Notifier;
pub use queue::ResearchQueue;
pub use service::ResearchService;

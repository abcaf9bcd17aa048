//! Oracle chat layer: the contract for the free-text reasoning service,
//! an HTTP backend implementation, bounded retry, and provider resolution.
//!
//! The oracle is queried for planning, evaluation, synthesis, and raw
//! search-backed answers. It may fail or blow its latency budget, so every
//! call site goes through [`retry::call_with_retry`] and the engine's
//! deadline wrapper.

/// Oracle request/reply types and the backend trait.
pub mod backend;
/// HTTP oracle backend over a messages-style JSON API.
pub mod http;
/// Ordered enabled-provider resolution.
pub mod provider;
/// Bounded retry with fixed backoff.
pub mod retry;

pub use backend::{OracleBackend, OracleReply, OracleRequest};
pub use http::HttpOracleBackend;
pub use provider::resolve_provider;
pub use retry::{call_with_retry, RetryPolicy};

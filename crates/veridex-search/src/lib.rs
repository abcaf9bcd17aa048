//! Search backends and retrieval tools for the Veridex engine.
//!
//! Everything here sits behind two seams: [`SearchBackend`] for plain
//! request/response search APIs, and [`Invocable`] for platform tools whose
//! external call shapes vary. The executor in `veridex-engine` consumes both
//! without knowing which concrete backend answered.

/// The search backend contract and payload normalization.
pub mod backend;
/// Bounded page fetching with host screening.
pub mod fetch;
/// Generic keyed HTTP search binding.
pub mod http;
/// Tool platform contract and the uniform invocable adapter.
pub mod tools;

pub use backend::{normalize_results, SearchBackend, SearchItem};
pub use fetch::{FetchedPage, PageFetcher};
pub use http::HttpSearchBackend;
pub use tools::{CallAdapter, Invocable, RawCall, ToolContext, ToolDescriptor, ToolHandle, ToolPlatform};

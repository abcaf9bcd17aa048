use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use veridex_core::VeridexResult;

/// A single request to the reasoning oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    /// The model identity that should answer.
    pub model_id: String,
    /// The user-facing message text.
    pub message: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system: Option<String>,
    /// Optional image references (URLs or base64 payloads).
    #[serde(default)]
    pub images: Vec<String>,
    /// Whether the oracle should use its native search ability.
    #[serde(default)]
    pub enable_search: bool,
}

impl OracleRequest {
    /// Creates a plain request for the given model and message.
    pub fn new(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            message: message.into(),
            system: None,
            images: Vec::new(),
            enable_search: false,
        }
    }

    /// Sets the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Enables the oracle's native search ability.
    pub fn with_search(mut self) -> Self {
        self.enable_search = true;
        self
    }
}

/// The oracle's reply: free text plus any source URLs it surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleReply {
    /// The reply text.
    pub content: String,
    /// Source URLs extracted from the reply.
    pub sources: Vec<String>,
}

/// The seam between the engine and a concrete oracle service.
///
/// To add a new oracle provider: implement this trait and hand it to the
/// engine as a trait object.
#[async_trait]
pub trait OracleBackend: Send + Sync {
    /// Sends one chat request and returns the reply.
    async fn chat(&self, request: &OracleRequest) -> VeridexResult<OracleReply>;
}

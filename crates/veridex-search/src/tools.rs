use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;
use veridex_core::{VeridexError, VeridexResult};

/// Context handed to contextual tool calls.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Session or task identity the invocation belongs to.
    pub session: String,
    /// Arbitrary invocation metadata.
    pub metadata: serde_json::Value,
}

type ToolFuture = Pin<Box<dyn Future<Output = VeridexResult<String>> + Send>>;

/// The raw call shape an external tool platform hands us.
///
/// Platforms expose either a single-argument call or an
/// (argument, context) call; the shape is probed once at the boundary and
/// normalized by [`CallAdapter`] — the core never branches on it.
pub enum RawCall {
    /// `f(input) -> output`
    Unary(Box<dyn Fn(serde_json::Value) -> ToolFuture + Send + Sync>),
    /// `f(input, context) -> output`
    Contextual(Box<dyn Fn(serde_json::Value, ToolContext) -> ToolFuture + Send + Sync>),
}

/// The one uniform capability interface consumed by the executor.
#[async_trait]
pub trait Invocable: Send + Sync {
    /// Invokes the tool with a JSON input and returns its text output.
    async fn invoke(&self, input: serde_json::Value) -> VeridexResult<String>;
}

/// Normalizes a [`RawCall`] into an [`Invocable`].
pub struct CallAdapter {
    raw: RawCall,
    context: ToolContext,
}

impl CallAdapter {
    /// Wraps a raw call with the context contextual calls receive.
    pub fn new(raw: RawCall, context: ToolContext) -> Self {
        Self { raw, context }
    }
}

#[async_trait]
impl Invocable for CallAdapter {
    async fn invoke(&self, input: serde_json::Value) -> VeridexResult<String> {
        match &self.raw {
            RawCall::Unary(f) => f(input).await,
            RawCall::Contextual(f) => f(input, self.context.clone()).await,
        }
    }
}

/// A tool known to the platform, instantiable into an [`Invocable`].
#[async_trait]
pub trait ToolDescriptor: Send + Sync {
    /// The tool name.
    fn name(&self) -> &str;

    /// Instantiates the tool with the given options.
    async fn instantiate(&self, options: serde_json::Value) -> VeridexResult<Box<dyn Invocable>>;
}

/// The external tool platform.
pub trait ToolPlatform: Send + Sync {
    /// Names of currently available tools.
    fn list_available(&self) -> Vec<String>;

    /// Looks up a tool descriptor by name.
    fn lookup(&self, name: &str) -> Option<Arc<dyn ToolDescriptor>>;
}

/// An instance-scoped handle to one platform tool.
///
/// The instantiated invocable is cached on the handle, not in module state;
/// [`ToolHandle::refresh`] re-instantiates explicitly and
/// [`ToolHandle::ready`] reports whether a cached instance exists.
pub struct ToolHandle {
    platform: Arc<dyn ToolPlatform>,
    name: String,
    options: serde_json::Value,
    cached: tokio::sync::Mutex<Option<Arc<dyn Invocable>>>,
}

impl ToolHandle {
    /// Creates a handle; nothing is instantiated until first use.
    pub fn new(
        platform: Arc<dyn ToolPlatform>,
        name: impl Into<String>,
        options: serde_json::Value,
    ) -> Self {
        Self {
            platform,
            name: name.into(),
            options,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// The tool name this handle points at.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether an instantiated tool is cached and ready.
    pub async fn ready(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Drops any cached instance and re-instantiates from the platform.
    pub async fn refresh(&self) -> VeridexResult<()> {
        let descriptor = self
            .platform
            .lookup(&self.name)
            .ok_or_else(|| VeridexError::Tool(format!("tool '{}' not available", self.name)))?;
        let invocable = descriptor.instantiate(self.options.clone()).await?;
        *self.cached.lock().await = Some(Arc::from(invocable));
        debug!(tool = %self.name, "Tool handle refreshed");
        Ok(())
    }

    /// Invokes the tool, instantiating on first use.
    pub async fn invoke(&self, input: serde_json::Value) -> VeridexResult<String> {
        let cached = self.cached.lock().await.clone();
        let invocable = match cached {
            Some(i) => i,
            None => {
                self.refresh().await?;
                self.cached.lock().await.clone().ok_or_else(|| {
                    VeridexError::Tool(format!("tool '{}' failed to instantiate", self.name))
                })?
            }
        };
        invocable.invoke(input).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct MockDescriptor {
        name: String,
        contextual: bool,
    }

    #[async_trait]
    impl ToolDescriptor for MockDescriptor {
        fn name(&self) -> &str {
            &self.name
        }

        async fn instantiate(
            &self,
            _options: serde_json::Value,
        ) -> VeridexResult<Box<dyn Invocable>> {
            let raw = if self.contextual {
                RawCall::Contextual(Box::new(|input, ctx| {
                    Box::pin(async move {
                        Ok(format!("ctx[{}] {}", ctx.session, input["q"].as_str().unwrap_or("")))
                    })
                }))
            } else {
                RawCall::Unary(Box::new(|input| {
                    Box::pin(
                        async move { Ok(format!("plain {}", input["q"].as_str().unwrap_or(""))) },
                    )
                }))
            };
            Ok(Box::new(CallAdapter::new(
                raw,
                ToolContext {
                    session: "s-1".to_string(),
                    metadata: serde_json::Value::Null,
                },
            )))
        }
    }

    struct MockPlatform {
        tools: Vec<(String, bool)>,
    }

    impl ToolPlatform for MockPlatform {
        fn list_available(&self) -> Vec<String> {
            self.tools.iter().map(|(n, _)| n.clone()).collect()
        }

        fn lookup(&self, name: &str) -> Option<Arc<dyn ToolDescriptor>> {
            self.tools
                .iter()
                .find(|(n, _)| n == name)
                .map(|(n, contextual)| {
                    Arc::new(MockDescriptor {
                        name: n.clone(),
                        contextual: *contextual,
                    }) as Arc<dyn ToolDescriptor>
                })
        }
    }

    fn platform() -> Arc<dyn ToolPlatform> {
        Arc::new(MockPlatform {
            tools: vec![
                ("retrieval".to_string(), false),
                ("retrieval_ctx".to_string(), true),
            ],
        })
    }

    #[tokio::test]
    async fn unary_call_is_normalized() {
        let handle = ToolHandle::new(platform(), "retrieval", serde_json::Value::Null);
        let out = handle.invoke(serde_json::json!({"q": "hello"})).await.unwrap();
        assert_eq!(out, "plain hello");
    }

    #[tokio::test]
    async fn contextual_call_is_normalized() {
        let handle = ToolHandle::new(platform(), "retrieval_ctx", serde_json::Value::Null);
        let out = handle.invoke(serde_json::json!({"q": "hi"})).await.unwrap();
        assert_eq!(out, "ctx[s-1] hi");
    }

    #[tokio::test]
    async fn handle_instantiates_lazily_and_reports_readiness() {
        let handle = ToolHandle::new(platform(), "retrieval", serde_json::Value::Null);
        assert!(!handle.ready().await);

        handle.invoke(serde_json::json!({"q": "x"})).await.unwrap();
        assert!(handle.ready().await);
    }

    #[tokio::test]
    async fn refresh_rebuilds_the_cached_instance() {
        let handle = ToolHandle::new(platform(), "retrieval", serde_json::Value::Null);
        handle.refresh().await.unwrap();
        assert!(handle.ready().await);

        // Refresh again; still usable.
        handle.refresh().await.unwrap();
        let out = handle.invoke(serde_json::json!({"q": "y"})).await.unwrap();
        assert_eq!(out, "plain y");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let handle = ToolHandle::new(platform(), "missing", serde_json::Value::Null);
        let err = handle.invoke(serde_json::Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("not available"));
        assert!(!handle.ready().await);
    }

    #[tokio::test]
    async fn platform_lists_available_tools() {
        let p = platform();
        let names = p.list_available();
        assert_eq!(names, vec!["retrieval", "retrieval_ctx"]);
    }
}

use crate::config::ResearchConfig;
use crate::deadline::with_deadline;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use veridex_core::{truncate_chars, Finding, RoundPlan, SearchQuery};
use veridex_oracle::{call_with_retry, resolve_provider, OracleBackend, OracleRequest};
use veridex_search::{PageFetcher, SearchBackend, ToolHandle};

const ORACLE_CONFIDENCE: f64 = 0.7;
const SUPPLEMENTAL_CONFIDENCE: f64 = 0.6;
const TOOL_CONFIDENCE: f64 = 0.6;
const SEARCH_CONFIDENCE: f64 = 0.55;
const FETCH_SNIPPET_CHARS: usize = 4_000;

/// Routes one query to whichever backend should answer it and always
/// produces a [`Finding`] — failures are isolated per query, never thrown.
///
/// Resolution order: requested retrieval-tool path (if enabled), requested
/// low-level search backend (if enabled), then the oracle's own search
/// ability under a resolved provider identity. Only a fully disabled
/// provider list is terminal; everything else degrades.
#[derive(Clone)]
pub struct QueryExecutor {
    oracle: Arc<dyn OracleBackend>,
    search: Option<Arc<dyn SearchBackend>>,
    fetcher: Option<Arc<PageFetcher>>,
    retrieval: Option<Arc<ToolHandle>>,
    config: Arc<ResearchConfig>,
}

impl QueryExecutor {
    /// Creates an executor with only the oracle path wired.
    pub fn new(oracle: Arc<dyn OracleBackend>, config: Arc<ResearchConfig>) -> Self {
        Self {
            oracle,
            search: None,
            fetcher: None,
            retrieval: None,
            config,
        }
    }

    /// Wires a direct search backend.
    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    /// Wires the page fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Wires the retrieval tool handle.
    pub fn with_retrieval(mut self, retrieval: Arc<ToolHandle>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// Executes every query in the plan independently and returns one
    /// finding per query, in plan order, padding failures as needed.
    /// Settled supplemental findings are appended after the primaries.
    pub async fn execute_plan(&self, plan: &RoundPlan) -> Vec<Finding> {
        let mut handles: Vec<JoinHandle<Finding>> = Vec::with_capacity(plan.queries.len());
        let mut probes = Vec::new();

        for query in &plan.queries {
            let exec = self.clone();
            let q = query.clone();
            handles.push(tokio::spawn(async move { exec.execute_query(&q).await }));

            if let Some(probe) = self.spawn_supplemental(query) {
                probes.push(probe);
            }
        }

        let mut findings = Vec::with_capacity(handles.len());
        for (handle, query) in handles.into_iter().zip(&plan.queries) {
            match handle.await {
                Ok(finding) => findings.push(finding),
                Err(e) => findings.push(Finding::failure(
                    "executor",
                    &query.focus,
                    format!("query task died: {e}"),
                )),
            }
        }

        // Poll each probe exactly once; splice in what already settled.
        for probe in probes {
            if let Some(finding) = probe.take_if_settled().await {
                if finding.failed {
                    debug!(source = %finding.source, "Supplemental failed, dropping");
                } else {
                    debug!(source = %finding.source, "Splicing supplemental finding");
                    findings.push(finding);
                }
            }
        }

        findings
    }

    /// Executes one query. Infallible: every failure path yields a finding
    /// with the `failed` flag set.
    pub async fn execute_query(&self, query: &SearchQuery) -> Finding {
        match query.backend.as_deref() {
            Some("retrieval") if self.config.capabilities.retrieval_tool => {
                if let Some(finding) = self.try_retrieval_tool(query).await {
                    return finding;
                }
            }
            Some("fetch") if self.config.capabilities.page_fetch => {
                if let Some(finding) = self.try_page_fetch(query).await {
                    return finding;
                }
            }
            Some("search") if self.config.capabilities.direct_search => {
                if let Some(finding) = self.try_direct_search(query).await {
                    return finding;
                }
            }
            _ => {}
        }

        self.oracle_query(query).await
    }

    /// Attempts the retrieval tool; `None` means fall through.
    async fn try_retrieval_tool(&self, query: &SearchQuery) -> Option<Finding> {
        let handle = self.retrieval.as_ref()?;
        let input = serde_json::json!({
            "query": query.text,
            "args": query.backend_args,
        });
        match handle.invoke(input).await {
            Ok(output) if !output.trim().is_empty() => Some(Finding::new(
                handle.name(),
                &query.focus,
                output,
                Vec::new(),
                TOOL_CONFIDENCE,
            )),
            Ok(_) => {
                debug!(tool = handle.name(), "Retrieval tool returned nothing, falling through");
                None
            }
            Err(e) => {
                warn!(tool = handle.name(), error = %e, "Retrieval tool failed, falling through");
                None
            }
        }
    }

    /// Attempts a page fetch when a target URL argument is present;
    /// `None` means fall through.
    async fn try_page_fetch(&self, query: &SearchQuery) -> Option<Finding> {
        let fetcher = self.fetcher.as_ref()?;
        let url = query.backend_args["url"].as_str()?;
        match fetcher.fetch(url).await {
            Ok(page) => Some(Finding::new(
                "fetch",
                &query.focus,
                truncate_chars(&page.body, FETCH_SNIPPET_CHARS),
                vec![page.url],
                TOOL_CONFIDENCE,
            )),
            Err(e) => {
                warn!(url, error = %e, "Page fetch failed, falling through");
                None
            }
        }
    }

    /// Attempts the direct search backend; `None` means fall through.
    async fn try_direct_search(&self, query: &SearchQuery) -> Option<Finding> {
        let search = self.search.as_ref()?;
        match search.search(&query.text, &query.backend_args).await {
            Ok(items) if !items.is_empty() => {
                let text = items
                    .iter()
                    .map(|i| {
                        if i.title.is_empty() {
                            i.content.clone()
                        } else {
                            format!("{}: {}", i.title, i.content)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let sources = items.iter().filter_map(|i| i.url.clone()).collect();
                Some(Finding::new(
                    search.name(),
                    &query.focus,
                    text,
                    sources,
                    SEARCH_CONFIDENCE,
                ))
            }
            Ok(_) => {
                debug!(backend = search.name(), "Search returned no items, falling through");
                None
            }
            Err(e) => {
                warn!(backend = search.name(), error = %e, "Direct search failed, falling through");
                None
            }
        }
    }

    /// The default path: the oracle answers with its own search ability
    /// under a resolved provider identity.
    async fn oracle_query(&self, query: &SearchQuery) -> Finding {
        let Some(provider) = resolve_provider(query.provider.as_deref(), &self.config.providers)
        else {
            return Finding::failure(
                "resolver",
                &query.focus,
                "every search provider is disabled",
            );
        };

        let request = OracleRequest::new(&provider.model_id, &query.text).with_search();
        let oracle = &self.oracle;
        match call_with_retry(&self.config.retry, "search query", || oracle.chat(&request)).await {
            Ok(reply) => Finding::new(
                &provider.key,
                &query.focus,
                reply.content,
                reply.sources,
                ORACLE_CONFIDENCE,
            ),
            Err(e) => Finding::failure(&provider.key, &query.focus, e.to_string()),
        }
    }

    /// Launches the speculative fast-provider side query, when the primary
    /// provider for this query is not already the fast one. The spawned
    /// task swallows its own failures; the caller polls the probe once.
    fn spawn_supplemental(&self, query: &SearchQuery) -> Option<SupplementalProbe> {
        let fast = self
            .config
            .providers
            .iter()
            .find(|p| p.key == self.config.fast_provider && p.enabled)?;
        let primary = resolve_provider(query.provider.as_deref(), &self.config.providers)?;
        if primary.key == fast.key {
            return None;
        }

        let timeout = self.config.supplemental.timeout_ms(self.config.round_timeout_ms);
        let label = format!("{}+supplemental", fast.key);
        let request = OracleRequest::new(&fast.model_id, &query.text).with_search();
        let oracle = self.oracle.clone();
        let focus = query.focus.clone();
        let task_label = label.clone();

        debug!(provider = %fast.key, timeout_ms = timeout, "Launching supplemental query");
        let handle = tokio::spawn(async move {
            let result = with_deadline(
                oracle.chat(&request),
                Duration::from_millis(timeout),
                "supplemental query",
            )
            .await;
            match result {
                Ok(reply) => Finding::new(
                    task_label,
                    focus,
                    reply.content,
                    reply.sources,
                    SUPPLEMENTAL_CONFIDENCE,
                ),
                Err(e) => Finding::failure(task_label, focus, e.to_string()),
            }
        });

        Some(SupplementalProbe { label, handle })
    }
}

/// A non-blocking probe over a detached supplemental task.
pub struct SupplementalProbe {
    label: String,
    handle: JoinHandle<Finding>,
}

impl SupplementalProbe {
    /// Whether the supplemental task has already settled.
    pub fn settled(&self) -> bool {
        self.handle.is_finished()
    }

    /// Consumes the probe. Returns the finding when the task has already
    /// settled; otherwise leaves the task running to completion behind a
    /// watcher that discards its eventual outcome.
    pub async fn take_if_settled(self) -> Option<Finding> {
        let SupplementalProbe { label, handle } = self;
        if handle.is_finished() {
            match handle.await {
                Ok(finding) => Some(finding),
                Err(e) => {
                    debug!(label, error = %e, "Supplemental task died");
                    None
                }
            }
        } else {
            tokio::spawn(async move {
                match handle.await {
                    Ok(f) => debug!(label, failed = f.failed, "Abandoned supplemental settled"),
                    Err(e) => debug!(label, error = %e, "Abandoned supplemental join error"),
                }
            });
            None
        }
    }
}

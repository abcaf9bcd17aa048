use crate::backend::{normalize_results, SearchBackend, SearchItem};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use veridex_core::{VeridexError, VeridexResult};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Generic keyed HTTP search API binding.
///
/// The concrete provider is configuration, not code: endpoint, key header
/// name, and key are all injected. The response payload goes through
/// [`normalize_results`], so any list-shaped or object-shaped API works.
pub struct HttpSearchBackend {
    name: String,
    endpoint: String,
    api_key_header: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSearchBackend {
    /// Creates a backend for the given endpoint and key.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key_header: impl Into<String>,
        api_key: impl Into<String>,
    ) -> VeridexResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| VeridexError::Http(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key_header: api_key_header.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        args: &serde_json::Value,
    ) -> VeridexResult<Vec<SearchItem>> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .header(&self.api_key_header, &self.api_key)
            .query(&[("q", query)]);

        if let Some(count) = args["count"].as_u64() {
            request = request.query(&[("count", count.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VeridexError::Search(e.to_string()))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VeridexError::Search(e.to_string()))?;

        if !status.is_success() {
            return Err(VeridexError::Search(format!(
                "search API error {status}: {payload}"
            )));
        }

        let items = normalize_results(&payload);
        debug!(backend = %self.name, query, results = items.len(), "Search complete");
        Ok(items)
    }
}

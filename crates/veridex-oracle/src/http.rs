use crate::backend::{OracleBackend, OracleReply, OracleRequest};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use veridex_core::{VeridexError, VeridexResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

/// Oracle backend speaking a messages-style JSON HTTP API.
pub struct HttpOracleBackend {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpOracleBackend {
    /// Creates a backend against the given API base URL.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> VeridexResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VeridexError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http,
        })
    }
}

#[async_trait]
impl OracleBackend for HttpOracleBackend {
    async fn chat(&self, request: &OracleRequest) -> VeridexResult<OracleReply> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let mut content_blocks = vec![WireBlock {
            kind: "text".to_string(),
            text: Some(request.message.clone()),
            source: None,
        }];
        for image in &request.images {
            content_blocks.push(WireBlock {
                kind: "image".to_string(),
                text: None,
                source: Some(image.clone()),
            });
        }

        let mut body = serde_json::json!({
            "model": request.model_id,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": content_blocks}],
        });

        if let Some(sys) = &request.system {
            body["system"] = serde_json::json!(sys);
        }

        if request.enable_search {
            body["tools"] = serde_json::json!([{"type": "web_search", "name": "web_search"}]);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| VeridexError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VeridexError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(VeridexError::Http(format!(
                "Oracle API error {}: {}",
                status, resp_body
            )));
        }

        parse_oracle_reply(&resp_body)
    }
}

#[derive(Serialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

/// Parses a messages-style response body into content text plus any source
/// URLs surfaced in search-result or citation blocks.
pub fn parse_oracle_reply(body: &serde_json::Value) -> VeridexResult<OracleReply> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| VeridexError::Oracle("missing content in oracle response".into()))?;

    let mut text_parts = Vec::new();
    let mut sources = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_string());
                }
                if let Some(citations) = block["citations"].as_array() {
                    for c in citations {
                        if let Some(u) = c["url"].as_str() {
                            sources.push(u.to_string());
                        }
                    }
                }
            }
            Some("web_search_tool_result") | Some("web_search_result") => {
                collect_urls(block, &mut sources);
            }
            _ => {}
        }
    }

    Ok(OracleReply {
        content: text_parts.join("\n"),
        sources,
    })
}

/// Walks a result block and collects every string-valued `url` field.
fn collect_urls(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                if k == "url" {
                    if let Some(u) = v.as_str() {
                        out.push(u.to_string());
                    }
                } else {
                    collect_urls(v, out);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_urls(item, out);
            }
        }
        _ => {}
    }
}

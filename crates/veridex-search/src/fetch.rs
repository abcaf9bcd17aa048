use std::time::Duration;
use tracing::info;
use veridex_core::{VeridexError, VeridexResult};

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A fetched page, body decoded lossily to text.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was fetched.
    pub url: String,
    /// The response content type, possibly empty.
    pub content_type: String,
    /// The decoded body text.
    pub body: String,
}

/// Fetches pages referenced by query arguments, with scheme and host
/// screening and a response size cap.
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    /// Creates a fetcher with a bounded timeout and limited redirects.
    pub fn new() -> VeridexResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| VeridexError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetches one page. Policy denials (bad scheme, private host) and
    /// transport failures are both errors; the executor downgrades them to
    /// a logged fall-through.
    pub async fn fetch(&self, url: &str) -> VeridexResult<FetchedPage> {
        if url.trim().is_empty() {
            return Err(VeridexError::Tool("empty fetch URL".into()));
        }

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| VeridexError::Tool(format!("invalid URL '{url}': {e}")))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(VeridexError::Tool(format!(
                    "unsupported scheme '{scheme}', only http/https allowed"
                )));
            }
        }

        if let Some(host) = parsed.host_str() {
            if is_private_host(host) {
                return Err(VeridexError::Tool(format!(
                    "access denied: '{host}' resolves to a private/internal address"
                )));
            }
        }

        info!(url = %url, "Page fetch");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VeridexError::Http(format!("fetch failed: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !status.is_success() {
            return Err(VeridexError::Http(format!("fetch returned {status} for {url}")));
        }

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| VeridexError::Http(format!("failed to read body: {e}")))?;

        if body_bytes.len() > MAX_RESPONSE_SIZE {
            return Err(VeridexError::Http(format!(
                "response too large: {} bytes (max {})",
                body_bytes.len(),
                MAX_RESPONSE_SIZE
            )));
        }

        Ok(FetchedPage {
            url: url.to_string(),
            content_type,
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
        })
    }
}

/// Check if a host resolves to a private/internal network address.
fn is_private_host(host: &str) -> bool {
    let private_patterns = [
        "localhost",
        "127.",
        "10.",
        "172.16.",
        "172.17.",
        "172.18.",
        "172.19.",
        "172.20.",
        "172.21.",
        "172.22.",
        "172.23.",
        "172.24.",
        "172.25.",
        "172.26.",
        "172.27.",
        "172.28.",
        "172.29.",
        "172.30.",
        "172.31.",
        "192.168.",
        "169.254.",
        "0.0.0.0",
        "[::1]",
        "metadata.google",
        "metadata.aws",
    ];

    let host_lower = host.to_lowercase();
    private_patterns
        .iter()
        .any(|p| host_lower.starts_with(p) || host_lower == *p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_host_detection() {
        assert!(is_private_host("localhost"));
        assert!(is_private_host("127.0.0.1"));
        assert!(is_private_host("192.168.1.1"));
        assert!(is_private_host("169.254.169.254"));
        assert!(!is_private_host("example.com"));
        assert!(!is_private_host("api.search.dev"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let fetcher = PageFetcher::new().unwrap();
        assert!(fetcher.fetch("not a url").await.is_err());
        assert!(fetcher.fetch("").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_rejects_private_host() {
        let fetcher = PageFetcher::new().unwrap();
        let err = fetcher
            .fetch("http://169.254.169.254/latest/meta-data/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("private"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_scheme() {
        let fetcher = PageFetcher::new().unwrap();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }
}

//! Integration tests for the HTTP search backend against a mock server.

use veridex_search::{HttpSearchBackend, SearchBackend};
use wiremock::matchers::{header, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn search_normalizes_object_shaped_payload() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("q", "boiling point of water"))
        .and(header("x-subscription-token", "key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"title": "Boiling point", "description": "100C at sea level", "url": "https://phys.example/water"},
                {"title": "Altitude effects", "snippet": "lower at altitude"}
            ]
        })))
        .mount(&server)
        .await;

    let backend =
        HttpSearchBackend::new("websearch", server.uri(), "x-subscription-token", "key-1").unwrap();
    let items = backend
        .search("boiling point of water", &serde_json::Value::Null)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url.as_deref(), Some("https://phys.example/water"));
    assert_eq!(items[1].content, "lower at altitude");
}

#[tokio::test]
async fn search_error_status_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(serde_json::json!({"error": "rate limited"})),
        )
        .mount(&server)
        .await;

    let backend = HttpSearchBackend::new("websearch", server.uri(), "x-token", "k").unwrap();
    let err = backend
        .search("anything", &serde_json::Value::Null)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn count_argument_is_forwarded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("count", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let backend = HttpSearchBackend::new("websearch", server.uri(), "x-token", "k").unwrap();
    let items = backend
        .search("q", &serde_json::json!({"count": 3}))
        .await
        .unwrap();
    assert!(items.is_empty());
}

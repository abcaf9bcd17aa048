use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use veridex_core::VeridexResult;

/// One normalized search result item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    /// Result title, possibly empty.
    pub title: String,
    /// Result content or snippet, possibly empty.
    pub content: String,
    /// Result URL, when the backend provided one.
    pub url: Option<String>,
}

/// A plain request/response search backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name, used as the finding source label.
    fn name(&self) -> &str;

    /// Runs one search and returns normalized items.
    async fn search(&self, query: &str, args: &serde_json::Value)
        -> VeridexResult<Vec<SearchItem>>;
}

/// Normalizes a backend payload into [`SearchItem`]s.
///
/// Accepts a bare list, or an object wrapping the list under `results`,
/// `items`, or `data`. Item content falls back from `content` to
/// `description` to `snippet`; items with neither title nor content are
/// dropped.
pub fn normalize_results(payload: &serde_json::Value) -> Vec<SearchItem> {
    let list = match payload {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => ["results", "items", "data"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_array()))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };

    list.iter()
        .filter_map(|item| {
            let title = item["title"]
                .as_str()
                .or_else(|| item["name"].as_str())
                .unwrap_or_default()
                .to_string();
            let content = item["content"]
                .as_str()
                .or_else(|| item["description"].as_str())
                .or_else(|| item["snippet"].as_str())
                .unwrap_or_default()
                .to_string();
            let url = item["url"]
                .as_str()
                .or_else(|| item["link"].as_str())
                .map(str::to_string);

            if title.is_empty() && content.is_empty() {
                None
            } else {
                Some(SearchItem {
                    title,
                    content,
                    url,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_list_shaped_payload() {
        let payload = serde_json::json!([
            {"title": "A", "content": "first", "url": "https://a.com"},
            {"title": "B", "description": "second"}
        ]);
        let items = normalize_results(&payload);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url.as_deref(), Some("https://a.com"));
        assert_eq!(items[1].content, "second");
    }

    #[test]
    fn test_normalize_object_shaped_payload() {
        let payload = serde_json::json!({
            "results": [
                {"name": "C", "snippet": "third", "link": "https://c.com"}
            ]
        });
        let items = normalize_results(&payload);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "C");
        assert_eq!(items[0].content, "third");
        assert_eq!(items[0].url.as_deref(), Some("https://c.com"));
    }

    #[test]
    fn test_normalize_drops_empty_items() {
        let payload = serde_json::json!({
            "items": [
                {"url": "https://only-url.com"},
                {"title": "keep", "content": "me"}
            ]
        });
        let items = normalize_results(&payload);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "keep");
    }

    #[test]
    fn test_normalize_unrecognized_shape_is_empty() {
        assert!(normalize_results(&serde_json::json!("just a string")).is_empty());
        assert!(normalize_results(&serde_json::json!({"unrelated": 1})).is_empty());
    }
}

//! Turning search results into prompt text, and timeout-bounded adapter calls.

use std::time::Duration;

use tracing::warn;

use newsletter_completion::{CompletionClient, CompletionRequest};
use newsletter_search::SearchClient;
use newsletter_shared::{NewsletterError, Result, SearchQuery, SearchResultItem, SearchResultSet};

/// Separator between serialized result items in a prompt.
pub const RESULTS_SEPARATOR: &str = "\n\n";

/// Renders one search result as prompt text.
pub trait ItemSerializer: Send + Sync {
    fn serialize(&self, item: &SearchResultItem) -> Result<String>;
}

/// Compact JSON, one object per item.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonItemSerializer;

impl ItemSerializer for JsonItemSerializer {
    fn serialize(&self, item: &SearchResultItem) -> Result<String> {
        serde_json::to_string(item).map_err(|e| {
            NewsletterError::Serialization(format!("result {:?}: {e}", item.url))
        })
    }
}

/// Serialize every item independently and join the survivors in order.
///
/// Items that fail are logged and dropped. Fails only when nothing survives.
pub fn serialize_results(
    serializer: &dyn ItemSerializer,
    items: &[SearchResultItem],
) -> Result<String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match serializer.serialize(item) {
            Ok(text) => parts.push(text),
            Err(e) => warn!(url = %item.url, error = %e, "dropping unserializable search result"),
        }
    }

    if parts.is_empty() {
        return Err(NewsletterError::Serialization(format!(
            "none of the {} search results could be serialized",
            items.len()
        )));
    }

    Ok(parts.join(RESULTS_SEPARATOR))
}

/// Run one search, failing with a `Search` error if it takes longer than `timeout`.
pub async fn search_with_timeout(
    client: &dyn SearchClient,
    query: &SearchQuery,
    timeout: Duration,
) -> Result<SearchResultSet> {
    tokio::time::timeout(timeout, client.search(query))
        .await
        .map_err(|_| {
            NewsletterError::Search(format!(
                "search for {:?} timed out after {timeout:?}",
                query.text()
            ))
        })?
}

/// Run one completion, failing with a `Completion` error if it takes longer than `timeout`.
pub async fn complete_with_timeout(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String> {
    tokio::time::timeout(timeout, client.complete(request))
        .await
        .map_err(|_| {
            NewsletterError::Completion(format!("completion timed out after {timeout:?}"))
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingOn, item};

    #[test]
    fn json_serializer_includes_fields() {
        let text = JsonItemSerializer
            .serialize(&item("Agents", "https://example.com/a"))
            .unwrap();
        assert!(text.contains("\"title\":\"Agents\""));
        assert!(text.contains("\"url\":\"https://example.com/a\""));
        assert!(!text.contains("raw_content"));
    }

    #[test]
    fn unserializable_items_are_dropped() {
        let items: Vec<_> = (1..=5)
            .map(|i| item(&format!("result {i}"), &format!("https://example.com/{i}")))
            .collect();
        let serializer = FailingOn::urls(["https://example.com/3"]);

        let text = serialize_results(&serializer, &items).unwrap();
        for i in [1, 2, 4, 5] {
            assert!(text.contains(&format!("result {i}")), "missing result {i}");
        }
        assert!(!text.contains("result 3"));
        assert_eq!(text.matches(RESULTS_SEPARATOR).count(), 3);
    }

    #[test]
    fn all_unserializable_is_an_error() {
        let items: Vec<_> = (1..=5)
            .map(|i| item("x", &format!("https://example.com/{i}")))
            .collect();
        let err = serialize_results(&FailingOn::all(), &items).unwrap_err();
        assert!(matches!(err, NewsletterError::Serialization(_)));
    }

    #[test]
    fn order_is_preserved() {
        let items = vec![item("first", "https://a"), item("second", "https://b")];
        let text = serialize_results(&JsonItemSerializer, &items).unwrap();
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }
}

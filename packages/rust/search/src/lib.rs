//! Web search adapters for the newsletter pipeline.
//!
//! The pipeline only talks to [`SearchClient`]; [`TavilyClient`] is the
//! production implementation.

pub mod tavily;

use async_trait::async_trait;

use newsletter_shared::{Result, SearchQuery, SearchResultSet};

pub use tavily::TavilyClient;

/// Capability to run one web search.
///
/// Implementations must return items in provider rank order and may return
/// an empty set; deciding whether that is acceptable is the caller's job.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResultSet>;
}

//! Tavily search API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use newsletter_shared::{
    NewsletterError, RawContentMode, Result, RetryError, RetryPolicy, SearchQuery,
    SearchResultItem, SearchResultSet, SearchSettings, TimeRange, TopicCategory, read_secret,
    retry,
};

use crate::SearchClient;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("newsletter-agent/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<TopicCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_range: Option<TimeRange>,
    max_results: u32,
    include_raw_content: RawContentFlag,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_domains: Option<Vec<&'a str>>,
}

/// Tavily accepts `false` or a format name for `include_raw_content`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RawContentFlag {
    Off(bool),
    Format(&'static str),
}

impl From<RawContentMode> for RawContentFlag {
    fn from(mode: RawContentMode) -> Self {
        match mode {
            RawContentMode::None => Self::Off(false),
            RawContentMode::Text => Self::Format("text"),
            RawContentMode::Markdown => Self::Format("markdown"),
        }
    }
}

impl<'a> TavilyRequest<'a> {
    fn from_query(query: &'a SearchQuery) -> Self {
        Self {
            query: query.text(),
            topic: query.topic(),
            time_range: query.time_range(),
            max_results: query.max_results(),
            include_raw_content: query.raw_content().into(),
            include_domains: query
                .include_domains()
                .map(|domains| domains.iter().map(String::as_str).collect()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    score: f64,
}

impl From<TavilyResult> for SearchResultItem {
    fn from(r: TavilyResult) -> Self {
        Self {
            title: r.title,
            url: r.url,
            content: r.content,
            raw_content: r.raw_content.filter(|s| !s.is_empty()),
            score: r.score,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`SearchClient`] backed by the Tavily REST API.
pub struct TavilyClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl TavilyClient {
    /// Build a client from config, reading the API key from the configured env var.
    pub fn from_settings(settings: &SearchSettings) -> Result<Self> {
        let api_key = read_secret(&settings.api_key_env, "search API key")?;
        Self::new(settings, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn new(settings: &SearchSettings, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = format!("{}/search", settings.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            NewsletterError::config(format!("invalid search base_url {:?}: {e}", settings.base_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| NewsletterError::Search(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            retry: settings.retry_policy(),
        })
    }

    async fn search_once(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<Vec<SearchResultItem>, RetryError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest::from_query(query))
            .send()
            .await
            .map_err(|e| {
                let err = NewsletterError::Search(format!("{}: {e}", self.endpoint));
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    RetryError::Transient(err)
                } else {
                    RetryError::Permanent(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = NewsletterError::Search(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            ));
            return Err(if is_retryable(status) {
                RetryError::Transient(err)
            } else {
                RetryError::Permanent(err)
            });
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| {
            RetryError::Permanent(NewsletterError::Search(format!(
                "failed to decode response: {e}"
            )))
        })?;

        Ok(parsed.results.into_iter().map(Into::into).collect())
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl SearchClient for TavilyClient {
    #[instrument(skip_all, fields(query = %query.text(), max_results = query.max_results()))]
    async fn search(&self, query: &SearchQuery) -> Result<SearchResultSet> {
        info!(
            time_range = ?query.time_range(),
            raw_content = ?query.raw_content(),
            "searching"
        );
        let items = retry(self.retry, "tavily search", || self.search_once(query)).await?;
        debug!(results = items.len(), "search complete");
        Ok(SearchResultSet::new(query.clone(), items))
    }
}

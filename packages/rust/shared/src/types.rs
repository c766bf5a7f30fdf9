//! Core domain types for a newsletter run.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NewsletterError, Result};

/// Result cap used when a query does not set one.
pub const DEFAULT_MAX_RESULTS: u32 = 5;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Search query
// ---------------------------------------------------------------------------

/// How far back from today search results may have been published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

/// Search category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicCategory {
    /// Broad, general-purpose searches.
    General,
    /// Real-time updates from mainstream media.
    News,
    Finance,
}

/// Whether (and how) the search provider returns full page content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawContentMode {
    #[default]
    None,
    Text,
    Markdown,
}

/// An immutable, validated web search request.
///
/// Build one with [`SearchQuery::builder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    query: String,
    time_range: Option<TimeRange>,
    topic: Option<TopicCategory>,
    max_results: u32,
    raw_content: RawContentMode,
    include_domains: Option<BTreeSet<String>>,
}

impl SearchQuery {
    /// Start building a query for `text`.
    pub fn builder(text: impl Into<String>) -> SearchQueryBuilder {
        SearchQueryBuilder {
            query: text.into(),
            time_range: None,
            topic: None,
            max_results: DEFAULT_MAX_RESULTS,
            raw_content: RawContentMode::None,
            include_domains: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.query
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    pub fn topic(&self) -> Option<TopicCategory> {
        self.topic
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    pub fn raw_content(&self) -> RawContentMode {
        self.raw_content
    }

    pub fn include_domains(&self) -> Option<&BTreeSet<String>> {
        self.include_domains.as_ref()
    }
}

/// Builder for [`SearchQuery`].
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    query: String,
    time_range: Option<TimeRange>,
    topic: Option<TopicCategory>,
    max_results: u32,
    raw_content: RawContentMode,
    include_domains: Option<BTreeSet<String>>,
}

impl SearchQueryBuilder {
    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn topic(mut self, topic: TopicCategory) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }

    pub fn raw_content(mut self, mode: RawContentMode) -> Self {
        self.raw_content = mode;
        self
    }

    pub fn include_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and freeze the query.
    pub fn build(self) -> Result<SearchQuery> {
        if self.query.trim().is_empty() {
            return Err(NewsletterError::invalid_input("search query text is empty"));
        }
        if self.max_results == 0 {
            return Err(NewsletterError::invalid_input(
                "search max_results must be greater than zero",
            ));
        }

        Ok(SearchQuery {
            query: self.query,
            time_range: self.time_range,
            topic: self.topic,
            max_results: self.max_results,
            raw_content: self.raw_content,
            include_domains: self.include_domains,
        })
    }
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One normalized web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    /// Provider relevance score.
    #[serde(default)]
    pub score: f64,
}

/// The results of one search call, in the order the provider ranked them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultSet {
    pub query: SearchQuery,
    pub items: Vec<SearchResultItem>,
}

impl SearchResultSet {
    pub fn new(query: SearchQuery, items: Vec<SearchResultItem>) -> Self {
        Self { query, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

// ---------------------------------------------------------------------------
// Newsletter artifacts
// ---------------------------------------------------------------------------

/// Newsletter title plus the ordered section topics to research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPlan {
    pub title: String,
    pub topics: Vec<String>,
}

/// Drafted prose for one planned topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub topic: String,
    pub body: String,
}

/// Separator placed between section bodies when they are merged for editing.
pub const SECTION_SEPARATOR: &str = "\n\n\n";

/// All drafted sections, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsletterDraft {
    pub title: String,
    pub sections: Vec<SectionDraft>,
}

/// Join section bodies with [`SECTION_SEPARATOR`].
pub fn join_sections(sections: &[SectionDraft]) -> String {
    sections
        .iter()
        .map(|s| s.body.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

/// The edited newsletter, ready for (or already handed to) delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalNewsletter {
    pub title: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// A phase of the pipeline with its own input/output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Search,
    Plan,
    Draft,
    Edit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Plan => "plan",
            Self::Draft => "draft",
            Self::Edit => "edit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a pipeline run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Searching,
    Planning,
    Drafting { topics: usize },
    Editing,
    Done,
    Failed { stage: Stage, cause: String },
}

impl RunState {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Stages only advance forward one step at a time; `Failed` is reachable
    /// from every non-terminal state and nothing leaves `Done` or `Failed`.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Done | Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (Idle, Searching)
            | (Searching, Planning)
            | (Planning, Drafting { .. })
            | (Drafting { .. }, Editing)
            | (Editing, Done) => true,
            _ => false,
        }
    }

    /// The stage a failure in this state is attributed to.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Searching => Some(Stage::Search),
            Self::Planning => Some(Stage::Plan),
            Self::Drafting { .. } => Some(Stage::Draft),
            Self::Editing => Some(Stage::Edit),
            Self::Failed { stage, .. } => Some(*stage),
            Self::Idle | Self::Done => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Searching => f.write_str("searching"),
            Self::Planning => f.write_str("planning"),
            Self::Drafting { topics } => write!(f, "drafting {topics} sections"),
            Self::Editing => f.write_str("editing"),
            Self::Done => f.write_str("done"),
            Self::Failed { stage, cause } => write!(f, "failed during {stage}: {cause}"),
        }
    }
}

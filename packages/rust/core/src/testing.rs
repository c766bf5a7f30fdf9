//! In-crate mock adapters for stage and pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use newsletter_completion::{CompletionClient, CompletionRequest};
use newsletter_delivery::Deliverer;
use newsletter_search::SearchClient;
use newsletter_shared::{
    NewsletterError, Result, SearchQuery, SearchResultItem, SearchResultSet, SectionDraft,
};

use crate::research::ItemSerializer;

pub fn item(title: &str, url: &str) -> SearchResultItem {
    SearchResultItem {
        title: title.into(),
        url: url.into(),
        content: format!("Summary of {title}"),
        raw_content: None,
        score: 0.5,
    }
}

pub fn result_set(query: &str, items: Vec<SearchResultItem>) -> SearchResultSet {
    SearchResultSet::new(SearchQuery::builder(query).build().unwrap(), items)
}

pub fn section(topic: &str, body: &str) -> SectionDraft {
    SectionDraft {
        topic: topic.into(),
        body: body.into(),
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

type ReplyFn = dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync;

/// Completion client answering from a closure, recording every request.
///
/// Requests that carry tools count as edit calls; if a tool script is set,
/// the named arguments are passed to the request's first tool that many
/// times before replying.
pub struct ScriptedCompletion {
    reply: Box<ReplyFn>,
    delay: Option<Duration>,
    tool_script: Mutex<Option<(serde_json::Value, usize)>>,
    requests: Mutex<Vec<CompletionRequest>>,
    tool_outputs: Mutex<Vec<String>>,
    edit_calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn replying<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self::build(Box::new(reply), None))
    }

    pub fn replying_after<F>(delay: Duration, reply: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self::build(Box::new(reply), Some(delay)))
    }

    fn build(reply: Box<ReplyFn>, delay: Option<Duration>) -> Self {
        Self {
            reply,
            delay,
            tool_script: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            tool_outputs: Mutex::new(Vec::new()),
            edit_calls: AtomicUsize::new(0),
        }
    }

    /// Invoke the request's tool `times` times with `arguments` on tool-carrying calls.
    pub fn calling_tool(self: Arc<Self>, arguments: serde_json::Value, times: usize) -> Arc<Self> {
        *self.tool_script.lock().unwrap() = Some((arguments, times));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn edit_calls(&self) -> usize {
        self.edit_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn tool_outputs(&self) -> Vec<String> {
        self.tool_outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(tool) = request.tools.first() {
            self.edit_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.tool_script.lock().unwrap().clone();
            if let Some((arguments, times)) = script {
                for _ in 0..times {
                    let output = tool.call(arguments.clone()).await;
                    self.tool_outputs.lock().unwrap().push(output);
                }
            }
        }

        (self.reply)(request)
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

type SearchFn = dyn Fn(&SearchQuery) -> Result<Vec<SearchResultItem>> + Send + Sync;

/// Search client answering from a closure, with optional per-query delays.
pub struct MockSearch {
    respond: Box<SearchFn>,
    delays: Mutex<HashMap<String, Duration>>,
    queries: Mutex<Vec<SearchQuery>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSearch {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&SearchQuery) -> Result<Vec<SearchResultItem>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            delays: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn with_delay(self: Arc<Self>, query: &str, delay: Duration) -> Arc<Self> {
        self.delays.lock().unwrap().insert(query.into(), delay);
        self
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }

    /// Highest number of searches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchClient for MockSearch {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResultSet> {
        self.queries.lock().unwrap().push(query.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(query.text()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = (self.respond)(query);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(SearchResultSet::new(query.clone(), result?))
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Deliverer that counts calls and optionally fails every one.
pub struct RecordingDeliverer {
    fail: bool,
    subjects: Mutex<Vec<String>>,
}

impl RecordingDeliverer {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            subjects: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            subjects: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.subjects.lock().unwrap().len()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(&self, subject: &str, _body: &str) -> Result<()> {
        self.subjects.lock().unwrap().push(subject.into());
        if self.fail {
            return Err(NewsletterError::Delivery("SMTP connection refused".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serializer that fails for chosen URLs (or for everything).
pub struct FailingOn {
    urls: Option<HashSet<String>>,
}

impl FailingOn {
    pub fn urls<const N: usize>(urls: [&str; N]) -> Self {
        Self {
            urls: Some(urls.iter().map(|u| u.to_string()).collect()),
        }
    }

    pub fn all() -> Self {
        Self { urls: None }
    }
}

impl ItemSerializer for FailingOn {
    fn serialize(&self, item: &SearchResultItem) -> Result<String> {
        let fails = match &self.urls {
            Some(urls) => urls.contains(&item.url),
            None => true,
        };
        if fails {
            return Err(NewsletterError::Serialization(format!("cannot encode {}", item.url)));
        }
        serde_json::to_string(item).map_err(|e| NewsletterError::Serialization(e.to_string()))
    }
}

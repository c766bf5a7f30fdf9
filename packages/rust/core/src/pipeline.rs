//! End-to-end newsletter run: seed search → plan → parallel drafting → edit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use newsletter_completion::CompletionClient;
use newsletter_delivery::Deliverer;
use newsletter_search::SearchClient;
use newsletter_shared::{
    FinalNewsletter, NewsletterDraft, NewsletterError, PipelineConfig, RawContentMode, Result,
    RunId, RunState, SearchQuery, SearchResultSet, SectionDraft, Stage, TimeRange, TopicPlan,
};

use crate::editor::Editor;
use crate::planner::TopicPlanner;
use crate::prompts::PromptSet;
use crate::research::search_with_timeout;
use crate::writer::SectionWriter;

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub plan: TopicPlan,
    pub newsletter: FinalNewsletter,
    pub elapsed: Duration,
}

/// A run that ended in `Failed`: which run, which stage, and why.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} failed during {stage}: {source}")]
pub struct RunFailed {
    pub run_id: RunId,
    pub stage: Stage,
    #[source]
    pub source: NewsletterError,
}

impl RunFailed {
    /// Topic of the drafting unit that failed, if any.
    pub fn topic(&self) -> Option<&str> {
        self.source.topic()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition, including `Failed`.
    fn state(&self, state: &RunState);
    /// Called each time a section draft completes.
    fn section_drafted(&self, topic: &str, done: usize, total: usize);
    /// Called when the run completes successfully.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state(&self, _state: &RunState) {}
    fn section_drafted(&self, _topic: &str, _done: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Walks the run through `RunState`, rejecting illegal transitions.
struct RunTracker<'a> {
    run_id: RunId,
    state: RunState,
    progress: &'a dyn ProgressReporter,
}

impl<'a> RunTracker<'a> {
    fn new(run_id: RunId, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            progress,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(run_id = %self.run_id, from = %self.state, to = %next, "state transition");
        self.state = next;
        self.progress.state(&self.state);
    }

    /// Move to `Failed`, attributing the error to the current stage.
    fn fail(&mut self, source: NewsletterError) -> RunFailed {
        let stage = self.state.stage().unwrap_or(Stage::Search);
        error!(run_id = %self.run_id, %stage, error = %source, "run failed");
        self.advance(RunState::Failed {
            stage,
            cause: source.to_string(),
        });
        RunFailed {
            run_id: self.run_id,
            stage,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The newsletter workflow, wired to concrete adapters.
pub struct Pipeline {
    search: Arc<dyn SearchClient>,
    planner: TopicPlanner,
    writer: Arc<SectionWriter>,
    editor: Editor,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        search: Arc<dyn SearchClient>,
        completion: Arc<dyn CompletionClient>,
        deliverer: Arc<dyn Deliverer>,
        prompts: PromptSet,
        config: PipelineConfig,
    ) -> Self {
        let prompts = Arc::new(prompts);
        let timeout = config.call_timeout;

        Self {
            search,
            planner: TopicPlanner::new(Arc::clone(&completion), Arc::clone(&prompts))
                .with_call_timeout(timeout),
            writer: Arc::new(
                SectionWriter::new(Arc::clone(&completion), Arc::clone(&prompts))
                    .with_call_timeout(timeout),
            ),
            editor: Editor::new(completion, deliverer, prompts).with_call_timeout(timeout),
            config,
        }
    }

    /// Replace the editor, e.g. to pin its date.
    pub fn with_editor(mut self, editor: Editor) -> Self {
        self.editor = editor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole workflow once.
    ///
    /// Dropping the returned future cancels the run, including every
    /// in-flight drafting unit. Nothing is retried at this level.
    #[instrument(skip_all, fields(seed_query = %self.config.seed_query))]
    pub async fn run_once(
        &self,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<RunReport, RunFailed> {
        let start = Instant::now();
        let mut run = RunTracker::new(RunId::new(), progress);
        info!(run_id = %run.run_id, "starting newsletter run");

        // --- Search ---
        run.advance(RunState::Searching);
        let seed = match self.seed_search().await {
            Ok(results) => results,
            Err(e) => return Err(run.fail(e)),
        };
        info!(results = seed.len(), "seed search complete");

        // --- Plan ---
        run.advance(RunState::Planning);
        let plan = match self.planner.plan(&seed).await {
            Ok(plan) => plan,
            Err(e) => return Err(run.fail(e)),
        };

        // --- Draft ---
        run.advance(RunState::Drafting {
            topics: plan.topics.len(),
        });
        let draft = match self.draft_sections(&plan, progress).await {
            Ok(draft) => draft,
            Err(e) => return Err(run.fail(e)),
        };

        // --- Edit ---
        run.advance(RunState::Editing);
        let newsletter = match self.editor.edit(&draft.sections, &draft.title).await {
            Ok(newsletter) => newsletter,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(RunState::Done);
        let report = RunReport {
            run_id: run.run_id,
            plan,
            newsletter,
            elapsed: start.elapsed(),
        };

        info!(
            run_id = %report.run_id,
            title = %report.newsletter.title,
            sections = report.plan.topics.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "newsletter run complete"
        );
        progress.done(&report);
        Ok(report)
    }

    async fn seed_search(&self) -> Result<SearchResultSet> {
        let query = SearchQuery::builder(self.config.seed_query.as_str())
            .time_range(TimeRange::Week)
            .max_results(self.config.seed_max_results)
            .build()?;
        search_with_timeout(self.search.as_ref(), &query, self.config.call_timeout).await
    }

    /// Fan out one research+write unit per topic and join them back in plan order.
    #[instrument(skip_all, fields(topics = plan.topics.len()))]
    async fn draft_sections(
        &self,
        plan: &TopicPlan,
        progress: &dyn ProgressReporter,
    ) -> Result<NewsletterDraft> {
        let total = plan.topics.len();
        let permits = self.config.max_concurrency.unwrap_or(total).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        info!(total, permits, "drafting sections");

        let mut units = JoinSet::new();
        for (index, topic) in plan.topics.iter().cloned().enumerate() {
            let search = Arc::clone(&self.search);
            let writer = Arc::clone(&self.writer);
            let semaphore = Arc::clone(&semaphore);
            let max_results = self.config.topic_max_results;
            let call_timeout = self.config.call_timeout;

            units.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        draft_section(search.as_ref(), &writer, &topic, max_results, call_timeout)
                            .await
                    }
                    Err(_) => Err(NewsletterError::section_write_failed(
                        &topic,
                        NewsletterError::Internal("drafting semaphore closed".into()),
                    )),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<SectionDraft>> = vec![None; total];
        let mut first_error: Option<NewsletterError> = None;
        let mut completed = 0usize;

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((index, Ok(draft))) => {
                    completed += 1;
                    progress.section_drafted(&draft.topic, completed, total);
                    slots[index] = Some(draft);
                }
                Ok((index, Err(e))) => {
                    warn!(index, error = %e, "section unit failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                        if self.config.fail_fast {
                            units.abort_all();
                        }
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    warn!(error = %join_err, "section unit panicked");
                    first_error.get_or_insert_with(|| {
                        NewsletterError::Internal(format!("drafting task panicked: {join_err}"))
                    });
                    if self.config.fail_fast {
                        units.abort_all();
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let sections = slots
            .into_iter()
            .zip(&plan.topics)
            .map(|(slot, topic)| {
                slot.ok_or_else(|| {
                    NewsletterError::Internal(format!("no draft produced for topic {topic:?}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NewsletterDraft {
            title: plan.title.clone(),
            sections,
        })
    }
}

/// One drafting unit: topic search, then section writing.
async fn draft_section(
    search: &dyn SearchClient,
    writer: &SectionWriter,
    topic: &str,
    max_results: u32,
    call_timeout: Duration,
) -> Result<SectionDraft> {
    let query = SearchQuery::builder(topic)
        .time_range(TimeRange::Month)
        .max_results(max_results)
        .raw_content(RawContentMode::Text)
        .build()
        .map_err(|e| NewsletterError::section_write_failed(topic, e))?;

    let results = search_with_timeout(search, &query, call_timeout)
        .await
        .map_err(|e| NewsletterError::section_write_failed(topic, e))?;

    writer.write(&results, topic).await
}

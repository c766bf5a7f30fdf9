//! Topic planning: seed search results in, newsletter title and section topics out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use newsletter_completion::{CompletionClient, CompletionRequest};
use newsletter_shared::{NewsletterError, Result, SearchResultSet, TopicPlan};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::output::{JsonFormat, OutputFormat};
use crate::prompts::PromptSet;
use crate::research::{
    ItemSerializer, JsonItemSerializer, complete_with_timeout, serialize_results,
};

/// Asks the model for a [`TopicPlan`] covering a set of search results.
pub struct TopicPlanner {
    completion: Arc<dyn CompletionClient>,
    serializer: Arc<dyn ItemSerializer>,
    prompts: Arc<PromptSet>,
    format: JsonFormat<TopicPlan>,
    call_timeout: Duration,
}

impl TopicPlanner {
    pub fn new(completion: Arc<dyn CompletionClient>, prompts: Arc<PromptSet>) -> Self {
        Self {
            completion,
            serializer: Arc::new(JsonItemSerializer),
            prompts,
            format: JsonFormat::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ItemSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Plan one newsletter issue.
    ///
    /// Empty results are rejected with `InvalidInput` before any model call.
    /// Every later failure is reported as `PlanningFailed`.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn plan(&self, results: &SearchResultSet) -> Result<TopicPlan> {
        if results.is_empty() {
            return Err(NewsletterError::invalid_input(
                "search returned no results to plan from",
            ));
        }

        let plan = self
            .plan_inner(results)
            .await
            .map_err(NewsletterError::planning_failed)?;

        info!(title = %plan.title, topics = plan.topics.len(), "newsletter planned");
        Ok(plan)
    }

    async fn plan_inner(&self, results: &SearchResultSet) -> Result<TopicPlan> {
        let research = serialize_results(self.serializer.as_ref(), &results.items)?;
        let system = format!(
            "{}\n\n{}",
            self.prompts.planner_system.trim_end(),
            self.format.format_instructions()
        );

        let request = CompletionRequest::new(system, research);
        let raw =
            complete_with_timeout(self.completion.as_ref(), &request, self.call_timeout).await?;
        self.format.parse(&raw)
    }
}

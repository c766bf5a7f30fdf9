//! Drafting one newsletter section from topic-specific research.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use newsletter_completion::{CompletionClient, CompletionRequest};
use newsletter_shared::{NewsletterError, Result, SearchResultSet, SectionDraft};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::output::{OutputFormat, PlainTextFormat};
use crate::prompts::{PromptSet, render};
use crate::research::{
    ItemSerializer, JsonItemSerializer, complete_with_timeout, serialize_results,
};

/// Writes the prose for a single planned topic.
pub struct SectionWriter {
    completion: Arc<dyn CompletionClient>,
    serializer: Arc<dyn ItemSerializer>,
    prompts: Arc<PromptSet>,
    call_timeout: Duration,
}

impl SectionWriter {
    pub fn new(completion: Arc<dyn CompletionClient>, prompts: Arc<PromptSet>) -> Self {
        Self {
            completion,
            serializer: Arc::new(JsonItemSerializer),
            prompts,
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

    /// Draft the section for `topic`. Every failure, including empty research,
    /// is a `SectionWriteFailed` naming the topic.
    #[instrument(skip_all, fields(topic = %topic, results = results.len()))]
    pub async fn write(&self, results: &SearchResultSet, topic: &str) -> Result<SectionDraft> {
        if results.is_empty() {
            return Err(NewsletterError::section_write_failed(
                topic,
                NewsletterError::invalid_input("no research results for topic"),
            ));
        }

        let body = self
            .write_inner(results, topic)
            .await
            .map_err(|e| NewsletterError::section_write_failed(topic, e))?;

        debug!(chars = body.len(), "section drafted");
        Ok(SectionDraft {
            topic: topic.to_string(),
            body,
        })
    }

    async fn write_inner(&self, results: &SearchResultSet, topic: &str) -> Result<String> {
        let research = serialize_results(self.serializer.as_ref(), &results.items)?;
        let user = render(
            &self.prompts.writer_user,
            &[("topic", topic), ("research", &research)],
        );

        let request = CompletionRequest::new(self.prompts.writer_system.clone(), user);
        let raw =
            complete_with_timeout(self.completion.as_ref(), &request, self.call_timeout).await?;
        PlainTextFormat.parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingOn, ScriptedCompletion, item, result_set};

    fn writer(completion: &Arc<ScriptedCompletion>) -> SectionWriter {
        SectionWriter::new(completion.clone(), Arc::new(PromptSet::default()))
    }

    #[tokio::test]
    async fn drafts_section_with_topic_and_research() {
        let completion = ScriptedCompletion::replying(|_| {
            Ok("<think>outline</think>\n## Vector databases\nThey are everywhere.".into())
        });
        let results = result_set(
            "Vector databases",
            vec![item("pgvector 0.8", "https://example.com/pgvector")],
        );

        let draft = writer(&completion)
            .write(&results, "Vector databases")
            .await
            .unwrap();
        assert_eq!(draft.topic, "Vector databases");
        assert_eq!(draft.body, "## Vector databases\nThey are everywhere.");

        let request = completion.last_request().unwrap();
        assert_eq!(request.system, PromptSet::default().writer_system);
        assert!(request.user.contains("topic: Vector databases"));
        assert!(request.user.contains("pgvector 0.8"));
    }

    #[tokio::test]
    async fn empty_results_are_invalid_input_with_no_calls() {
        let completion = ScriptedCompletion::replying(|_| Ok("body".into()));
        let results = result_set("Fine-tuning", vec![]);

        let err = writer(&completion)
            .write(&results, "Fine-tuning")
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(err.topic(), Some("Fine-tuning"));
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn completion_failure_names_topic() {
        let completion =
            ScriptedCompletion::replying(|_| Err(NewsletterError::Completion("HTTP 502".into())));
        let results = result_set("Agentic workflows", vec![item("a", "https://a")]);

        let err = writer(&completion)
            .write(&results, "Agentic workflows")
            .await
            .unwrap_err();
        assert_eq!(err.topic(), Some("Agentic workflows"));
        assert!(matches!(err.root_cause(), NewsletterError::Completion(_)));
        assert!(!err.is_invalid_input());
    }

    #[tokio::test]
    async fn unserializable_item_is_dropped_from_research() {
        let completion = ScriptedCompletion::replying(|_| Ok("body".into()));
        let items: Vec<_> = (1..=5)
            .map(|i| item(&format!("result {i}"), &format!("https://example.com/{i}")))
            .collect();
        let results = result_set("Vector databases", items);

        writer(&completion)
            .with_serializer(Arc::new(FailingOn::urls(["https://example.com/4"])))
            .write(&results, "Vector databases")
            .await
            .unwrap();

        let user = completion.last_request().unwrap().user;
        for i in [1, 2, 3, 5] {
            assert!(user.contains(&format!("result {i}")), "missing result {i}");
        }
        assert!(!user.contains("result 4"));
    }

    #[tokio::test]
    async fn all_unserializable_is_section_failure() {
        let completion = ScriptedCompletion::replying(|_| Ok("body".into()));
        let results = result_set("t", vec![item("a", "https://a")]);

        let err = writer(&completion)
            .with_serializer(Arc::new(FailingOn::all()))
            .write(&results, "t")
            .await
            .unwrap_err();
        assert!(matches!(err, NewsletterError::SectionWriteFailed { .. }));
        assert!(matches!(err.root_cause(), NewsletterError::Serialization(_)));
        assert_eq!(completion.calls(), 0);
    }
}

//! Final edit of the merged draft, with delivery exposed to the model as a tool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use newsletter_completion::{CompletionClient, CompletionRequest, Tool, ToolDefinition};
use newsletter_delivery::Deliverer;
use newsletter_shared::{FinalNewsletter, NewsletterError, Result, SectionDraft, join_sections};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::output::{OutputFormat, PlainTextFormat};
use crate::prompts::{PromptSet, render};
use crate::research::complete_with_timeout;

pub const SEND_EMAIL_TOOL: &str = "send_email";

// ---------------------------------------------------------------------------
// Delivery tool
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SendEmailArgs {
    subject: String,
    content: String,
}

/// Lets the model send the newsletter. Sends at most once per edit; failures
/// are logged and reported back as text, never raised.
pub struct SendEmailTool {
    deliverer: Arc<dyn Deliverer>,
    sent: AtomicBool,
}

impl SendEmailTool {
    pub fn new(deliverer: Arc<dyn Deliverer>) -> Self {
        Self {
            deliverer,
            sent: AtomicBool::new(false),
        }
    }

    pub fn was_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEND_EMAIL_TOOL.into(),
            description: "Send the finished newsletter to its subscribers as an HTML email. \
                          Call this once, after the newsletter is final."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "subject": {
                        "type": "string",
                        "description": "Email subject, usually the newsletter title"
                    },
                    "content": {
                        "type": "string",
                        "description": "The complete newsletter as HTML"
                    }
                },
                "required": ["subject", "content"]
            }),
        }
    }

    async fn call(&self, arguments: serde_json::Value) -> String {
        let args: SendEmailArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(error = %e, "send_email called with malformed arguments");
                return format!("Email not sent: invalid arguments ({e}).");
            }
        };

        if self.sent.swap(true, Ordering::SeqCst) {
            warn!("send_email called again; ignoring");
            return "Email was already sent for this issue; not sending again.".into();
        }

        match self.deliverer.deliver(&args.subject, &args.content).await {
            Ok(()) => {
                info!(subject = %args.subject, "newsletter email sent");
                "Email sent successfully.".into()
            }
            Err(e) => {
                warn!(error = %e, "failed to send newsletter email");
                format!("Failed to send email: {e}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// Merges drafted sections into the final newsletter.
pub struct Editor {
    completion: Arc<dyn CompletionClient>,
    deliverer: Arc<dyn Deliverer>,
    prompts: Arc<PromptSet>,
    call_timeout: Duration,
    today: Option<NaiveDate>,
}

impl Editor {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        deliverer: Arc<dyn Deliverer>,
        prompts: Arc<PromptSet>,
    ) -> Self {
        Self {
            completion,
            deliverer,
            prompts,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            today: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Pin the date shown to the model instead of using the local clock.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.today = Some(date);
        self
    }

    /// Edit `sections` (kept in the given order) under `title`.
    ///
    /// Every failure is reported as `EditFailed`.
    #[instrument(skip_all, fields(title = %title, sections = sections.len()))]
    pub async fn edit(&self, sections: &[SectionDraft], title: &str) -> Result<FinalNewsletter> {
        let body = self
            .edit_inner(sections, title)
            .await
            .map_err(NewsletterError::edit_failed)?;

        info!(chars = body.len(), "newsletter edited");
        Ok(FinalNewsletter {
            title: title.to_string(),
            body,
        })
    }

    async fn edit_inner(&self, sections: &[SectionDraft], title: &str) -> Result<String> {
        let date = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();
        let merged = join_sections(sections);

        let system = render(&self.prompts.editor_system, &[("date", &date)]);
        let user = render(
            &self.prompts.editor_user,
            &[("title", title), ("sections", &merged)],
        );

        let tool = Arc::new(SendEmailTool::new(Arc::clone(&self.deliverer)));
        let request = CompletionRequest::new(system, user).with_tool(tool.clone());

        let result = self.complete_edit(&request).await;
        match (&result, tool.was_sent()) {
            (Err(e), true) => {
                warn!(error = %e, "newsletter email was already sent but the edit failed")
            }
            (Ok(_), false) => info!("editor finished without sending the newsletter"),
            _ => {}
        }
        result
    }

    async fn complete_edit(&self, request: &CompletionRequest) -> Result<String> {
        let raw =
            complete_with_timeout(self.completion.as_ref(), request, self.call_timeout).await?;

        let body = PlainTextFormat.parse(&raw)?;
        if body.is_empty() {
            return Err(NewsletterError::parse(
                "editor returned an empty newsletter",
                raw,
            ));
        }
        Ok(body)
    }
}

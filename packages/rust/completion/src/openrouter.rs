//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use newsletter_shared::{
    CompletionSettings, NewsletterError, Result, RetryError, RetryPolicy, read_secret, retry,
};

use crate::{CompletionClient, CompletionRequest, ToolDefinition};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("newsletter-agent/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    r#type: &'static str,
    function: ToolDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".into(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(default = "default_call_type")]
    r#type: String,
    function: FunctionCall,
}

fn default_call_type() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments, as a string.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`CompletionClient`] for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenRouterClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tool_rounds: u32,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Build a client from config, reading the API key from the configured env var.
    pub fn from_settings(settings: &CompletionSettings) -> Result<Self> {
        let api_key = read_secret(&settings.api_key_env, "completion API key")?;
        Self::new(settings, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn new(settings: &CompletionSettings, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            NewsletterError::config(format!(
                "invalid completion base_url {:?}: {e}",
                settings.base_url
            ))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                NewsletterError::Completion(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tool_rounds: settings.max_tool_rounds,
            retry: settings.retry_policy(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> std::result::Result<ChatMessage, RetryError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            tools: tools
                .iter()
                .cloned()
                .map(|function| ToolSpec {
                    r#type: "function",
                    function,
                })
                .collect(),
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = NewsletterError::Completion(format!("{}: {e}", self.endpoint));
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    RetryError::Transient(err)
                } else {
                    RetryError::Permanent(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = NewsletterError::Completion(format!(
                "HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            ));
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    RetryError::Transient(err)
                } else {
                    RetryError::Permanent(err)
                },
            );
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            RetryError::Permanent(NewsletterError::Completion(format!(
                "failed to decode response: {e}"
            )))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                RetryError::Permanent(NewsletterError::Completion(
                    "response contained no choices".into(),
                ))
            })
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, tools = request.tools.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let definitions: Vec<ToolDefinition> =
            request.tools.iter().map(|t| t.definition()).collect();

        let mut messages = vec![
            ChatMessage::text("system", request.system.as_str()),
            ChatMessage::text("user", request.user.as_str()),
        ];

        let mut round = 0u32;
        loop {
            let reply = retry(self.retry, "chat completion", || {
                self.send_once(&messages, &definitions)
            })
            .await?;

            let calls = match &reply.tool_calls {
                Some(calls) if !calls.is_empty() && request.has_tools() => calls.clone(),
                _ => {
                    let content = reply.content.unwrap_or_default();
                    if content.trim().is_empty() {
                        return Err(NewsletterError::Completion(
                            "response contained no content".into(),
                        ));
                    }
                    debug!(rounds = round, chars = content.len(), "completion finished");
                    return Ok(content);
                }
            };

            if round >= self.max_tool_rounds {
                return Err(NewsletterError::Completion(format!(
                    "model still requesting tools after {} tool rounds",
                    self.max_tool_rounds
                )));
            }
            round += 1;

            messages.push(reply);
            for call in calls {
                let output = dispatch(request, &call).await;
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }
    }
}

/// Run one requested tool call, reporting problems back to the model as text.
async fn dispatch(request: &CompletionRequest, call: &ToolCall) -> String {
    let name = call.function.name.as_str();
    let Some(tool) = request.tool(name) else {
        warn!(tool = %name, "model requested unknown tool");
        return format!("error: unknown tool {name:?}");
    };

    let raw = if call.function.arguments.trim().is_empty() {
        "{}"
    } else {
        call.function.arguments.as_str()
    };
    let arguments: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(tool = %name, error = %e, "tool arguments are not valid JSON");
            return format!("error: invalid arguments for {name}: {e}");
        }
    };

    info!(tool = %name, "invoking tool");
    tool.call(arguments).await
}

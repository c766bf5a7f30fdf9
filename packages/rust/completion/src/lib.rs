//! Language-model completion adapters for the newsletter pipeline.
//!
//! A [`CompletionRequest`] carries a system message, a user message and an
//! optional set of [`Tool`]s the model may invoke before producing its final
//! text. [`OpenRouterClient`] speaks the OpenAI-compatible chat completions
//! protocol and runs the tool-call loop.

pub mod openrouter;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use newsletter_shared::Result;

pub use openrouter::OpenRouterClient;

/// Describes a tool to the model: name, purpose and a JSON-schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A side-effecting capability the model may call mid-completion.
///
/// `call` returns the text reported back to the model. Tools handle their own
/// failures and describe them in that text rather than aborting the completion.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, arguments: serde_json::Value) -> String;
}

/// One completion: instructions, input and available tools.
#[derive(Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub tools: Vec<Arc<dyn Tool>>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Find a registered tool by name.
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("system_len", &self.system.len())
            .field("user_len", &self.user.len())
            .field(
                "tools",
                &self.tools.iter().map(|t| t.definition().name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Capability to turn a request into the model's final text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

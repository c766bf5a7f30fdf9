//! Structured output parsing for model replies.
//!
//! Models are allowed to reason inside `<think>…</think>` blocks before they
//! answer. Every reply goes through [`strip_scaffold`] first; the remainder is
//! then interpreted by an [`OutputFormat`].

use std::marker::PhantomData;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use newsletter_shared::{NewsletterError, Result, TopicPlan};

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Remove every `<think>…</think>` block and trim the result.
///
/// Runs to a fixed point, so `strip_scaffold(strip_scaffold(x)) == strip_scaffold(x)`
/// even when removing one block splices a new one together.
pub fn strip_scaffold(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = THINK_RE.replace_all(&current, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

/// How a completion reply is described to the model and read back.
pub trait OutputFormat: Send + Sync {
    type Output;

    /// Text appended to the system prompt describing the expected reply.
    fn format_instructions(&self) -> String;

    fn parse(&self, raw: &str) -> Result<Self::Output>;
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// A type a model can be asked to produce as a JSON object.
pub trait JsonShape: DeserializeOwned {
    /// Plain-language description of the fields.
    const SHAPE: &'static str;
    /// A literal example object.
    const EXAMPLE: &'static str;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl JsonShape for TopicPlan {
    const SHAPE: &'static str = "\"title\" (the newsletter title, a non-empty string) and \
         \"topics\" (a non-empty array of section topic strings, in the order the sections \
         should appear)";
    const EXAMPLE: &'static str = r#"{"title": "Weekly Tech Digest", "topics": ["Agentic workflows", "Vector databases", "Fine-tuning"]}"#;

    fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is empty".into());
        }
        if self.topics.is_empty() {
            return Err("topics list is empty".into());
        }
        if let Some(i) = self.topics.iter().position(|t| t.trim().is_empty()) {
            return Err(format!("topic #{} is empty", i + 1));
        }
        Ok(())
    }
}

/// Parses a reply as one JSON object of type `T`.
#[derive(Debug)]
pub struct JsonFormat<T> {
    _shape: PhantomData<fn() -> T>,
}

impl<T> JsonFormat<T> {
    pub fn new() -> Self {
        Self {
            _shape: PhantomData,
        }
    }
}

impl<T> Default for JsonFormat<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: JsonShape> OutputFormat for JsonFormat<T> {
    type Output = T;

    fn format_instructions(&self) -> String {
        format!(
            "Respond with a VALID JSON OBJECT containing {shape}.\n\
             Example:\n{example}\n\n\
             CRITICAL RULES:\n\
             - Output ONLY the JSON object, with no text before or after it.\n\
             - If you need to reason, do it inside <think></think> tags BEFORE the JSON.\n\
             - The JSON must be valid: double-quoted keys and strings, no trailing commas.",
            shape = T::SHAPE,
            example = T::EXAMPLE,
        )
    }

    fn parse(&self, raw: &str) -> Result<T> {
        let stripped = strip_scaffold(raw);
        let body = strip_code_fence(&stripped);

        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| NewsletterError::parse(format!("invalid JSON: {e}"), raw))?;
        if !value.is_object() {
            return Err(NewsletterError::parse("expected a JSON object", raw));
        }

        let parsed: T = serde_json::from_value(value)
            .map_err(|e| NewsletterError::parse(format!("unexpected JSON shape: {e}"), raw))?;
        parsed
            .validate()
            .map_err(|msg| NewsletterError::parse(msg, raw))?;
        Ok(parsed)
    }
}

/// Drop a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. `json`) on the opening line.
    match rest.find('\n') {
        Some(idx) => rest[idx + 1..].trim(),
        None => rest.trim(),
    }
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// Free-form prose; only the scaffold is removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextFormat;

impl OutputFormat for PlainTextFormat {
    type Output = String;

    fn format_instructions(&self) -> String {
        String::new()
    }

    fn parse(&self, raw: &str) -> Result<String> {
        Ok(strip_scaffold(raw))
    }
}

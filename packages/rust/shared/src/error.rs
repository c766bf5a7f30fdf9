//! Error types for the newsletter pipeline.
//!
//! Library crates use [`NewsletterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Adapter failures (`Search`, `Completion`, `Delivery`) are leaf errors.
//! Each pipeline stage wraps whatever went wrong inside it exactly once
//! (`PlanningFailed`, `SectionWriteFailed`, `EditFailed`), so the cause chain
//! is always `stage wrap -> leaf`.

use std::path::PathBuf;

/// Top-level error type for all newsletter operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsletterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A precondition was violated before any external call was made.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Web search adapter failure (transport, status, decoding, timeout).
    #[error("search error: {0}")]
    Search(String),

    /// Language-model completion adapter failure.
    #[error("completion error: {0}")]
    Completion(String),

    /// Model output did not match the declared shape.
    #[error("parse error: {message} (raw output: {raw:?})")]
    Parse { message: String, raw: String },

    /// No search result item could be serialized into prompt text.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Outbound email delivery failure.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A pipeline invariant broke (e.g. a drafting task panicked).
    #[error("internal error: {0}")]
    Internal(String),

    /// The topic planning stage failed.
    #[error("planning failed: {0}")]
    PlanningFailed(#[source] Box<NewsletterError>),

    /// Drafting the section for one topic failed.
    #[error("section write failed for topic {topic:?}: {source}")]
    SectionWriteFailed {
        topic: String,
        #[source]
        source: Box<NewsletterError>,
    },

    /// The edit/publish stage failed.
    #[error("edit failed: {0}")]
    EditFailed(#[source] Box<NewsletterError>),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsletterError>;

impl NewsletterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a parse error that keeps the offending model output.
    pub fn parse(msg: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
            raw: raw.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a cause as a planning-stage failure.
    pub fn planning_failed(cause: NewsletterError) -> Self {
        Self::PlanningFailed(Box::new(cause))
    }

    /// Wrap a cause as a section-writing failure for `topic`.
    pub fn section_write_failed(topic: impl Into<String>, cause: NewsletterError) -> Self {
        Self::SectionWriteFailed {
            topic: topic.into(),
            source: Box::new(cause),
        }
    }

    /// Wrap a cause as an edit-stage failure.
    pub fn edit_failed(cause: NewsletterError) -> Self {
        Self::EditFailed(Box::new(cause))
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root_cause(&self) -> &NewsletterError {
        match self {
            Self::PlanningFailed(inner) | Self::EditFailed(inner) => inner.root_cause(),
            Self::SectionWriteFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this failure is (or wraps) a violated precondition.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self.root_cause(), Self::InvalidInput { .. })
    }

    /// Topic the failure is attributed to, if it came from a drafting unit.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::SectionWriteFailed { topic, .. } => Some(topic),
            _ => None,
        }
    }
}

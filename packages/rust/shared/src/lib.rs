//! Shared types, error model, and configuration for the newsletter agent.
//!
//! This crate is the foundation depended on by all other newsletter crates.
//! It provides:
//! - [`NewsletterError`], the unified error type
//! - Domain types ([`SearchQuery`], [`TopicPlan`], [`SectionDraft`], [`RunState`], ...)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - [`retry`] with exponential backoff for adapter calls

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionSettings, DeliverySettings, PipelineConfig, PipelineSettings,
    PromptSettings, SearchSettings, SmtpTls, config_dir, config_file_path, init_config,
    load_config, load_config_from, read_secret, validate_api_keys, validate_delivery,
};
pub use error::{NewsletterError, Result};
pub use retry::{RetryError, RetryPolicy, retry};
pub use types::{
    DEFAULT_MAX_RESULTS, FinalNewsletter, NewsletterDraft, RawContentMode, RunId, RunState,
    SECTION_SEPARATOR, SearchQuery, SearchQueryBuilder, SearchResultItem, SearchResultSet,
    SectionDraft, Stage, TimeRange, TopicCategory, TopicPlan, join_sections,
};

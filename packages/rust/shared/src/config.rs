//! Application configuration for the newsletter agent.
//!
//! User config lives at `~/.newsletter/newsletter.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NewsletterError, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsletter.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsletter";

// ---------------------------------------------------------------------------
// Config structs (matching newsletter.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web search provider.
    #[serde(default)]
    pub search: SearchSettings,

    /// Language-model provider.
    #[serde(default)]
    pub completion: CompletionSettings,

    /// Outbound email.
    #[serde(default)]
    pub delivery: DeliverySettings,

    /// Orchestration knobs.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Prompt template overrides.
    #[serde(default)]
    pub prompts: PromptSettings,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Search API base URL (`/search` is appended).
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,

    /// HTTP timeout per request.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures (429, 5xx, timeouts).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay between retries.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key_env: default_search_api_key_env(),
            timeout_secs: default_search_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SearchSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }
}

fn default_search_base_url() -> String {
    "https://api.tavily.com".into()
}
fn default_search_api_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    500
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// OpenAI-compatible API base URL (`/chat/completions` is appended).
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_completion_api_key_env")]
    pub api_key_env: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; provider default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// HTTP timeout per request.
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Maximum tool-call round trips inside a single completion.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            api_key_env: default_completion_api_key_env(),
            model: default_model(),
            temperature: None,
            timeout_secs: default_completion_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl CompletionSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }
}

fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_completion_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_completion_timeout() -> u64 {
    120
}
fn default_max_tool_rounds() -> u32 {
    4
}

/// SMTP connection security.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (usually port 587).
    #[default]
    Starttls,
    /// Implicit TLS (usually port 465).
    Tls,
    /// No encryption; local relays and test servers only.
    None,
}

/// `[delivery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySettings {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub tls: SmtpTls,

    /// SMTP login; defaults to the sender address when empty.
    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the SMTP password.
    #[serde(default = "default_smtp_password_env")]
    pub password_env: String,

    /// From address.
    #[serde(default)]
    pub sender: String,

    /// To address.
    #[serde(default)]
    pub recipient: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            tls: SmtpTls::default(),
            username: String::new(),
            password_env: default_smtp_password_env(),
            sender: String::new(),
            recipient: String::new(),
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_password_env() -> String {
    "NEWSLETTER_SMTP_PASSWORD".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Seed query for the first search.
    #[serde(default = "default_seed_query")]
    pub seed_query: String,

    /// Result cap for the seed search.
    #[serde(default = "default_seed_max_results")]
    pub seed_max_results: u32,

    /// Result cap for each per-topic search.
    #[serde(default = "default_topic_max_results")]
    pub topic_max_results: u32,

    /// Concurrent drafting units; defaults to the topic count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Timeout applied to every individual external call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Abort in-flight drafting units as soon as one fails.
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            seed_query: default_seed_query(),
            seed_max_results: default_seed_max_results(),
            topic_max_results: default_topic_max_results(),
            max_concurrency: None,
            call_timeout_secs: default_call_timeout(),
            fail_fast: false,
        }
    }
}

fn default_seed_query() -> String {
    "AI agents trends".into()
}
fn default_seed_max_results() -> u32 {
    5
}
fn default_topic_max_results() -> u32 {
    3
}
fn default_call_timeout() -> u64 {
    180
}

/// `[prompts]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptSettings {
    /// Directory with template files overriding the built-in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub seed_query: String,
    pub seed_max_results: u32,
    pub topic_max_results: u32,
    /// `None` means one worker per topic.
    pub max_concurrency: Option<usize>,
    pub call_timeout: Duration,
    pub fail_fast: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            seed_query: p.seed_query.clone(),
            seed_max_results: p.seed_max_results,
            topic_max_results: p.topic_max_results,
            max_concurrency: p.max_concurrency,
            call_timeout: Duration::from_secs(p.call_timeout_secs),
            fail_fast: p.fail_fast,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsletter/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewsletterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsletter/newsletter.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsletterError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        NewsletterError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsletterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsletterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsletterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named `var_name`.
pub fn read_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(NewsletterError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the search and completion API keys are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    read_secret(&config.search.api_key_env, "search API key")?;
    read_secret(&config.completion.api_key_env, "completion API key")?;
    Ok(())
}

/// Check that delivery has addresses and a password to send with.
pub fn validate_delivery(config: &AppConfig) -> Result<()> {
    let d = &config.delivery;
    if d.sender.is_empty() || d.recipient.is_empty() {
        return Err(NewsletterError::config(
            "delivery.sender and delivery.recipient must be set (or use --dry-run)",
        ));
    }
    read_secret(&d.password_env, "SMTP password")?;
    Ok(())
}

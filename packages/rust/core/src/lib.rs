//! Newsletter pipeline orchestration and stage logic.
//!
//! Each stage ([`TopicPlanner`], [`SectionWriter`], [`Editor`]) talks to the
//! outside world only through the adapter traits from the search, completion
//! and delivery crates. [`Pipeline`] wires them into one run:
//! seed search, topic plan, parallel per-topic drafting, then the edit.

use std::time::Duration;

pub mod editor;
pub mod output;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod research;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use editor::{Editor, SEND_EMAIL_TOOL, SendEmailTool};
pub use output::{JsonFormat, JsonShape, OutputFormat, PlainTextFormat, strip_scaffold};
pub use pipeline::{Pipeline, ProgressReporter, RunFailed, RunReport, SilentProgress};
pub use planner::TopicPlanner;
pub use prompts::{PromptSet, render};
pub use research::{ItemSerializer, JsonItemSerializer, serialize_results};
pub use writer::SectionWriter;

/// Upper bound on any single search or completion call made by a stage.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(180);

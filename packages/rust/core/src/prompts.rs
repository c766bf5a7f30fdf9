//! Prompt templates for the planner, writer and editor.
//!
//! Built-in defaults can be overridden per file from a directory
//! (`[prompts].dir`). Placeholders use `{name}` syntax and are substituted in
//! a single pass, so substituted values are never re-expanded.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, info};

use newsletter_shared::{NewsletterError, Result};

pub const PLANNER_SYSTEM_FILE: &str = "planner-system.md";
pub const WRITER_SYSTEM_FILE: &str = "writer-system.md";
pub const WRITER_USER_FILE: &str = "writer-user.md";
pub const EDITOR_SYSTEM_FILE: &str = "editor-system.md";
pub const EDITOR_USER_FILE: &str = "editor-user.md";

const DEFAULT_PLANNER_SYSTEM: &str = "\
You are the planning editor of a weekly newsletter about artificial intelligence.
You receive web search results, one JSON document per result, separated by blank lines.
Read them and decide what this issue should cover: pick a short, catchy newsletter
title and three to five distinct section topics that are well supported by the results.
Order the topics the way the sections should appear in the newsletter.";

const DEFAULT_WRITER_SYSTEM: &str = "\
You are a technology journalist writing one section of a weekly AI newsletter.
Write engaging, accurate prose for a technical audience. Use only facts supported by
the research you are given and cite sources inline with their URLs. Aim for three to
five short paragraphs under a descriptive heading. Do not write an introduction or
conclusion for the whole newsletter.";

const DEFAULT_WRITER_USER: &str = "\
Write the newsletter section on the topic: {topic}

Research (one JSON document per search result):

{research}";

const DEFAULT_EDITOR_SYSTEM: &str = "\
You are the chief editor of a weekly AI newsletter. Today is {date}.
You receive a title and the drafted sections. Merge them into one polished issue:
add a short introduction, smooth the transitions, remove repetition, keep every
section in the order given, and finish with a brief sign-off. Format the result as
HTML suitable for an email body.
When the newsletter is final, call the send_email tool once with the newsletter
title as the subject and the HTML as the content. Then reply with the final HTML.";

const DEFAULT_EDITOR_USER: &str = "\
Title: {title}

Sections:

{sections}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid regex"));

/// The full set of prompt templates used by one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// Planner instructions; output format rules are appended at call time.
    pub planner_system: String,
    pub writer_system: String,
    /// Placeholders: `{topic}`, `{research}`.
    pub writer_user: String,
    /// Placeholders: `{date}`.
    pub editor_system: String,
    /// Placeholders: `{title}`, `{sections}`.
    pub editor_user: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            planner_system: DEFAULT_PLANNER_SYSTEM.into(),
            writer_system: DEFAULT_WRITER_SYSTEM.into(),
            writer_user: DEFAULT_WRITER_USER.into(),
            editor_system: DEFAULT_EDITOR_SYSTEM.into(),
            editor_user: DEFAULT_EDITOR_USER.into(),
        }
    }
}

impl PromptSet {
    /// Defaults, with any template file present in `dir` taking precedence.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut prompts = Self::default();
        let Some(dir) = dir else {
            return Ok(prompts);
        };

        if !dir.is_dir() {
            return Err(NewsletterError::config(format!(
                "prompts directory {} does not exist",
                dir.display()
            )));
        }

        let slots: [(&str, &mut String); 5] = [
            (PLANNER_SYSTEM_FILE, &mut prompts.planner_system),
            (WRITER_SYSTEM_FILE, &mut prompts.writer_system),
            (WRITER_USER_FILE, &mut prompts.writer_user),
            (EDITOR_SYSTEM_FILE, &mut prompts.editor_system),
            (EDITOR_USER_FILE, &mut prompts.editor_user),
        ];

        for (file, slot) in slots {
            let path = dir.join(file);
            if !path.exists() {
                debug!(?path, "no override, using built-in prompt");
                continue;
            }
            let content =
                std::fs::read_to_string(&path).map_err(|e| NewsletterError::io(&path, e))?;
            info!(?path, "loaded prompt override");
            *slot = content;
        }

        Ok(prompts)
    }
}

/// Substitute `{name}` placeholders from `vars`; unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match vars.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => (*value).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nl-prompts-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn render_substitutes_known_placeholders() {
        let out = render(
            "Topic: {topic}\n{research}\n{unknown}",
            &[("topic", "Vector databases"), ("research", "{\"title\":\"x\"}")],
        );
        assert_eq!(out, "Topic: Vector databases\n{\"title\":\"x\"}\n{unknown}");
    }

    #[test]
    fn render_does_not_reexpand_values() {
        let out = render("{research} / {topic}", &[("research", "{topic}"), ("topic", "AI")]);
        assert_eq!(out, "{topic} / AI");
    }

    #[test]
    fn defaults_carry_placeholders() {
        let prompts = PromptSet::default();
        assert!(prompts.writer_user.contains("{topic}"));
        assert!(prompts.writer_user.contains("{research}"));
        assert!(prompts.editor_system.contains("{date}"));
        assert!(prompts.editor_user.contains("{title}"));
        assert!(prompts.editor_user.contains("{sections}"));
    }

    #[test]
    fn load_without_dir_uses_defaults() {
        assert_eq!(PromptSet::load(None).unwrap(), PromptSet::default());
    }

    #[test]
    fn load_overrides_present_files_only() {
        let dir = temp_dir();
        std::fs::write(dir.join(WRITER_SYSTEM_FILE), "Write tersely.").unwrap();

        let prompts = PromptSet::load(Some(&dir)).unwrap();
        assert_eq!(prompts.writer_system, "Write tersely.");
        assert_eq!(prompts.editor_user, PromptSet::default().editor_user);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_missing_dir_is_config_error() {
        let dir = std::env::temp_dir().join("nl-prompts-does-not-exist-4242");
        let err = PromptSet::load(Some(&dir)).unwrap_err();
        assert!(matches!(err, NewsletterError::Config { .. }));
    }
}

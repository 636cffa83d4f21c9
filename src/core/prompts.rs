//! Named prompt templates. Slots select a template by label; operators can
//! override the built-ins from a TOML file without rebuilding.

use anyhow::Result;
use serde_derive::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_TEMPLATE: &str = "site_report";

const EDITOR_SYSTEM: &str = "You are a careful text editor for a company's social media. \
Apply exactly the change you are asked for and nothing else.";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    templates: HashMap<String, PromptTemplate>,
}

pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        let mut add = |key: &str, system: &str, user: &str| {
            templates.insert(
                key.to_string(),
                PromptTemplate {
                    system: system.to_string(),
                    user: user.to_string(),
                },
            );
        };

        let copywriter = "You are a professional copywriter for a construction and land-survey \
company. Posts must be clear, useful, and free of filler.";

        add(
            "site_report",
            copywriter,
            "Write a progress report post about the company's current work sites. Cover the \
work performed, site difficulties and how they were solved, and practical advice for clients.",
        );
        add(
            "expert_article",
            copywriter,
            "Write an expert article on land-law topics for the company's audience. Highlight \
recent regulatory changes and what they mean for clients. Expert but accessible tone.",
        );
        add(
            "faq",
            copywriter,
            "Write a helpful post answering frequent client questions: setbacks from plot \
boundaries, garden partnerships, cadastral errors, foundations. Friendly but professional.",
        );
        add(
            "weekly_review",
            copywriter,
            "Write a review post of the company's projects this week. Show the variety of the \
work with an emphasis on results.",
        );
        add(
            "services",
            copywriter,
            "Write a post presenting the company's services: foundations, land surveying, deal \
support, house designs. Persuasive but not pushy.",
        );

        Self { templates }
    }

    /// Built-ins plus any overrides from `path`. A missing file is fine;
    /// a malformed one is an error so a typo does not silently drop every
    /// override.
    pub fn load(path: &Path) -> Result<Self> {
        let mut library = Self::builtin();
        if !path.exists() {
            info!(path = %path.display(), "no prompt override file, using built-ins");
            return Ok(library);
        }
        let content = std::fs::read_to_string(path)?;
        let parsed: PromptFile = toml::from_str(&content)?;
        for (key, template) in parsed.templates {
            library.templates.insert(key, template);
        }
        info!(count = library.templates.len(), "prompt templates loaded");
        Ok(library)
    }

    /// Template for a slot label, falling back to the default kind when
    /// the label is unknown.
    pub fn for_label(&self, label: &str) -> &PromptTemplate {
        if let Some(template) = self.templates.get(label) {
            return template;
        }
        warn!(label, "unknown prompt template label, using default");
        self.templates
            .get(DEFAULT_TEMPLATE)
            .expect("built-in default template always present")
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.templates.get(key)
    }

    /// System prompt for refinement calls; deliberately not operator
    /// configurable, since edits must stay surgical.
    pub fn editor_system(&self) -> &'static str {
        EDITOR_SYSTEM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_default_and_known_labels() {
        let library = PromptLibrary::builtin();
        assert!(library.get(DEFAULT_TEMPLATE).is_some());
        for label in ["expert_article", "faq", "weekly_review", "services"] {
            assert!(library.get(label).is_some(), "missing {label}");
        }
    }

    #[test]
    fn unknown_label_falls_back_to_default() {
        let library = PromptLibrary::builtin();
        assert_eq!(
            library.for_label("no_such_label"),
            library.get(DEFAULT_TEMPLATE).unwrap()
        );
    }

    #[test]
    fn file_overrides_win_over_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.toml");
        std::fs::write(
            &path,
            r#"
[templates.faq]
system = "override system"
user = "override user"

[templates.holiday]
system = "s"
user = "u"
"#,
        )
        .unwrap();

        let library = PromptLibrary::load(&path).unwrap();
        assert_eq!(library.get("faq").unwrap().system, "override system");
        assert!(library.get("holiday").is_some());
        assert!(library.get("site_report").is_some());
    }

    #[test]
    fn missing_file_is_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let library = PromptLibrary::load(&dir.path().join("absent.toml")).unwrap();
        assert!(library.get(DEFAULT_TEMPLATE).is_some());
    }
}

//! Prompt rendering from the configured templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use pitchmatch_shared::PromptsConfig;

/// Renders the four configured prompt templates.
///
/// A template that does not mention its primary placeholder gets the value
/// appended after a blank line, so a bare instruction still works.
#[derive(Debug, Clone)]
pub struct Prompts {
    templates: PromptsConfig,
}

impl Prompts {
    pub fn new(templates: PromptsConfig) -> Self {
        Self { templates }
    }

    /// Summarization instruction over the joined fact statements.
    pub fn summary(&self, product: &str, description: &str) -> String {
        render(
            &self.templates.summary,
            ("description", description),
            &[("product", product)],
        )
    }

    /// Search-prompt template followed by the project summary.
    pub fn search_query(&self, summary: &str) -> String {
        render(&self.templates.search_query, ("summary", summary), &[])
    }

    /// Outreach message for one problem post.
    pub fn personalized_message(&self, problem: &str, summary: &str) -> String {
        render(
            &self.templates.personalized_message,
            ("problem", problem),
            &[("summary", summary)],
        )
    }

    /// Short summary of one problem post.
    pub fn problem_summary(&self, problem: &str) -> String {
        render(&self.templates.problem_summary, ("problem", problem), &[])
    }
}

fn render(template: &str, primary: (&str, &str), extra: &[(&str, &str)]) -> String {
    static PLACEHOLDER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid regex"));

    let (key, _) = primary;
    let template = if template.contains(&format!("{{{key}}}")) {
        template.to_string()
    } else {
        format!("{}\n\n{{{key}}}", template.trim_end())
    };

    // Single pass, so substituted values are never scanned again.
    PLACEHOLDER_RE
        .replace_all(&template, |caps: &Captures<'_>| {
            let name = &caps[1];
            std::iter::once(&primary)
                .chain(extra)
                .find(|(k, _)| *k == name)
                .map_or_else(|| caps[0].to_string(), |(_, v)| (*v).to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompts(search_query: &str) -> Prompts {
        Prompts::new(PromptsConfig {
            search_query: search_query.into(),
            ..PromptsConfig::default()
        })
    }

    #[test]
    fn placeholders_are_filled() {
        let p = Prompts::new(PromptsConfig::default());
        let rendered = p.summary("NoteApp", "question:a answer:b");
        assert!(rendered.contains("NoteApp"));
        assert!(rendered.contains("question:a answer:b"));
        assert!(!rendered.contains("{description}"));
        assert!(!rendered.contains("{product}"));

        let msg = p.personalized_message("Anki crashes", "Sync tool");
        assert!(msg.contains("Anki crashes"));
        assert!(msg.contains("Sync tool"));
    }

    #[test]
    fn template_without_placeholder_gets_value_appended() {
        let rendered = prompts("Write a search query.  ").search_query("A note app");
        assert_eq!(rendered, "Write a search query.\n\nA note app");
    }

    #[test]
    fn values_are_not_reinterpreted() {
        let p = Prompts::new(PromptsConfig {
            personalized_message: "P: {problem} S: {summary}".into(),
            ..PromptsConfig::default()
        });
        let rendered = p.personalized_message("mentions {summary} literally", "short");
        assert_eq!(rendered, "P: mentions {summary} literally S: short");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let rendered = prompts("{summary} in {language}").search_query("x");
        assert_eq!(rendered, "x in {language}");
    }
}

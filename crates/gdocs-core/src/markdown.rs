//! Marker tables used by the renderer.
//!
//! Both tables are evaluated rule by rule in declaration order. Heading rules
//! each emit their marker when they match. Emphasis rules each rewrap the
//! *original* run text, so a later matching rule replaces the output of an
//! earlier one instead of nesting inside it.

use crate::render::{HeadingLevel, Run};

pub const BULLET_MARKER: &str = "- ";

/// Control character the Docs API leaves inside run content; stripped from every export.
pub const VERTICAL_TAB: char = '\u{000B}';

pub struct HeadingRule {
    pub named_style: &'static str,
    pub level: HeadingLevel,
}

pub const HEADING_RULES: [HeadingRule; 3] = [
    HeadingRule {
        named_style: "HEADING_1",
        level: HeadingLevel::H1,
    },
    HeadingRule {
        named_style: "HEADING_2",
        level: HeadingLevel::H2,
    },
    HeadingRule {
        named_style: "HEADING_3",
        level: HeadingLevel::H3,
    },
];

pub struct EmphasisRule {
    pub applies: fn(&Run) -> bool,
    pub delimiter: &'static str,
}

impl EmphasisRule {
    pub fn wrap(&self, text: &str) -> String {
        format!("{}{}{}", self.delimiter, text, self.delimiter)
    }
}

fn is_bold(run: &Run) -> bool {
    run.bold
}

fn is_italic(run: &Run) -> bool {
    run.italic
}

/// Known deviation: a run that is both bold and italic renders as `_text_`,
/// not `_**text**_`. Existing consumers of the export depend on this output.
pub const EMPHASIS_RULES: [EmphasisRule; 2] = [
    EmphasisRule {
        applies: is_bold,
        delimiter: "**",
    },
    EmphasisRule {
        applies: is_italic,
        delimiter: "_",
    },
];

/// Applies the emphasis rules to a run's text.
///
/// Empty text and a bare paragraph terminator are returned untouched.
pub fn emphasize(run: &Run) -> String {
    let content = run.content.as_str();
    if content.is_empty() || content == "\n" {
        return content.to_string();
    }

    let mut fragment = content.to_string();
    for rule in &EMPHASIS_RULES {
        if (rule.applies)(run) {
            fragment = rule.wrap(content);
        }
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_rules_are_ordered_by_level() {
        let markers: Vec<&str> = HEADING_RULES.iter().map(|rule| rule.level.marker()).collect();
        assert_eq!(markers, vec!["# ", "## ", "### "]);
    }

    #[test]
    fn italic_replaces_bold() {
        let run = Run::new("Hi").bold().italic();
        assert_eq!(emphasize(&run), "_Hi_");
    }

    #[test]
    fn plain_and_terminator_runs_pass_through() {
        assert_eq!(emphasize(&Run::new("plain")), "plain");
        assert_eq!(emphasize(&Run::new("\n").bold().italic()), "\n");
        assert_eq!(emphasize(&Run::new("").bold()), "");
    }

    #[test]
    fn wrap_keeps_inner_whitespace() {
        assert_eq!(emphasize(&Run::new("Hello\n").bold()), "**Hello\n**");
    }
}

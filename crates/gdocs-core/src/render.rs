//! Projection of a document's structural elements to Markdown-like text.
//!
//! Rendering is a pure function of the block sequence: blocks are emitted in
//! reading order, paragraphs get their heading and bullet markers before any
//! run text, and emphasis never spans runs.

use gdocs_client::types::{self, Document, ParagraphElement, StructuralElement};
use crate::markdown::{emphasize, BULLET_MARKER, HEADING_RULES, VERTICAL_TAB};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeadingLevel {
    #[default]
    None,
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    pub fn marker(self) -> &'static str {
        match self {
            Self::None => "",
            Self::H1 => "# ",
            Self::H2 => "## ",
            Self::H3 => "### ",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Run {
    pub content: String,
    pub bold: bool,
    pub italic: bool,
}

impl Run {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    #[must_use]
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub runs: Vec<Run>,
    /// Named style tag as reported by the API, e.g. `HEADING_2` or `NORMAL_TEXT`.
    pub named_style: Option<String>,
    pub bullet: bool,
}

impl Paragraph {
    pub fn new(runs: Vec<Run>) -> Self {
        Self {
            runs,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_named_style(mut self, named_style: impl Into<String>) -> Self {
        self.named_style = Some(named_style.into());
        self
    }

    #[must_use]
    pub fn bulleted(mut self) -> Self {
        self.bullet = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Paragraph),
    /// Structural element without paragraph content (section break, table, ...).
    Break,
}

impl From<Paragraph> for Block {
    fn from(paragraph: Paragraph) -> Self {
        Self::Paragraph(paragraph)
    }
}

impl From<&ParagraphElement> for Run {
    fn from(element: &ParagraphElement) -> Self {
        element
            .text_run
            .as_ref()
            .map_or_else(Self::default, |run| Self {
                content: run.text().to_string(),
                bold: run.is_bold(),
                italic: run.is_italic(),
            })
    }
}

impl From<&types::Paragraph> for Paragraph {
    fn from(paragraph: &types::Paragraph) -> Self {
        Self {
            runs: paragraph.elements.iter().map(Run::from).collect(),
            named_style: paragraph.named_style().map(str::to_string),
            bullet: paragraph.bullet.is_some(),
        }
    }
}

impl From<&StructuralElement> for Block {
    fn from(element: &StructuralElement) -> Self {
        element
            .paragraph
            .as_ref()
            .map_or(Self::Break, |paragraph| Self::Paragraph(paragraph.into()))
    }
}

pub fn blocks_from_document(document: &Document) -> Vec<Block> {
    document.content().iter().map(Block::from).collect()
}

pub fn render(blocks: &[Block]) -> String {
    let mut text = String::new();
    for block in blocks {
        match block {
            Block::Break => text.push('\n'),
            Block::Paragraph(paragraph) => render_paragraph(paragraph, &mut text),
        }
    }
    text.retain(|ch| ch != VERTICAL_TAB);
    text
}

pub fn render_document(document: &Document) -> String {
    render(&blocks_from_document(document))
}

fn render_paragraph(paragraph: &Paragraph, out: &mut String) {
    // Each heading rule is checked on its own; more than one may match.
    let named_style = paragraph.named_style.as_deref().unwrap_or_default();
    for rule in &HEADING_RULES {
        if named_style == rule.named_style {
            out.push_str(rule.level.marker());
        }
    }

    if paragraph.bullet {
        out.push_str(BULLET_MARKER);
    }

    for run in &paragraph.runs {
        out.push_str(&emphasize(run));
    }
}

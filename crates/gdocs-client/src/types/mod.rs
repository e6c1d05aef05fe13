pub mod models;

pub use models::{
    ApiErrorBody, ApiErrorEnvelope, Body, Bullet, Document, Paragraph, ParagraphElement,
    ParagraphStyle, StructuralElement, TextRun, TextStyle,
};

impl Document {
    /// Structural elements of the document body, or an empty slice when the body is absent.
    pub fn content(&self) -> &[StructuralElement] {
        self.body.as_ref().map_or(&[], |body| body.content.as_slice())
    }
}

impl TextRun {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn is_bold(&self) -> bool {
        self.text_style
            .as_ref()
            .and_then(|style| style.bold)
            .unwrap_or(false)
    }

    pub fn is_italic(&self) -> bool {
        self.text_style
            .as_ref()
            .and_then(|style| style.italic)
            .unwrap_or(false)
    }
}

impl Paragraph {
    pub fn named_style(&self) -> Option<&str> {
        self.paragraph_style
            .as_ref()
            .and_then(|style| style.named_style_type.as_deref())
    }
}

//! Cloud document blocks.
//!
//! - `markdown` turns markdown text into an ordered `Vec<Block>`
//! - `submit` appends blocks to a document in paced, bounded batches
//!
//! Blocks encode to the docx "children" JSON the platform expects via
//! [`Block::to_payload`].

pub mod markdown;
pub mod submit;

use serde_json::{json, Value};

pub use markdown::parse;
pub use submit::{submit_blocks, write_markdown, BatchPolicy, SubmissionResult};

pub const MAX_HEADING_LEVEL: u8 = 5;
pub const DEFAULT_CODE_LANGUAGE: &str = "plaintext";

/// Inline text run. A source line yields exactly one span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Span {
    Plain(String),
    Bold(String),
    Link { text: String, url: String },
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self::Bold(text.into())
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Link { text: text.into(), url: url.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain(text) | Self::Bold(text) => text,
            Self::Link { text, .. } => text,
        }
    }

    fn to_element(&self) -> Value {
        match self {
            Self::Plain(text) => json!({ "text_run": { "content": text } }),
            Self::Bold(text) => json!({
                "text_run": { "content": text, "text_element_style": { "bold": true } }
            }),
            Self::Link { text, url } => json!({
                "text_run": {
                    "content": text,
                    "text_element_style": { "link": { "url": url } }
                }
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, span: Span },
    Paragraph(Span),
    Bullet(Span),
    Ordered(Span),
    Code { language: String, content: String },
    Divider,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Heading,
    Paragraph,
    Bullet,
    Ordered,
    Code,
    Divider,
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Heading { .. } => BlockKind::Heading,
            Self::Paragraph(_) => BlockKind::Paragraph,
            Self::Bullet(_) => BlockKind::Bullet,
            Self::Ordered(_) => BlockKind::Ordered,
            Self::Code { .. } => BlockKind::Code,
            Self::Divider => BlockKind::Divider,
        }
    }

    /// Numeric `block_type` used by the docx block API.
    pub fn block_type(&self) -> u8 {
        match self {
            Self::Paragraph(_) => 2,
            Self::Heading { level, .. } => (*level).clamp(1, MAX_HEADING_LEVEL) + 2,
            Self::Bullet(_) => 12,
            Self::Ordered(_) => 13,
            Self::Code { .. } => 14,
            Self::Divider => 22,
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            Self::Heading { span, .. } | Self::Paragraph(span) => Some(span),
            Self::Bullet(span) | Self::Ordered(span) => Some(span),
            Self::Code { .. } | Self::Divider => None,
        }
    }

    pub fn to_payload(&self) -> Value {
        let block_type = self.block_type();
        match self {
            Self::Heading { span, .. } => {
                let level = block_type - 2;
                let mut payload = json!({ "block_type": block_type });
                payload[format!("heading{level}")] = text_body(span);
                payload
            }
            Self::Paragraph(span) => json!({ "block_type": block_type, "text": text_body(span) }),
            Self::Bullet(span) => json!({ "block_type": block_type, "bullet": text_body(span) }),
            Self::Ordered(span) => json!({ "block_type": block_type, "ordered": text_body(span) }),
            Self::Code { language, content } => json!({
                "block_type": block_type,
                "code": {
                    "language": language,
                    "elements": [{ "text_run": { "content": content } }]
                }
            }),
            Self::Divider => json!({ "block_type": block_type, "divider": {} }),
        }
    }
}

fn text_body(span: &Span) -> Value {
    json!({ "elements": [span.to_element()], "style": {} })
}

pub fn encode_children(blocks: &[Block]) -> Vec<Value> {
    blocks.iter().map(Block::to_payload).collect()
}

//! Line-oriented markdown to docx block conversion.
//!
//! Only the subset agents actually emit is recognized: headings up to level 5,
//! bullet and ordered items, fenced code, dividers and paragraphs. Each line
//! carries a single inline span, so `**bold** and [a link](u)` is rendered as
//! the link alone. Richer inline composition is deliberately not attempted.

use super::{Block, Span, DEFAULT_CODE_LANGUAGE, MAX_HEADING_LEVEL};

const FENCE: &str = "```";

/// Never fails: unknown constructs become paragraphs and an unterminated
/// fence captures the rest of the input, trailing newlines included.
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut lines = markdown.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

    while let Some(line) = lines.next() {
        if is_divider(line) {
            blocks.push(Block::Divider);
            continue;
        }

        if let Some(info) = line.strip_prefix(FENCE) {
            let language = match info.trim() {
                "" => DEFAULT_CODE_LANGUAGE,
                language => language,
            };
            let mut content = Vec::new();
            for next in lines.by_ref() {
                if next.starts_with(FENCE) {
                    break;
                }
                content.push(next);
            }
            blocks.push(Block::Code { language: language.to_owned(), content: content.join("\n") });
            continue;
        }

        if let Some((level, text)) = heading(line) {
            blocks.push(Block::Heading { level, span: inline_span(text) });
            continue;
        }

        if let Some(text) = bullet_text(line) {
            blocks.push(Block::Bullet(inline_span(text)));
            continue;
        }

        if let Some(text) = ordered_text(line) {
            blocks.push(Block::Ordered(inline_span(text)));
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        blocks.push(Block::Paragraph(inline_span(line)));
    }

    blocks
}

/// First `[text](url)` wins, then a line fully wrapped in `**`, else plain.
pub fn inline_span(text: &str) -> Span {
    if let Some((label, url)) = find_link(text) {
        return Span::link(label, url);
    }

    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix("**").and_then(|rest| rest.strip_suffix("**")) {
        if !inner.is_empty() {
            return Span::bold(inner);
        }
    }

    Span::plain(text)
}

fn is_divider(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.bytes().all(|byte| byte == b'-')
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|byte| *byte == b'#').count();
    if hashes == 0 || hashes > usize::from(MAX_HEADING_LEVEL) {
        return None;
    }

    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    // bounded by MAX_HEADING_LEVEL above
    let level = u8::try_from(hashes).ok()?;
    Some((level, rest.trim()))
}

fn bullet_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(&['-', '*', '+'][..])?;
    rest.starts_with(char::is_whitespace).then_some(rest.trim())
}

fn ordered_text(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }

    let rest = line[digits..].strip_prefix('.')?;
    rest.starts_with(char::is_whitespace).then_some(rest.trim())
}

fn find_link(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();

    for (open, _) in text.match_indices('[') {
        let label_start = open + 1;
        let close = label_start + text[label_start..].find(']')?;
        if close == label_start || bytes.get(close + 1) != Some(&b'(') {
            continue;
        }

        let url_start = close + 2;
        let Some(url_len) = text[url_start..].find(')') else {
            continue;
        };
        if url_len == 0 {
            continue;
        }

        return Some((&text[label_start..close], &text[url_start..url_start + url_len]));
    }

    None
}

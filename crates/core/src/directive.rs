// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline directive extraction from streamed agent text.
//!
//! Agents request relays and task-list updates in band, as plain text
//! tags on their own lines:
//!
//! ```text
//! [TO:WORKER_A] implement the parser
//! [TASK:add] wire the decoder [TASK:add] add stderr patterns
//! [TASK:done] wire the decoder
//! ```
//!
//! A line is a directive line only when its first non-whitespace
//! characters form a recognized tag in exact casing. Tags mentioned
//! mid-sentence ("use the [TO:LEAD] pattern") never match. Within a
//! directive line, each further tag starts a new segment, so several
//! directives may share a line.

use crate::agent::AgentId;

/// Maximum length of a sanitized task text, ellipsis included.
const TASK_TEXT_MAX: usize = 80;

/// Minimum length of a task text after cleaning; shorter ones are dropped.
const TASK_TEXT_MIN: usize = 4;

/// One directive extracted from a text block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveToken {
    pub kind: DirectiveKind,
    /// Index of the line (within the parsed block) the token came from.
    pub source_line_index: usize,
}

/// What the directive asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `[TO:<AGENT>]`: relay the content to the target agent. Content may
    /// be empty; the relay controller then attaches the following lines.
    Relay { target: AgentId, content: String },
    /// `[TASK:add]`: add an entry to the task board.
    TaskAdd { text: String },
    /// `[TASK:done]`: mark a task board entry complete.
    TaskDone { text: String },
}

/// Result of a parse pass: the tokens found plus the text with directive
/// lines removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub tokens: Vec<DirectiveToken>,
    pub cleaned: String,
}

/// A tag recognized at some position in a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    To(AgentId),
    TaskAdd,
    TaskDone,
}

/// Parse a block of text into directive tokens and a cleaned view.
///
/// The parser is pure: it never touches the bus or any clock. Lines that
/// are not directive lines are passed through to `cleaned` unmodified.
pub fn parse_directives(text: &str) -> ParseOutcome {
    let mut tokens = Vec::new();
    let mut cleaned = String::new();

    for (line_index, line) in text.lines().enumerate() {
        let indent = line.len() - line.trim_start().len();
        match tag_at(line, indent) {
            Some(_) => parse_directive_line(line, indent, line_index, &mut tokens),
            None => {
                cleaned.push_str(line);
                cleaned.push('\n');
            }
        }
    }

    // A block without trailing newline should clean to one without, too.
    if !text.ends_with('\n') && cleaned.ends_with('\n') {
        cleaned.pop();
    }

    ParseOutcome { tokens, cleaned }
}

/// True when the line consists of optional whitespace then a recognized tag.
pub fn is_directive_line(line: &str) -> bool {
    let indent = line.len() - line.trim_start().len();
    tag_at(line, indent).is_some()
}

/// Walk a directive line, splitting it into tag-delimited segments.
fn parse_directive_line(
    line: &str,
    start: usize,
    line_index: usize,
    tokens: &mut Vec<DirectiveToken>,
) {
    let mut pos = start;
    while let Some((tag, content_start)) = tag_at(line, pos) {
        let content_end = next_tag_start(line, content_start).unwrap_or(line.len());
        let segment = &line[content_start..content_end];
        match tag {
            Tag::To(target) => tokens.push(DirectiveToken {
                kind: DirectiveKind::Relay {
                    target,
                    content: segment.trim().to_string(),
                },
                source_line_index: line_index,
            }),
            Tag::TaskAdd => {
                if let Some(text) = sanitize_task_text(segment) {
                    tokens.push(DirectiveToken {
                        kind: DirectiveKind::TaskAdd { text },
                        source_line_index: line_index,
                    });
                }
            }
            Tag::TaskDone => {
                if let Some(text) = sanitize_task_text(segment) {
                    tokens.push(DirectiveToken {
                        kind: DirectiveKind::TaskDone { text },
                        source_line_index: line_index,
                    });
                }
            }
        }
        pos = content_end;
    }
}

/// Recognize a tag starting exactly at `pos`. Returns the tag and the
/// index just past its closing bracket.
fn tag_at(line: &str, pos: usize) -> Option<(Tag, usize)> {
    let rest = line.get(pos..)?;
    if let Some(after) = rest.strip_prefix("[TO:") {
        let close = after.find(']')?;
        let target = AgentId::from_directive_label(&after[..close])?;
        return Some((Tag::To(target), pos + 4 + close + 1));
    }
    if let Some(after) = rest.strip_prefix("[TASK:") {
        let close = after.find(']')?;
        let tag = match &after[..close] {
            "add" => Tag::TaskAdd,
            "done" => Tag::TaskDone,
            _ => return None,
        };
        return Some((tag, pos + 6 + close + 1));
    }
    None
}

/// Find the start of the next recognized tag at or after `from`.
fn next_tag_start(line: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(offset) = line.get(search..)?.find('[') {
        let candidate = search + offset;
        if tag_at(line, candidate).is_some() {
            return Some(candidate);
        }
        search = candidate + 1;
    }
    None
}

/// Clean a raw task segment into displayable task text.
///
/// Strips backticks and stray relay tags, collapses whitespace, caps the
/// result at 80 characters with an ellipsis. Returns `None` when fewer
/// than 4 characters survive cleaning.
pub fn sanitize_task_text(raw: &str) -> Option<String> {
    let stripped = strip_relay_tags(raw).replace('`', "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() < TASK_TEXT_MIN {
        return None;
    }
    if collapsed.chars().count() <= TASK_TEXT_MAX {
        return Some(collapsed);
    }
    let cut: String = collapsed.chars().take(TASK_TEXT_MAX - 1).collect();
    Some(format!("{}…", cut.trim_end()))
}

/// Remove every `[TO:…]` tag occurrence from a text, wherever it appears.
///
/// Used by task sanitization and by the renderer-facing strip pass on
/// relayed content. Prose around the tags is preserved.
pub fn strip_relay_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("[TO:") {
        let after = &rest[start + 4..];
        match after.find(']') {
            Some(close) if AgentId::from_directive_label(&after[..close]).is_some() => {
                out.push_str(&rest[..start]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push_str(&rest[..start + 4]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[path = "directive_tests.rs"]
mod tests;

//! Annotation records attached to a document.
//!
//! Page numbers are 1-based. Text offsets are counted in Unicode scalar values
//! of the extracted page text and are end-exclusive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Fixed highlight palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightColor {
    Green,
    Yellow,
    Blue,
    Pink,
    Red,
}

impl Default for HighlightColor {
    fn default() -> Self {
        Self::Yellow
    }
}

impl HighlightColor {
    pub const ALL: [HighlightColor; 5] =
        [Self::Green, Self::Yellow, Self::Blue, Self::Pink, Self::Red];

    pub fn name(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Pink => "pink",
            Self::Red => "red",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Green => "Light Green",
            Self::Yellow => "Light Yellow",
            Self::Blue => "Light Blue",
            Self::Pink => "Light Pink",
            Self::Red => "Light Red",
        }
    }

    pub fn hex(self) -> &'static str {
        match self {
            Self::Green => "#90EE90",
            Self::Yellow => "#FFFFE0",
            Self::Blue => "#ADD8E6",
            Self::Pink => "#FFB6C1",
            Self::Red => "#FFA07A",
        }
    }

    /// RGB components normalized to `0.0..=1.0`.
    pub fn rgb(self) -> (f32, f32, f32) {
        let hex = &self.hex()[1..];
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_or(0.0, |value| f32::from(value) / 255.0)
        };

        (channel(0..2), channel(2..4), channel(4..6))
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown highlight color {0:?} (expected one of green, yellow, blue, pink, red)")]
pub struct UnknownColor(pub String);

impl FromStr for HighlightColor {
    type Err = UnknownColor;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        let bare = normalized.strip_prefix("light-").unwrap_or(&normalized);

        Self::ALL
            .into_iter()
            .find(|color| color.name() == bare)
            .ok_or_else(|| UnknownColor(value.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    /// Returns `None` for empty or inverted spans.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub page: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<TextSpan>,
    pub color: HighlightColor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub page: u32,
    pub anchor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<TextSpan>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Highlight,
    Comment,
}

impl AnnotationKind {
    pub fn marker(self) -> &'static str {
        match self {
            Self::Highlight => "HIGHLIGHT",
            Self::Comment => "COMMENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    Highlight(Highlight),
    Comment(Comment),
}

impl Annotation {
    pub fn highlight(page: u32, text: &str, color: HighlightColor) -> Self {
        Self::Highlight(Highlight {
            page,
            text: text.trim().to_owned(),
            span: None,
            color,
            created_at: Utc::now(),
        })
    }

    pub fn comment(page: u32, anchor: &str, body: &str) -> Self {
        Self::Comment(Comment {
            page,
            anchor: anchor.trim().to_owned(),
            span: None,
            body: body.trim().to_owned(),
            created_at: Utc::now(),
        })
    }

    pub fn with_span(mut self, span: Option<TextSpan>) -> Self {
        match &mut self {
            Self::Highlight(highlight) => highlight.span = span,
            Self::Comment(comment) => comment.span = span,
        }
        self
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Highlight(_) => AnnotationKind::Highlight,
            Self::Comment(_) => AnnotationKind::Comment,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Self::Highlight(highlight) => highlight.page,
            Self::Comment(comment) => comment.page,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Highlight(highlight) => highlight.created_at,
            Self::Comment(comment) => comment.created_at,
        }
    }

    pub fn color(&self) -> Option<HighlightColor> {
        match self {
            Self::Highlight(highlight) => Some(highlight.color),
            Self::Comment(_) => None,
        }
    }

    /// The quoted passage: highlighted text or the comment's anchor.
    pub fn quoted_text(&self) -> &str {
        match self {
            Self::Highlight(highlight) => &highlight.text,
            Self::Comment(comment) => &comment.anchor,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Highlight(_) => None,
            Self::Comment(comment) => Some(&comment.body),
        }
    }

    pub fn preview(&self, max_chars: usize) -> String {
        truncate_chars(self.quoted_text(), max_chars)
    }

    /// Case-insensitive match against the quoted passage and comment body.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }

        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);
        contains(self.quoted_text()) || self.body().is_some_and(contains)
    }
}

/// Truncates to `max_chars` characters, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

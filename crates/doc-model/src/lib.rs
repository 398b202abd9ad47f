//! Document annotation model: storage keys, annotation records, per-document
//! collections and the working copy a session mutates.

mod annotation;
mod collection;
mod key;
mod session;

pub use annotation::{
    truncate_chars, Annotation, AnnotationKind, Comment, Highlight, HighlightColor, TextSpan,
    UnknownColor, DEFAULT_PREVIEW_CHARS,
};
pub use collection::{
    topic_label, AnnotationCollection, AnnotationSummary, TopicNote, TopicSet, DEFAULT_TOPIC,
};
pub use key::{sanitize, DocumentKey, KeyError};
pub use session::{apply_session_action, ActionError, ActionOutcome, SessionAction, WorkingCopy};

use serde::{Deserialize, Serialize};

/// Which renderer the notes compiler uses by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesFormat {
    #[default]
    Pdf,
    Markdown,
}

impl NotesFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub default_color: HighlightColor,
    pub notes_format: NotesFormat,
    pub preview_chars: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_color: HighlightColor::Yellow,
            notes_format: NotesFormat::Pdf,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_fill_missing_fields_with_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"default_color":"blue"}"#).expect("deserialize");
        assert_eq!(prefs.default_color, HighlightColor::Blue);
        assert_eq!(prefs.notes_format, NotesFormat::Pdf);
        assert_eq!(prefs.preview_chars, 100);
    }

    #[test]
    fn notes_format_extensions() {
        assert_eq!(NotesFormat::Pdf.extension(), "pdf");
        assert_eq!(NotesFormat::Markdown.extension(), "md");
    }
}

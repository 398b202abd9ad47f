use crate::annotation::{Annotation, HighlightColor, TextSpan};
use crate::collection::{topic_label, AnnotationCollection, TopicNote, TopicSet};
use crate::key::DocumentKey;

/// In-memory copy of one document's annotations and topics.
///
/// Mutations only mark the copy dirty; persisting it is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    pub key: DocumentKey,
    pub document_name: String,
    pub page_count: u32,
    pub annotations: AnnotationCollection,
    pub topics: TopicSet,
    dirty: bool,
}

impl WorkingCopy {
    pub fn new(
        key: DocumentKey,
        document_name: impl Into<String>,
        page_count: u32,
        annotations: AnnotationCollection,
        topics: TopicSet,
    ) -> Self {
        Self {
            key,
            document_name: document_name.into(),
            page_count,
            annotations,
            topics,
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn contains_page(&self, page: u32) -> bool {
        (1..=self.page_count).contains(&page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    AddHighlight { page: u32, text: String, span: Option<TextSpan>, color: HighlightColor },
    AddComment { page: u32, anchor: String, span: Option<TextSpan>, body: String },
    RemoveAnnotation { index: usize },
    ClearAnnotations,
    AddTopic { label: String },
    RemoveTopic { label: String },
    /// Files a note under `topic` (the default topic when blank). `text` is the
    /// optional passage the note refers to.
    AddNote { topic: String, text: String, note: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("no annotation at position {position} (count={count})")]
    NoSuchAnnotation { position: usize, count: usize },
    #[error("{0} must not be empty")]
    EmptyText(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Added { index: usize },
    Removed(Annotation),
    Cleared { count: usize },
    TopicChanged { changed: bool },
    NoteAdded { topic: String, index: usize },
}

/// Applies an action to the working copy. Validation happens before any
/// mutation, so a rejected action leaves the copy untouched.
pub fn apply_session_action(
    copy: &mut WorkingCopy,
    action: SessionAction,
) -> Result<ActionOutcome, ActionError> {
    let outcome = match action {
        SessionAction::AddHighlight { page, text, span, color } => {
            ensure_page(copy, page)?;
            ensure_text(&text, "highlight text")?;

            let record = Annotation::highlight(page, &text, color).with_span(span);
            ActionOutcome::Added { index: copy.annotations.push(record) }
        }
        SessionAction::AddComment { page, anchor, span, body } => {
            ensure_page(copy, page)?;
            ensure_text(&body, "comment body")?;

            let record = Annotation::comment(page, &anchor, &body).with_span(span);
            ActionOutcome::Added { index: copy.annotations.push(record) }
        }
        SessionAction::RemoveAnnotation { index } => {
            let count = copy.annotations.len();
            let removed = copy
                .annotations
                .remove(index)
                .ok_or(ActionError::NoSuchAnnotation { position: index + 1, count })?;
            ActionOutcome::Removed(removed)
        }
        SessionAction::ClearAnnotations => {
            let count = copy.annotations.len();
            copy.annotations.clear();
            ActionOutcome::Cleared { count }
        }
        SessionAction::AddTopic { label } => {
            ensure_text(&label, "topic")?;
            ActionOutcome::TopicChanged { changed: copy.topics.insert(&label) }
        }
        SessionAction::RemoveTopic { label } => {
            ActionOutcome::TopicChanged { changed: copy.topics.remove(&label) }
        }
        SessionAction::AddNote { topic, text, note } => {
            ensure_text(&note, "note")?;

            let topic = topic_label(&topic).to_owned();
            let index = copy.topics.add_note(&topic, TopicNote::new(&text, &note));
            ActionOutcome::NoteAdded { topic, index }
        }
    };

    let changed = !matches!(
        outcome,
        ActionOutcome::TopicChanged { changed: false } | ActionOutcome::Cleared { count: 0 }
    );
    copy.dirty |= changed;

    Ok(outcome)
}

fn ensure_page(copy: &WorkingCopy, page: u32) -> Result<(), ActionError> {
    if copy.contains_page(page) {
        Ok(())
    } else {
        Err(ActionError::PageOutOfRange { page, page_count: copy.page_count })
    }
}

fn ensure_text(text: &str, what: &'static str) -> Result<(), ActionError> {
    if text.trim().is_empty() {
        Err(ActionError::EmptyText(what))
    } else {
        Ok(())
    }
}

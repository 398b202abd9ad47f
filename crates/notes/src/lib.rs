//! Compiles a document's annotations and topic notes into a notes document and
//! renders it as PDF or Markdown. Output carries no generation timestamp, so identical input
//! always yields identical bytes.

mod markdown;
mod pdf;

pub use markdown::render_markdown;
pub use pdf::render_pdf;

use doc_model::{
    sanitize, truncate_chars, AnnotationCollection, AnnotationKind, AnnotationSummary,
    DocumentKey, HighlightColor, NotesFormat, TopicNote, TopicSet, DEFAULT_PREVIEW_CHARS,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("document {document} has no annotations to compile")]
    EmptyCollection { document: DocumentKey },
    #[error("document {document} has no topic named {topic:?}")]
    UnknownTopic { document: DocumentKey, topic: String },
    #[error("failed to assemble notes PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One annotation as it appears in the notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    /// 1-based position in the source collection.
    pub position: usize,
    pub kind: AnnotationKind,
    pub color: Option<HighlightColor>,
    /// Highlighted passage, or the anchor a comment is attached to.
    pub text: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNotes {
    pub page: u32,
    pub entries: Vec<NoteEntry>,
}

/// A topic note as it appears in the notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNoteEntry {
    /// 1-based number within its topic.
    pub number: usize,
    pub note: String,
    /// Quoted passage, cut to the preview length.
    pub reference: Option<String>,
}

impl TopicNoteEntry {
    fn new(index: usize, note: &TopicNote) -> Self {
        let reference =
            (!note.text.is_empty()).then(|| truncate_chars(&note.text, DEFAULT_PREVIEW_CHARS));
        Self { number: index + 1, note: note.note.clone(), reference }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSection {
    pub label: String,
    pub notes: Vec<TopicNoteEntry>,
}

impl TopicSection {
    fn new(label: &str, notes: &[TopicNote]) -> Self {
        Self {
            label: label.to_owned(),
            notes: notes
                .iter()
                .enumerate()
                .map(|(index, note)| TopicNoteEntry::new(index, note))
                .collect(),
        }
    }
}

/// What a notes document covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesScope {
    /// Every annotation and topic of the document.
    Document,
    /// The notes of a single topic.
    Topic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesDocument {
    pub key: DocumentKey,
    pub title: String,
    pub scope: NotesScope,
    /// Counts for the whole document; absent for single-topic notes.
    pub summary: Option<AnnotationSummary>,
    pub topics: Vec<TopicSection>,
    pub pages: Vec<PageNotes>,
}

impl NotesDocument {
    pub fn entry_count(&self) -> usize {
        self.pages.iter().map(|page| page.entries.len()).sum()
    }

    /// Entries in output order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &NoteEntry)> {
        self.pages.iter().flat_map(|page| page.entries.iter().map(move |entry| (page.page, entry)))
    }

    pub fn topic_note_count(&self) -> usize {
        self.topics.iter().map(|topic| topic.notes.len()).sum()
    }

    pub fn file_name(&self, format: NotesFormat) -> String {
        match &self.scope {
            NotesScope::Document => format!("notes-{}.{}", self.key, format.extension()),
            NotesScope::Topic(label) => {
                format!("topic-{}-{}.{}", sanitize(label), self.key, format.extension())
            }
        }
    }
}

pub fn compile(
    key: &DocumentKey,
    collection: &AnnotationCollection,
) -> Result<NotesDocument, CompileError> {
    compile_with_topics(key, collection, &TopicSet::new())
}

/// Groups records by ascending page; records on the same page keep the order
/// they were added in. Topics follow label order with their notes in the order
/// they were filed. Fails only when there are neither annotations nor topic
/// notes.
pub fn compile_with_topics(
    key: &DocumentKey,
    collection: &AnnotationCollection,
    topics: &TopicSet,
) -> Result<NotesDocument, CompileError> {
    if collection.is_empty() && topics.note_count() == 0 {
        return Err(CompileError::EmptyCollection { document: key.clone() });
    }

    let pages = collection
        .grouped_by_page()
        .into_iter()
        .map(|(page, records)| PageNotes {
            page,
            entries: records
                .into_iter()
                .map(|(index, record)| NoteEntry {
                    position: index + 1,
                    kind: record.kind(),
                    color: record.color(),
                    text: record.quoted_text().to_owned(),
                    body: record.body().map(str::to_owned),
                })
                .collect(),
        })
        .collect();

    let document = NotesDocument {
        key: key.clone(),
        title: format!("Notes: {key}"),
        scope: NotesScope::Document,
        summary: Some(collection.summary()),
        topics: topics
            .iter_notes()
            .map(|(label, notes)| TopicSection::new(label, notes))
            .collect(),
        pages,
    };

    debug!(
        %key,
        entries = document.entry_count(),
        topic_notes = document.topic_note_count(),
        pages = document.pages.len(),
        "compiled notes"
    );
    Ok(document)
}

/// Notes for one topic of a document. A topic without notes still compiles.
pub fn compile_topic(
    key: &DocumentKey,
    topics: &TopicSet,
    label: &str,
) -> Result<NotesDocument, CompileError> {
    let label = label.trim();
    if !topics.contains(label) {
        return Err(CompileError::UnknownTopic { document: key.clone(), topic: label.to_owned() });
    }

    let section = TopicSection::new(label, topics.notes(label));
    debug!(%key, topic = label, notes = section.notes.len(), "compiled topic notes");

    Ok(NotesDocument {
        key: key.clone(),
        title: format!("Topic: {label}"),
        scope: NotesScope::Topic(label.to_owned()),
        summary: None,
        topics: vec![section],
        pages: Vec::new(),
    })
}

pub fn render(document: &NotesDocument, format: NotesFormat) -> Result<Vec<u8>, CompileError> {
    match format {
        NotesFormat::Pdf => render_pdf(document),
        NotesFormat::Markdown => Ok(render_markdown(document).into_bytes()),
    }
}

/// Renders `document` into `dir` under [`NotesDocument::file_name`] and returns
/// the path.
pub fn write_notes(
    document: &NotesDocument,
    format: NotesFormat,
    dir: &Path,
) -> Result<PathBuf, CompileError> {
    let path = dir.join(document.file_name(format));
    write_to(document, format, &path)?;
    Ok(path)
}

/// Renders `document` to an explicit destination, replacing it atomically.
pub fn write_to(
    document: &NotesDocument,
    format: NotesFormat,
    path: &Path,
) -> Result<(), CompileError> {
    let bytes = render(document, format)?;
    let io_error = |source| CompileError::Io { path: path.to_path_buf(), source };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_error)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(&bytes).map_err(io_error)?;
    temp.persist(path).map_err(|err| io_error(err.error))?;

    info!(key = %document.key, path = %path.display(), bytes = bytes.len(), "wrote notes");
    Ok(())
}

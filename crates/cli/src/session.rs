//! The context object a command works through: one engine, one store, and at
//! most one open document with its working copy.

use doc_model::{
    apply_session_action, topic_label, ActionError, ActionOutcome, DocumentKey, HighlightColor,
    KeyError, SessionAction, TextSpan, WorkingCopy,
};
use notes::{CompileError, NotesDocument};
use pdf_engine::text::locate;
use pdf_engine::{
    default_engine, DocumentHandle, LopdfEngine, OpenSource, PdfEngine, PdfEngineError,
    SearchMatches,
};
use std::path::Path;
use storage::{AnnotationStore, StorageError};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Action(ActionError),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("no document is open")]
    NoDocument,
}

impl From<ActionError> for SessionError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::PageOutOfRange { page, page_count } => {
                Self::PageOutOfRange { page, page_count }
            }
            other => Self::Action(other),
        }
    }
}

#[derive(Debug)]
struct OpenDocument {
    handle: DocumentHandle,
    copy: WorkingCopy,
}

#[derive(Debug)]
pub struct Session<E: PdfEngine = LopdfEngine> {
    engine: E,
    store: AnnotationStore,
    open: Option<OpenDocument>,
}

impl Session<LopdfEngine> {
    pub fn with_store(store: AnnotationStore) -> Self {
        Self::new(default_engine(), store)
    }
}

impl<E: PdfEngine> Session<E> {
    pub fn new(engine: E, store: AnnotationStore) -> Self {
        Self { engine, store, open: None }
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Points later saves at another store. The working copy is kept as is.
    pub fn set_store(&mut self, store: AnnotationStore) {
        self.store = store;
    }

    /// Opens `source` under `name`, replacing any open document, and loads the
    /// stored annotations and topics for it.
    pub fn open(
        &mut self,
        name: &str,
        source: impl Into<OpenSource>,
    ) -> Result<&WorkingCopy, SessionError> {
        let key = DocumentKey::from_document_name(name)?;
        let annotations = self.store.load(&key)?;
        let topics = self.store.load_topics(&key)?;

        let handle = match &self.open {
            Some(previous) => {
                if previous.copy.is_dirty() {
                    warn!(key = %previous.copy.key, "discarding unsaved annotations");
                }
                self.engine.replace(previous.handle, source.into())?
            }
            None => self.engine.open(source.into())?,
        };
        let page_count = self.engine.page_count(handle)?;

        info!(%key, page_count, records = annotations.len(), "opened document");
        let copy = WorkingCopy::new(key, name, page_count, annotations, topics);
        Ok(&self.open.insert(OpenDocument { handle, copy }).copy)
    }

    /// Opens a file, naming the document after its file name.
    pub fn open_path(&mut self, path: &Path) -> Result<&WorkingCopy, SessionError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.open(&name, path)
    }

    pub fn close(&mut self) -> Result<(), SessionError> {
        if let Some(previous) = self.open.take() {
            self.engine.close(previous.handle)?;
        }
        Ok(())
    }

    pub fn document(&self) -> Result<&WorkingCopy, SessionError> {
        self.open.as_ref().map(|open| &open.copy).ok_or(SessionError::NoDocument)
    }

    fn handle(&self) -> Result<DocumentHandle, SessionError> {
        self.open.as_ref().map(|open| open.handle).ok_or(SessionError::NoDocument)
    }

    fn copy_mut(&mut self) -> Result<&mut WorkingCopy, SessionError> {
        self.open.as_mut().map(|open| &mut open.copy).ok_or(SessionError::NoDocument)
    }

    pub fn page_count(&self) -> Result<u32, SessionError> {
        Ok(self.document()?.page_count)
    }

    pub fn page_text(&self, page: u32) -> Result<String, SessionError> {
        let handle = self.handle()?;
        self.engine.page_text(handle, page).map_err(|err| match err {
            PdfEngineError::PageOutOfRange { page, page_count } => {
                SessionError::PageOutOfRange { page, page_count }
            }
            other => SessionError::Engine(other),
        })
    }

    /// Every page's text, in page order.
    pub fn full_text(&self) -> Result<String, SessionError> {
        let mut pages = Vec::new();
        for page in 1..=self.page_count()? {
            pages.push(self.page_text(page)?);
        }
        Ok(pages.join("\n"))
    }

    pub fn search(&self, query: &str) -> Result<SearchMatches<'_, E>, SessionError> {
        Ok(self.engine.search_text(self.handle()?, query)?)
    }

    pub fn apply(&mut self, action: SessionAction) -> Result<ActionOutcome, SessionError> {
        Ok(apply_session_action(self.copy_mut()?, action)?)
    }

    /// Adds a highlight, anchoring it to the first occurrence of `text` on the
    /// page when the extracted text contains it.
    pub fn highlight(
        &mut self,
        page: u32,
        text: &str,
        color: HighlightColor,
    ) -> Result<usize, SessionError> {
        let span = self.span_for(page, text)?;
        self.apply(SessionAction::AddHighlight { page, text: text.to_owned(), span, color })?;
        self.last_index()
    }

    pub fn comment(&mut self, page: u32, anchor: &str, body: &str) -> Result<usize, SessionError> {
        let span = if anchor.trim().is_empty() { None } else { self.span_for(page, anchor)? };
        self.apply(SessionAction::AddComment {
            page,
            anchor: anchor.to_owned(),
            span,
            body: body.to_owned(),
        })?;
        self.last_index()
    }

    /// Files a note under `topic`; a blank topic means the default one.
    /// Returns the topic it landed in and its 1-based number there.
    pub fn note(
        &mut self,
        topic: &str,
        text: &str,
        note: &str,
    ) -> Result<(String, usize), SessionError> {
        self.apply(SessionAction::AddNote {
            topic: topic.to_owned(),
            text: text.to_owned(),
            note: note.to_owned(),
        })?;

        let label = topic_label(topic).to_owned();
        let number = self.document()?.topics.notes(&label).len();
        Ok((label, number))
    }

    fn last_index(&self) -> Result<usize, SessionError> {
        Ok(self.document()?.annotations.len().saturating_sub(1))
    }

    fn span_for(&self, page: u32, passage: &str) -> Result<Option<TextSpan>, SessionError> {
        let copy = self.document()?;
        if !copy.contains_page(page) {
            return Err(SessionError::PageOutOfRange { page, page_count: copy.page_count });
        }

        let span = locate(&self.page_text(page)?, passage)
            .and_then(|(start, end)| TextSpan::new(start, end));
        if span.is_none() {
            debug!(page, "passage not found in extracted text; storing without span");
        }
        Ok(span)
    }

    /// Persists annotations and topics. On failure the working copy, dirty
    /// flag included, is left exactly as it was.
    pub fn save(&mut self) -> Result<(), SessionError> {
        let copy = self.document()?;
        let result = self.store.save_document(&copy.key, &copy.annotations, &copy.topics);

        if let Err(err) = result {
            warn!(key = %copy.key, %err, "save failed; annotations kept in memory");
            return Err(err.into());
        }

        self.copy_mut()?.mark_saved();
        Ok(())
    }

    pub fn compile(&self) -> Result<NotesDocument, SessionError> {
        let copy = self.document()?;
        Ok(notes::compile_with_topics(&copy.key, &copy.annotations, &copy.topics)?)
    }

    pub fn compile_topic(&self, topic: &str) -> Result<NotesDocument, SessionError> {
        let copy = self.document()?;
        Ok(notes::compile_topic(&copy.key, &copy.topics, topic_label(topic))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::Annotation;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
    }

    fn session(root: &Path) -> Session {
        Session::with_store(AnnotationStore::with_root(root))
    }

    #[test]
    fn operations_without_a_document_fail_cleanly() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut session = session(temp.path());

        assert!(matches!(session.page_text(1), Err(SessionError::NoDocument)));
        assert!(matches!(session.save(), Err(SessionError::NoDocument)));
        assert!(matches!(session.compile(), Err(SessionError::NoDocument)));
    }

    #[test]
    fn highlight_records_span_of_found_passage() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut session = session(temp.path());
        session.open_path(&fixture("three-pages.pdf")).expect("open");

        let index = session.highlight(2, "beta decay", HighlightColor::Blue).expect("highlight");
        let record = session.document().expect("document").annotations.get(index).cloned();

        let Some(Annotation::Highlight(highlight)) = record else {
            panic!("expected a highlight record");
        };
        let span = highlight.span.expect("passage should be located");
        let page_text = session.page_text(2).expect("page 2");
        let covered: String = page_text.chars().skip(span.start).take(span.len()).collect();
        assert_eq!(covered, "Beta decay");
        assert_eq!(highlight.text, "beta decay");
    }

    #[test]
    fn unmatched_passages_are_kept_without_span() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut session = session(temp.path());
        session.open_path(&fixture("three-pages.pdf")).expect("open");

        session.comment(1, "not on this page", "still worth noting").expect("comment");
        let record = session.document().expect("document").annotations.get(0).cloned();

        let Some(Annotation::Comment(comment)) = record else {
            panic!("expected a comment record");
        };
        assert_eq!(comment.span, None);
    }

    #[test]
    fn out_of_range_pages_are_rejected_before_mutation() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut session = session(temp.path());
        session.open_path(&fixture("three-pages.pdf")).expect("open");

        for page in [0, 4] {
            let err = session.highlight(page, "x", HighlightColor::Red).expect_err("reject");
            assert!(matches!(err, SessionError::PageOutOfRange { page_count: 3, .. }));
            assert!(matches!(session.page_text(page), Err(SessionError::PageOutOfRange { .. })));
        }
        assert!(session.document().expect("document").annotations.is_empty());
    }

    #[test]
    fn reopening_replaces_the_previous_document() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut session = session(temp.path());
        session.open_path(&fixture("three-pages.pdf")).expect("open");
        assert!(session.page_text(3).expect("page 3").contains("Gamma"));

        let copy = session.open_path(&fixture("small.pdf")).expect("reopen");
        assert_eq!(copy.page_count, 1);
        assert_eq!(copy.key.as_str(), "small.pdf");
        assert!(session.page_text(1).expect("page 1").contains("small fixture"));
    }

    #[test]
    fn notes_land_in_the_default_topic_and_survive_a_reopen() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut first = session(temp.path());
        first.open_path(&fixture("three-pages.pdf")).expect("open");

        let filed = first.note("", "Gamma rays", "fastest of the three").expect("note");
        assert_eq!(filed, (doc_model::DEFAULT_TOPIC.to_owned(), 1));
        let filed = first.note("Decay", "", "beta first").expect("note");
        assert_eq!(filed, ("Decay".to_owned(), 1));
        assert!(matches!(
            first.note("Decay", "", "  "),
            Err(SessionError::Action(ActionError::EmptyText("note")))
        ));
        first.save().expect("save");

        let mut reopened = session(temp.path());
        let copy = reopened.open_path(&fixture("three-pages.pdf")).expect("reopen");
        assert_eq!(copy.topics.note_count(), 2);
        assert_eq!(copy.topics.notes("Decay")[0].note, "beta first");

        let topic = reopened.compile_topic("Decay").expect("compile topic");
        assert_eq!(topic.title, "Topic: Decay");
        assert!(matches!(
            reopened.compile_topic("Optics"),
            Err(SessionError::Compile(CompileError::UnknownTopic { .. }))
        ));
    }

    #[test]
    fn search_is_lazy_over_the_open_document() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut session = session(temp.path());
        session.open_path(&fixture("three-pages.pdf")).expect("open");

        let first = session
            .search("GAMMA")
            .expect("search")
            .next()
            .expect("a match")
            .expect("page 3 extracts");
        assert_eq!(first.page, 3);
    }
}

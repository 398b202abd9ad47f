pub mod analysis;
mod search;
pub mod text;

pub use search::{SearchMatch, SearchMatches};

use lopdf::Document;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_SCAN_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a PDF document: {0}")]
    NotAPdf(String),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("failed to extract text from page {page}: {source}")]
    Extraction {
        page: u32,
        #[source]
        source: lopdf::Error,
    },
}

/// Text access to opened PDF documents. Page numbers are 1-based.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_text(&self, handle: DocumentHandle, page: u32) -> Result<String, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;

    /// Closes `current` (dropping its cached text) and opens `source` in its place.
    fn replace(
        &mut self,
        current: DocumentHandle,
        source: OpenSource,
    ) -> Result<DocumentHandle, PdfEngineError> {
        let handle = self.open(source)?;
        self.close(current)?;
        Ok(handle)
    }

    /// Lazily yields case-insensitive matches of `query`, page by page.
    fn search_text(
        &self,
        handle: DocumentHandle,
        query: &str,
    ) -> Result<SearchMatches<'_, Self>, PdfEngineError> {
        let page_count = self.page_count(handle)?;
        Ok(SearchMatches::new(self, handle, page_count, query))
    }
}

#[derive(Debug)]
struct DocumentRecord {
    document: Document,
    page_count: u32,
    text_cache: RefCell<HashMap<u32, String>>,
}

/// lopdf-backed engine. Page text is cached per document until the document
/// is closed; the cache uses a `RefCell`, so the engine is single-threaded.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(bytes: &[u8]) -> Result<Document, PdfEngineError> {
        let header_window = &bytes[..bytes.len().min(HEADER_SCAN_BYTES)];
        if !header_window.windows(b"%PDF-".len()).any(|window| window == b"%PDF-") {
            return Err(PdfEngineError::NotAPdf("missing %PDF- header".to_owned()));
        }

        if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        Document::load_mem(bytes).map_err(|err| PdfEngineError::NotAPdf(err.to_string()))
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    /// Number of pages whose text is currently cached for `handle`.
    pub fn cached_pages(&self, handle: DocumentHandle) -> Result<usize, PdfEngineError> {
        Ok(self.record(handle)?.text_cache.borrow().len())
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let document = Self::parse(&bytes)?;
        let page_count = document.get_pages().len() as u32;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(
            handle,
            DocumentRecord { document, page_count, text_cache: RefCell::new(HashMap::new()) },
        );

        debug!(handle = handle.raw(), page_count, "opened document");
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_count)
    }

    fn page_text(&self, handle: DocumentHandle, page: u32) -> Result<String, PdfEngineError> {
        let record = self.record(handle)?;
        if page == 0 || page > record.page_count {
            return Err(PdfEngineError::PageOutOfRange { page, page_count: record.page_count });
        }

        if let Some(text) = record.text_cache.borrow().get(&page) {
            debug!(handle = handle.raw(), page, "page text cache hit");
            return Ok(text.clone());
        }

        let text = record
            .document
            .extract_text(&[page])
            .map_err(|source| PdfEngineError::Extraction { page, source })?;

        if text.trim().is_empty() {
            warn!(handle = handle.raw(), page, "page has no extractable text");
        }

        record.text_cache.borrow_mut().insert(page, text.clone());
        Ok(text)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_bytes(name: &str) -> Vec<u8> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name);
        fs::read(path).expect("fixture should exist")
    }

    fn open_three_pages(engine: &mut LopdfEngine) -> DocumentHandle {
        engine
            .open(OpenSource::Bytes(fixture_bytes("three-pages.pdf")))
            .expect("open should succeed")
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(fixture_bytes("small.pdf")))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 1);
    }

    #[test]
    fn page_text_returns_the_requested_page() {
        let mut engine = LopdfEngine::new();
        let handle = open_three_pages(&mut engine);

        let first = engine.page_text(handle, 1).expect("page 1");
        let second = engine.page_text(handle, 2).expect("page 2");

        assert!(first.contains("Introduction"));
        assert!(!first.contains("Beta"));
        assert!(second.contains("Beta decay emits electrons."));
    }

    #[test]
    fn page_text_outside_bounds_is_out_of_range() {
        let mut engine = LopdfEngine::new();
        let handle = open_three_pages(&mut engine);

        for page in [0, 4, 100] {
            let err = engine.page_text(handle, page).expect_err("should be out of range");
            assert!(matches!(err, PdfEngineError::PageOutOfRange { page: p, page_count: 3 } if p == page));
        }
    }

    #[test]
    fn page_text_is_cached_until_close() {
        let mut engine = LopdfEngine::new();
        let handle = open_three_pages(&mut engine);

        assert_eq!(engine.cached_pages(handle).expect("cache"), 0);
        let first = engine.page_text(handle, 2).expect("page 2");
        let again = engine.page_text(handle, 2).expect("page 2 again");
        assert_eq!(first, again);
        assert_eq!(engine.cached_pages(handle).expect("cache"), 1);

        let replacement = engine
            .replace(handle, OpenSource::Bytes(fixture_bytes("small.pdf")))
            .expect("replace should succeed");
        assert!(matches!(engine.cached_pages(handle), Err(PdfEngineError::InvalidHandle(_))));
        assert_eq!(engine.cached_pages(replacement).expect("cache"), 0);
    }

    #[test]
    fn rejects_bytes_that_are_not_pdf() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(fixture_bytes("invalid.pdf")))
            .expect_err("should reject non-pdf input");

        assert!(matches!(err, PdfEngineError::NotAPdf(_)));
    }

    #[test]
    fn rejects_truncated_pdf() {
        let mut bytes = fixture_bytes("small.pdf");
        bytes.truncate(40);

        let mut engine = LopdfEngine::new();
        let err = engine.open(OpenSource::Bytes(bytes)).expect_err("should fail to parse");
        assert!(matches!(err, PdfEngineError::NotAPdf(_)));
    }

    #[test]
    fn rejects_encrypted_marker() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(fixture_bytes("encrypted-marker.pdf")))
            .expect_err("should reject encrypted input");

        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn search_spans_pages_in_order() {
        let mut engine = LopdfEngine::new();
        let handle = open_three_pages(&mut engine);

        let matches: Vec<SearchMatch> = engine
            .search_text(handle, "ALPHA")
            .expect("search")
            .collect::<Result<_, _>>()
            .expect("every page extracts");
        let pages: Vec<u32> = matches.iter().map(|m| m.page).collect();
        assert_eq!(pages, vec![1, 3]);

        for found in &matches {
            let text = engine.page_text(handle, found.page).expect("page text");
            let snippet: String = text.chars().skip(found.offset).take(5).collect();
            assert_eq!(snippet.to_lowercase(), "alpha");
        }
    }

    #[test]
    fn search_is_restartable_and_empty_query_yields_nothing() {
        let mut engine = LopdfEngine::new();
        let handle = open_three_pages(&mut engine);

        let search = engine.search_text(handle, "particles").expect("search");
        let first_pass: Vec<SearchMatch> =
            search.clone().collect::<Result<_, _>>().expect("first pass");
        let second_pass: Vec<SearchMatch> = search.collect::<Result<_, _>>().expect("second pass");
        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass.len(), 2);

        assert_eq!(engine.search_text(handle, "").expect("search").count(), 0);
        assert_eq!(engine.search_text(handle, "   ").expect("search").count(), 0);
    }
}

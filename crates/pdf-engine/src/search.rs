use crate::text::{find_folded, fold_query};
use crate::{DocumentHandle, PdfEngine, PdfEngineError};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    /// 1-based page number.
    pub page: u32,
    /// Character offset into the page text.
    pub offset: usize,
}

/// Lazy search over a document's pages.
///
/// Pages are extracted only as the iterator advances. Cloning an iterator
/// that has not been advanced restarts the search from the first page.
///
/// A page whose text cannot be extracted yields an `Err` in its place and the
/// search carries on with the next page.
pub struct SearchMatches<'a, E: PdfEngine + ?Sized> {
    engine: &'a E,
    handle: DocumentHandle,
    needle: Vec<char>,
    next_page: u32,
    page_count: u32,
    pending: VecDeque<SearchMatch>,
}

impl<'a, E: PdfEngine + ?Sized> SearchMatches<'a, E> {
    pub(crate) fn new(engine: &'a E, handle: DocumentHandle, page_count: u32, query: &str) -> Self {
        Self {
            engine,
            handle,
            needle: fold_query(query),
            next_page: 1,
            page_count,
            pending: VecDeque::new(),
        }
    }
}

impl<E: PdfEngine + ?Sized> Clone for SearchMatches<'_, E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine,
            handle: self.handle,
            needle: self.needle.clone(),
            next_page: self.next_page,
            page_count: self.page_count,
            pending: self.pending.clone(),
        }
    }
}

impl<E: PdfEngine + ?Sized> Iterator for SearchMatches<'_, E> {
    type Item = Result<SearchMatch, PdfEngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Some(Ok(found));
            }

            if self.needle.is_empty() || self.next_page > self.page_count {
                return None;
            }

            let page = self.next_page;
            self.next_page += 1;

            match self.engine.page_text(self.handle, page) {
                Ok(text) => self.pending.extend(
                    find_folded(&text, &self.needle)
                        .into_iter()
                        .map(|offset| SearchMatch { page, offset }),
                ),
                Err(err) => {
                    warn!(page, %err, "page text unavailable during search");
                    return Some(Err(err));
                }
            }
        }
    }
}

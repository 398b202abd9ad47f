//! Case-insensitive matching over extracted page text.
//!
//! Offsets are character (Unicode scalar) offsets, not byte offsets, so they
//! line up with the spans stored on annotation records.

fn fold(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

/// Folds a query once so it can be matched against many pages.
pub fn fold_query(query: &str) -> Vec<char> {
    query.trim().chars().map(fold).collect()
}

/// Non-overlapping, case-insensitive occurrences of `needle` in `haystack`.
pub fn find_case_insensitive(haystack: &str, needle: &str) -> Vec<usize> {
    find_folded(haystack, &fold_query(needle))
}

pub(crate) fn find_folded(haystack: &str, needle: &[char]) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }

    let folded: Vec<char> = haystack.chars().map(fold).collect();
    let mut offsets = Vec::new();
    let mut start = 0;

    while start + needle.len() <= folded.len() {
        if folded[start..start + needle.len()] == *needle {
            offsets.push(start);
            start += needle.len();
        } else {
            start += 1;
        }
    }

    offsets
}

/// Character range `[start, end)` of the first occurrence of `passage`.
pub fn locate(haystack: &str, passage: &str) -> Option<(usize, usize)> {
    let needle = fold_query(passage);
    find_folded(haystack, &needle).first().map(|&start| (start, start + needle.len()))
}

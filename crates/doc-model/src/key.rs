//! Storage keys derived from uploaded document names.
//!
//! A key is always a fixed point of [`sanitize`]: lowercase ASCII from the set
//! `[a-z0-9._-]`, no leading or trailing `.`/`_`, never a path separator.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const MAX_KEY_CHARS: usize = 96;
const DISAMBIGUATOR_HEX_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("document name {name:?} cannot be mapped to a safe storage key")]
    Rejected { name: String },
    #[error("{key:?} is not a sanitized storage key")]
    NotSanitized { key: String },
}

/// Maps an arbitrary document name onto the safe storage character set.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());

    for ch in raw.chars() {
        let mapped = match ch.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '.' | '-') => c,
            _ => '_',
        };

        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }

    let trimmed = trim_edges(&out);
    let truncated: String = trimmed.chars().take(MAX_KEY_CHARS).collect();

    trim_edges(&truncated).to_owned()
}

fn trim_edges(value: &str) -> &str {
    value.trim_matches(|c| c == '_' || c == '.')
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Derives the storage key for an uploaded document name.
    ///
    /// Names that sanitize losslessly are used as-is. Lossy names get a short
    /// SHA-256 suffix of the original name so that, say, `"My Notes.pdf"` and
    /// `"my_notes.pdf"` land in different files.
    pub fn from_document_name(name: &str) -> Result<Self, KeyError> {
        let sanitized = sanitize(name);
        if sanitized.is_empty() {
            return Err(KeyError::Rejected { name: name.to_owned() });
        }

        if sanitized == name {
            return Ok(Self(sanitized));
        }

        let digest = hex::encode(Sha256::digest(name.as_bytes()));
        let stem: String =
            sanitized.chars().take(MAX_KEY_CHARS - DISAMBIGUATOR_HEX_CHARS - 1).collect();
        Ok(Self(format!("{}-{}", trim_edges(&stem), &digest[..DISAMBIGUATOR_HEX_CHARS])))
    }

    /// Accepts a key that is already in sanitized form, e.g. a file stem read
    /// back from the storage directory.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        if key.is_empty() || sanitize(key) != key {
            return Err(KeyError::NotSanitized { key: key.to_owned() });
        }

        Ok(Self(key.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentKey> for String {
    fn from(value: DocumentKey) -> Self {
        value.0
    }
}

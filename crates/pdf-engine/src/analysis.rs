//! Lightweight statistics and topic suggestions over extracted text.

use regex::Regex;
use std::sync::OnceLock;

const WORDS_PER_MINUTE: f64 = 200.0;
pub const DEFAULT_TOPIC_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStatistics {
    pub words: usize,
    pub characters: usize,
    pub lines: usize,
    pub sentences: usize,
    pub paragraphs: usize,
    pub reading_minutes: f64,
}

impl TextStatistics {
    pub fn from_text(text: &str) -> Self {
        let words = text.split_whitespace().count();

        Self {
            words,
            characters: text.chars().count(),
            lines: text.lines().count(),
            sentences: text.split('.').filter(|s| !s.trim().is_empty()).count(),
            paragraphs: text.split("\n\n").filter(|p| !p.trim().is_empty()).count(),
            reading_minutes: words as f64 / WORDS_PER_MINUTE,
        }
    }
}

fn numbered_heading() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.?\s+[A-Z]").expect("valid heading regex"))
}

fn leading_numbering() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.?\s*").expect("valid numbering regex"))
}

fn looks_like_heading(line: &str) -> bool {
    let has_letters = line.chars().any(char::is_alphabetic);

    (has_letters && line == line.to_uppercase())
        || ["Chapter", "Section", "Part"].iter().any(|prefix| line.starts_with(prefix))
        || numbered_heading().is_match(line)
        || line.ends_with(':')
        || line.split_whitespace().count() <= 8
}

/// Heading-like lines that could serve as topic labels, in document order.
pub fn suggest_topics(text: &str, limit: usize) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.chars().count() >= 100 || !looks_like_heading(line) {
            continue;
        }

        let topic = leading_numbering().replace(line, "");
        let topic = topic.trim_end_matches(':').trim();

        if topic.chars().count() > 2 && !topics.iter().any(|existing| existing == topic) {
            topics.push(topic.to_owned());
            if topics.len() == limit {
                break;
            }
        }
    }

    topics
}

use crate::annotation::{Annotation, AnnotationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered annotations for one document. Order is insertion order and is never
/// re-sorted; a record's identity is its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationCollection {
    records: Vec<Annotation>,
}

impl AnnotationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Annotation) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<Annotation> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Annotation> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.records
    }

    pub fn highlights(&self) -> impl Iterator<Item = &Annotation> {
        self.records.iter().filter(|record| record.kind() == AnnotationKind::Highlight)
    }

    pub fn comments(&self) -> impl Iterator<Item = &Annotation> {
        self.records.iter().filter(|record| record.kind() == AnnotationKind::Comment)
    }

    /// Records bucketed by ascending page; each bucket keeps insertion order.
    pub fn grouped_by_page(&self) -> BTreeMap<u32, Vec<(usize, &Annotation)>> {
        let mut pages: BTreeMap<u32, Vec<(usize, &Annotation)>> = BTreeMap::new();
        for (index, record) in self.records.iter().enumerate() {
            pages.entry(record.page()).or_default().push((index, record));
        }
        pages
    }

    /// Case-insensitive search over quoted text and comment bodies. Returns
    /// positions paired with the matching records.
    pub fn search<'a>(&'a self, query: &str) -> Vec<(usize, &'a Annotation)> {
        self.records.iter().enumerate().filter(|(_, record)| record.matches(query)).collect()
    }

    pub fn summary(&self) -> AnnotationSummary {
        let pages: BTreeSet<u32> = self.records.iter().map(Annotation::page).collect();

        AnnotationSummary {
            highlights: self.highlights().count(),
            comments: self.comments().count(),
            pages_annotated: pages.len(),
            last_modified: self.records.iter().map(Annotation::created_at).max(),
        }
    }
}

impl From<Vec<Annotation>> for AnnotationCollection {
    fn from(records: Vec<Annotation>) -> Self {
        Self { records }
    }
}

impl FromIterator<Annotation> for AnnotationCollection {
    fn from_iter<T: IntoIterator<Item = Annotation>>(iter: T) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a AnnotationCollection {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSummary {
    pub highlights: usize,
    pub comments: usize,
    pub pages_annotated: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

impl AnnotationSummary {
    pub fn total(&self) -> usize {
        self.highlights + self.comments
    }
}

/// Topic that notes land in when none is named.
pub const DEFAULT_TOPIC: &str = "General Notes";

/// A note filed under a topic, optionally quoting the passage it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNote {
    pub note: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl TopicNote {
    pub fn new(text: &str, note: &str) -> Self {
        Self { note: note.trim().to_owned(), text: text.trim().to_owned(), created_at: Utc::now() }
    }

    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        !needle.is_empty()
            && (self.note.to_lowercase().contains(&needle)
                || self.text.to_lowercase().contains(&needle))
    }
}

/// Trimmed topic label, falling back to [`DEFAULT_TOPIC`] when blank.
pub fn topic_label(topic: &str) -> &str {
    match topic.trim() {
        "" => DEFAULT_TOPIC,
        label => label,
    }
}

/// Topics of one document, sorted by label. Each topic owns its notes in the
/// order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TopicSetRepr", into = "BTreeMap<String, Vec<TopicNote>>")]
pub struct TopicSet {
    topics: BTreeMap<String, Vec<TopicNote>>,
}

/// Topic files written before notes existed hold a plain label array.
#[derive(Deserialize)]
#[serde(untagged)]
enum TopicSetRepr {
    Labels(Vec<String>),
    Notes(BTreeMap<String, Vec<TopicNote>>),
}

impl From<TopicSetRepr> for TopicSet {
    fn from(repr: TopicSetRepr) -> Self {
        match repr {
            TopicSetRepr::Labels(labels) => labels.into_iter().collect(),
            TopicSetRepr::Notes(topics) => {
                let mut set = Self::new();
                for (label, notes) in topics {
                    let label = label.trim();
                    if !label.is_empty() {
                        set.topics.entry(label.to_owned()).or_default().extend(notes);
                    }
                }
                set
            }
        }
    }
}

impl From<TopicSet> for BTreeMap<String, Vec<TopicNote>> {
    fn from(set: TopicSet) -> Self {
        set.topics
    }
}

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a trimmed label. Blank labels are ignored and report `false`.
    pub fn insert(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || self.topics.contains_key(label) {
            return false;
        }
        self.topics.insert(label.to_owned(), Vec::new());
        true
    }

    /// Removes a topic together with its notes.
    pub fn remove(&mut self, label: &str) -> bool {
        self.topics.remove(label.trim()).is_some()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.topics.contains_key(label.trim())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Files `note` under `topic`, creating the topic if needed. Returns the
    /// note's index within the topic.
    pub fn add_note(&mut self, topic: &str, note: TopicNote) -> usize {
        let notes = self.topics.entry(topic_label(topic).to_owned()).or_default();
        notes.push(note);
        notes.len() - 1
    }

    pub fn notes(&self, label: &str) -> &[TopicNote] {
        self.topics.get(label.trim()).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every topic with its notes, sorted by label.
    pub fn iter_notes(&self) -> impl Iterator<Item = (&str, &[TopicNote])> {
        self.topics.iter().map(|(label, notes)| (label.as_str(), notes.as_slice()))
    }

    pub fn note_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// Labels containing `query`, case-insensitively.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.iter().filter(|label| label.to_lowercase().contains(&needle)).collect()
    }

    /// Notes whose text or body contains `query`, with their topic and index.
    pub fn search_notes(&self, query: &str) -> Vec<(&str, usize, &TopicNote)> {
        self.iter_notes()
            .flat_map(|(label, notes)| {
                notes.iter().enumerate().map(move |(index, note)| (label, index, note))
            })
            .filter(|(_, _, note)| note.matches(query))
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for TopicSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut topics = Self::new();
        for label in iter {
            topics.insert(label.as_ref());
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::HighlightColor;

    fn sample() -> AnnotationCollection {
        let mut collection = AnnotationCollection::new();
        collection.push(Annotation::highlight(3, "third page", HighlightColor::Red));
        collection.push(Annotation::comment(1, "intro", "worth citing"));
        collection.push(Annotation::highlight(1, "opening line", HighlightColor::Yellow));
        collection.push(Annotation::comment(3, "closing", "disagree"));
        collection
    }

    #[test]
    fn grouping_orders_pages_and_keeps_insertion_order_within_a_page() {
        let collection = sample();
        let grouped = collection.grouped_by_page();

        let pages: Vec<u32> = grouped.keys().copied().collect();
        assert_eq!(pages, vec![1, 3]);

        let page_one: Vec<usize> = grouped[&1].iter().map(|(index, _)| *index).collect();
        let page_three: Vec<usize> = grouped[&3].iter().map(|(index, _)| *index).collect();
        assert_eq!(page_one, vec![1, 2]);
        assert_eq!(page_three, vec![0, 3]);
    }

    #[test]
    fn remove_out_of_range_is_a_no_op() {
        let mut collection = sample();
        assert!(collection.remove(10).is_none());
        assert_eq!(collection.len(), 4);

        let removed = collection.remove(0).expect("first record");
        assert_eq!(removed.page(), 3);
        assert_eq!(collection.get(0).map(Annotation::page), Some(1));
    }

    #[test]
    fn summary_counts_kinds_and_pages() {
        let summary = sample().summary();
        assert_eq!(summary.highlights, 2);
        assert_eq!(summary.comments, 2);
        assert_eq!(summary.pages_annotated, 2);
        assert_eq!(summary.total(), 4);
        assert!(summary.last_modified.is_some());

        assert_eq!(AnnotationCollection::new().summary().last_modified, None);
    }

    #[test]
    fn search_reports_positions() {
        let collection = sample();
        let hits: Vec<usize> = collection.search("CLOS").into_iter().map(|(i, _)| i).collect();
        assert_eq!(hits, vec![3]);
        assert!(collection.search("").is_empty());
    }

    #[test]
    fn collection_serializes_as_a_plain_array_in_order() {
        let collection = sample();
        let json = serde_json::to_value(&collection).expect("serialize");
        let array = json.as_array().expect("array");

        assert_eq!(array.len(), 4);
        assert_eq!(array[0]["type"], "highlight");
        assert_eq!(array[1]["type"], "comment");

        let back: AnnotationCollection = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, collection);
    }

    #[test]
    fn topics_are_trimmed_and_deduplicated() {
        let mut topics: TopicSet = ["  Ethics ", "ethics", "Ethics", ""].into_iter().collect();
        assert_eq!(topics.iter().collect::<Vec<_>>(), vec!["Ethics", "ethics"]);

        assert!(!topics.insert("   "));
        assert!(topics.remove(" ethics "));
        assert_eq!(topics.search("ETH"), vec!["Ethics"]);
    }

    #[test]
    fn notes_are_filed_under_their_topic_in_order() {
        let mut topics = TopicSet::new();
        assert_eq!(topics.add_note(" Ethics ", TopicNote::new("a passage", "first")), 0);
        assert_eq!(topics.add_note("Ethics", TopicNote::new("", "second")), 1);
        assert_eq!(topics.add_note("  ", TopicNote::new("", "unsorted")), 0);

        let ethics: Vec<&str> = topics.notes("Ethics").iter().map(|n| n.note.as_str()).collect();
        assert_eq!(ethics, vec!["first", "second"]);
        assert_eq!(topics.notes(DEFAULT_TOPIC).len(), 1);
        assert_eq!(topics.iter().collect::<Vec<_>>(), vec!["Ethics", DEFAULT_TOPIC]);
        assert_eq!(topics.note_count(), 3);
        assert!(topics.notes("absent").is_empty());
    }

    #[test]
    fn removing_a_topic_drops_its_notes() {
        let mut topics = TopicSet::new();
        topics.add_note("Ethics", TopicNote::new("", "gone soon"));
        assert!(topics.remove("Ethics"));
        assert_eq!(topics.note_count(), 0);
        assert!(!topics.insert("") && topics.insert("Ethics"));
        assert!(topics.notes("Ethics").is_empty());
    }

    #[test]
    fn search_notes_matches_text_and_body() {
        let mut topics = TopicSet::new();
        topics.add_note("Physics", TopicNote::new("Beta decay emits electrons.", "core claim"));
        topics.add_note("Physics", TopicNote::new("", "check the ELECTRON count"));
        topics.add_note("Method", TopicNote::new("", "sample size"));

        let hits: Vec<(&str, usize)> =
            topics.search_notes("electron").into_iter().map(|(t, i, _)| (t, i)).collect();
        assert_eq!(hits, vec![("Physics", 0), ("Physics", 1)]);
        assert!(topics.search_notes(" ").is_empty());
    }

    #[test]
    fn topics_serialize_as_a_map_of_notes() {
        let mut topics: TopicSet = ["Empty"].into_iter().collect();
        topics.add_note("Ethics", TopicNote::new("", "consent"));

        let json = serde_json::to_value(&topics).expect("serialize");
        assert_eq!(json["Empty"], serde_json::json!([]));
        assert_eq!(json["Ethics"][0]["note"], "consent");
        assert!(json["Ethics"][0].get("text").is_none());

        let back: TopicSet = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, topics);
    }

    #[test]
    fn plain_label_arrays_still_load() {
        let topics: TopicSet =
            serde_json::from_str(r#"["Ethics", " Method ", ""]"#).expect("deserialize");
        assert_eq!(topics.iter().collect::<Vec<_>>(), vec!["Ethics", "Method"]);
        assert_eq!(topics.note_count(), 0);
    }
}

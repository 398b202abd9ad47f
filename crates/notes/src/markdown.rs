use crate::{NoteEntry, NotesDocument, NotesScope, TopicSection};
use doc_model::AnnotationKind;
use std::fmt::Write;

const NO_TOPIC_NOTES: &str = "No notes in this topic yet.";

pub fn render_markdown(document: &NotesDocument) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "# {}", document.title);
    if let NotesScope::Topic(_) = document.scope {
        let _ = writeln!(out, "\nFrom: {}", document.key);
        for topic in &document.topics {
            out.push('\n');
            push_topic_notes(&mut out, topic);
        }
        return out;
    }

    if let Some(summary) = &document.summary {
        let _ = writeln!(out, "\n## Summary\n");
        let _ = writeln!(out, "- Highlights: {}", summary.highlights);
        let _ = writeln!(out, "- Comments: {}", summary.comments);
        let _ = writeln!(out, "- Pages annotated: {}", summary.pages_annotated);
        let _ = writeln!(out, "- Topic notes: {}", document.topic_note_count());
    }

    if !document.topics.is_empty() {
        let _ = writeln!(out, "\n## Notes by Topic");
        for topic in &document.topics {
            let _ = writeln!(out, "\n### {}\n", topic.label);
            push_topic_notes(&mut out, topic);
        }
    }

    for page in &document.pages {
        let _ = writeln!(out, "\n## Page {}\n", page.page);
        for entry in &page.entries {
            let _ = writeln!(out, "{}", entry_line(entry));
        }
    }

    out
}

fn push_topic_notes(out: &mut String, topic: &TopicSection) {
    if topic.notes.is_empty() {
        let _ = writeln!(out, "{NO_TOPIC_NOTES}");
    }
    for note in &topic.notes {
        let _ = writeln!(out, "{}. {}", note.number, note.note);
        if let Some(reference) = &note.reference {
            let _ = writeln!(out, "   Reference: \"{reference}\"");
        }
    }
}

fn entry_line(entry: &NoteEntry) -> String {
    let marker = entry.kind.marker();
    match (entry.kind, entry.color, entry.body.as_deref()) {
        (AnnotationKind::Highlight, color, _) => {
            let color = color.map(|color| format!(", {}", color.label())).unwrap_or_default();
            format!("- **{marker}** (#{}{color}): \"{}\"", entry.position, entry.text)
        }
        (AnnotationKind::Comment, _, body) if entry.text.is_empty() => {
            format!("- **{marker}** (#{}): {}", entry.position, body.unwrap_or_default())
        }
        (AnnotationKind::Comment, _, body) => format!(
            "- **{marker}** (#{}) on \"{}\": {}",
            entry.position,
            entry.text,
            body.unwrap_or_default()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{key, sample, sample_topics};
    use crate::{compile_topic, compile_with_topics};

    #[test]
    fn renders_pages_in_order_with_markers() {
        let notes = compile_with_topics(&key(), &sample(), &sample_topics()).expect("compile");

        let expected = "\
# Notes: three-pages.pdf

## Summary

- Highlights: 2
- Comments: 1
- Pages annotated: 2
- Topic notes: 2

## Notes by Topic

### Decay

1. Electrons, not nuclei.
   Reference: \"Beta decay emits electrons.\"
2. Compare with alpha decay.

### Radiation

No notes in this topic yet.

## Page 1

- **COMMENT** (#2) on \"Introduction\": Sets up the argument.
- **HIGHLIGHT** (#3, Light Yellow): \"Alpha particles\"

## Page 2

- **HIGHLIGHT** (#1, Light Green): \"Beta decay emits electrons.\"
";
        assert_eq!(render_markdown(&notes), expected);
    }

    #[test]
    fn topics_section_is_omitted_when_there_are_none() {
        let notes = crate::compile(&key(), &sample()).expect("compile");
        assert!(!render_markdown(&notes).contains("## Notes by Topic"));
    }

    #[test]
    fn single_topic_notes_name_their_source() {
        let notes = compile_topic(&key(), &sample_topics(), "Decay").expect("compile");

        let expected = "\
# Topic: Decay

From: three-pages.pdf

1. Electrons, not nuclei.
   Reference: \"Beta decay emits electrons.\"
2. Compare with alpha decay.
";
        assert_eq!(render_markdown(&notes), expected);

        let empty = compile_topic(&key(), &sample_topics(), "Radiation").expect("compile");
        assert!(render_markdown(&empty).ends_with("\nNo notes in this topic yet.\n"));
    }
}

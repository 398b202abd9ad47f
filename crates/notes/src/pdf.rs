//! Plain A4 layout: Helvetica text, word-wrapped and paginated, with a color
//! swatch beside each highlight. Every line is its own text object and content
//! streams stay uncompressed.

use crate::{CompileError, NoteEntry, NotesDocument, NotesScope, TopicSection};
use doc_model::{AnnotationKind, HighlightColor};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use tracing::debug;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: f32 = 56.0;
const ENTRY_INDENT: f32 = 14.0;
const SWATCH_SIZE: f32 = 8.0;
const WRAP_CHARS: usize = 88;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Style {
    Title,
    Heading,
    Body,
}

impl Style {
    fn font_size(self) -> f32 {
        match self {
            Self::Title => 16.0,
            Self::Heading => 13.0,
            Self::Body => 10.0,
        }
    }

    fn leading(self) -> f32 {
        self.font_size() * 1.45
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Line {
    style: Style,
    text: String,
    indent: f32,
    swatch: Option<HighlightColor>,
}

impl Line {
    fn new(style: Style, text: impl Into<String>) -> Self {
        Self { style, text: text.into(), indent: 0.0, swatch: None }
    }

    fn indented(mut self, indent: f32) -> Self {
        self.indent = indent;
        self
    }

    fn blank() -> Self {
        Self::new(Style::Body, "")
    }
}

pub fn render_pdf(document: &NotesDocument) -> Result<Vec<u8>, CompileError> {
    let lines = layout(document);
    let pages = paginate(&lines);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::with_capacity(pages.len());
    for page_lines in &pages {
        let content = page_content(page_lines);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_text(&document.title)),
        "Producer" => Object::string_literal("Marginalia"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(lopdf::Error::from)?;

    debug!(key = %document.key, pages = pages.len(), bytes = bytes.len(), "rendered notes pdf");
    Ok(bytes)
}

fn layout(document: &NotesDocument) -> Vec<Line> {
    let mut lines = vec![Line::new(Style::Title, document.title.as_str())];

    if let NotesScope::Topic(_) = document.scope {
        lines.push(Line::new(Style::Body, format!("From: {}", document.key)));
        for topic in &document.topics {
            lines.push(Line::blank());
            push_topic_notes(&mut lines, topic, 0.0);
        }
        return lines;
    }

    if let Some(summary) = &document.summary {
        lines.extend([
            Line::blank(),
            Line::new(Style::Heading, "Summary"),
            Line::new(Style::Body, format!("Highlights: {}", summary.highlights)),
            Line::new(Style::Body, format!("Comments: {}", summary.comments)),
            Line::new(Style::Body, format!("Pages annotated: {}", summary.pages_annotated)),
            Line::new(Style::Body, format!("Topic notes: {}", document.topic_note_count())),
        ]);
    }

    if !document.topics.is_empty() {
        lines.push(Line::blank());
        lines.push(Line::new(Style::Heading, "Notes by Topic"));
        for topic in &document.topics {
            lines.push(Line::new(Style::Body, topic.label.as_str()).indented(ENTRY_INDENT));
            push_topic_notes(&mut lines, topic, ENTRY_INDENT * 2.0);
        }
    }

    for page in &document.pages {
        lines.push(Line::blank());
        lines.push(Line::new(Style::Heading, format!("Page {}", page.page)));
        for entry in &page.entries {
            push_entry(&mut lines, entry);
        }
    }

    lines
}

fn push_entry(lines: &mut Vec<Line>, entry: &NoteEntry) {
    let marker = entry.kind.marker();
    let header = match (entry.kind, entry.color) {
        (AnnotationKind::Highlight, Some(color)) => {
            format!("{marker} #{} ({})", entry.position, color.label())
        }
        _ => format!("{marker} #{}", entry.position),
    };

    let mut header_line = Line::new(Style::Body, header).indented(ENTRY_INDENT);
    header_line.swatch = entry.color;
    lines.push(header_line);

    let quoted = match entry.kind {
        AnnotationKind::Highlight => format!("\"{}\"", entry.text),
        AnnotationKind::Comment if entry.text.is_empty() => String::new(),
        AnnotationKind::Comment => format!("On \"{}\"", entry.text),
    };
    if !quoted.is_empty() {
        push_wrapped(lines, &quoted, ENTRY_INDENT * 2.0);
    }
    if let Some(body) = entry.body.as_deref() {
        push_wrapped(lines, body, ENTRY_INDENT * 2.0);
    }
}

fn push_topic_notes(lines: &mut Vec<Line>, topic: &TopicSection, indent: f32) {
    if topic.notes.is_empty() {
        push_wrapped(lines, "No notes in this topic yet.", indent);
    }
    for note in &topic.notes {
        push_wrapped(lines, &format!("{}. {}", note.number, note.note), indent);
        if let Some(reference) = &note.reference {
            push_wrapped(lines, &format!("Reference: \"{reference}\""), indent + ENTRY_INDENT);
        }
    }
}

fn push_wrapped(lines: &mut Vec<Line>, text: &str, indent: f32) {
    for wrapped in wrap(text, WRAP_CHARS) {
        lines.push(Line::new(Style::Body, wrapped).indented(indent));
    }
}

/// Greedy word wrap by character count. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(word.drain(..width).collect());
        }

        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() { 0 } else { current.chars().count() + 1 };
        if needed + word.chars().count() > width {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn paginate(lines: &[Line]) -> Vec<Vec<(f32, &Line)>> {
    let top = PAGE_HEIGHT as f32 - MARGIN;
    let mut pages = vec![Vec::new()];
    let mut y = top;

    for line in lines {
        let leading = line.style.leading();
        if y - leading < MARGIN {
            pages.push(Vec::new());
            y = top;
        }
        y -= leading;

        // Blank lines only advance the cursor; none start a page.
        if line.text.is_empty() {
            continue;
        }
        if let Some(page) = pages.last_mut() {
            page.push((y, line));
        }
    }

    pages.retain(|page| !page.is_empty());
    pages
}

fn page_content(lines: &[(f32, &Line)]) -> Content {
    let mut operations = Vec::new();

    for &(y, line) in lines {
        let x = MARGIN + line.indent;

        if let Some(color) = line.swatch {
            let (r, g, b) = color.rgb();
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
            let swatch_x = x - SWATCH_SIZE - 4.0;
            operations.push(Operation::new(
                "re",
                vec![swatch_x.into(), y.into(), SWATCH_SIZE.into(), SWATCH_SIZE.into()],
            ));
            operations.push(Operation::new("f", vec![]));
            operations.push(Operation::new("Q", vec![]));
        }

        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), line.style.font_size().into()]));
        operations.push(Operation::new("Td", vec![x.into(), y.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(encode_text(&line.text))]));
        operations.push(Operation::new("ET", vec![]));
    }

    Content { operations }
}

/// Maps text onto single-byte WinAnsi codes. Typographic marks go to their
/// WinAnsi slots in 0x80..=0x9F and anything else outside Latin-1 becomes `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars().map(encode_char).collect()
}

fn encode_char(ch: char) -> u8 {
    match ch {
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2122}' => 0x99,
        // C1 controls: WinAnsi draws other glyphs at these codes.
        '\u{80}'..='\u{9f}' => b'?',
        _ => u8::try_from(u32::from(ch)).unwrap_or(b'?'),
    }
}

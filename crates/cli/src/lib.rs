pub mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use doc_model::{
    truncate_chars, Annotation, DocumentKey, HighlightColor, NotesFormat, Preferences,
    SessionAction, DEFAULT_PREVIEW_CHARS,
};
use pdf_engine::analysis::{suggest_topics, TextStatistics, DEFAULT_TOPIC_LIMIT};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use storage::{AnnotationStore, StorageLayout};
use tracing::info;

pub use session::{Session, SessionError};

const EXCERPT_CONTEXT_CHARS: usize = 30;

#[derive(Debug, Parser)]
#[command(name = "marginalia")]
#[command(about = "Highlight, comment on and compile notes from PDF documents")]
pub struct Cli {
    /// Storage root for annotations, topics and compiled notes.
    #[arg(long, global = true, env = "MARGINALIA_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print extracted text for one page, or the whole document.
    Text {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Case-insensitive search across all pages.
    Search {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        query: String,
    },
    /// Word, sentence and reading-time statistics.
    Stats {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Suggest topic labels from heading-like lines.
    SuggestTopics {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOPIC_LIMIT)]
        limit: usize,
        /// Store the suggestions as topics.
        #[arg(long)]
        add: bool,
    },
    /// Highlight a passage on a page.
    Highlight {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        text: String,
        #[arg(long)]
        color: Option<HighlightColor>,
    },
    /// Attach a comment to a page, optionally anchored to a passage.
    Comment {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long, default_value = "")]
        anchor: String,
        #[arg(long)]
        body: String,
    },
    /// List annotations in insertion order.
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Remove the annotation at a 1-based position.
    Remove {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        position: usize,
    },
    /// Remove every annotation of a document.
    Clear {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// File a note under a topic.
    Note {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        note: String,
        /// Topic to file under; defaults to "General Notes".
        #[arg(long, default_value = "")]
        topic: String,
        /// Passage the note refers to.
        #[arg(long, default_value = "")]
        text: String,
    },
    /// Search annotation text, comment bodies, topics and topic notes.
    Find {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        query: String,
    },
    /// Print annotation counts as JSON.
    Summary {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Show, add or remove topic labels.
    Topics {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        add: Vec<String>,
        #[arg(long)]
        remove: Vec<String>,
        /// List each topic's notes under its label.
        #[arg(long)]
        notes: bool,
    },
    /// Compile annotations and topic notes into a notes document.
    Compile {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Compile only the notes of one topic.
        #[arg(long)]
        topic: Option<String>,
    },
    /// Write a document's annotations and topics to a bundle file.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Store the contents of a bundle file.
    Import {
        #[arg(value_name = "BUNDLE")]
        bundle: PathBuf,
    },
    /// List documents that have stored annotations.
    Documents,
    /// Show or update preferences.
    Prefs {
        #[arg(long)]
        color: Option<HighlightColor>,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[arg(long)]
        preview_chars: Option<usize>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Pdf,
    Markdown,
}

impl From<FormatArg> for NotesFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pdf => Self::Pdf,
            FormatArg::Markdown => Self::Markdown,
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    document_key: String,
    page_count: u32,
    annotations: usize,
    topics: usize,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    page: u32,
    offset: usize,
    excerpt: String,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    words: usize,
    characters: usize,
    lines: usize,
    sentences: usize,
    paragraphs: usize,
    reading_minutes: f64,
}

impl From<TextStatistics> for StatsOutput {
    fn from(stats: TextStatistics) -> Self {
        Self {
            words: stats.words,
            characters: stats.characters,
            lines: stats.lines,
            sentences: stats.sentences,
            paragraphs: stats.paragraphs,
            reading_minutes: stats.reading_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryOutput {
    document_key: String,
    total: usize,
    highlights: usize,
    comments: usize,
    pages_annotated: usize,
    topics: usize,
    topic_notes: usize,
    last_modified: Option<String>,
}

/// Whether `-v`/`--verbose` was passed, checked before clap runs so logging
/// can be installed first.
pub fn is_verbose() -> bool {
    std::env::args_os().any(|arg| arg == "-v" || arg == "--verbose")
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let store = open_store(cli.data_dir.as_deref())?;
    info!(root = %store.layout().root().display(), "using storage root");

    match cli.command {
        Commands::Info { file } => run_info(store, &file),
        Commands::Text { file, page } => run_text(store, &file, page),
        Commands::Search { file, query } => run_search(store, &file, &query),
        Commands::Stats { file, page } => run_stats(store, &file, page),
        Commands::SuggestTopics { file, limit, add } => {
            run_suggest_topics(store, &file, limit, add)
        }
        Commands::Highlight { file, page, text, color } => {
            run_highlight(store, &file, page, &text, color)
        }
        Commands::Comment { file, page, anchor, body } => {
            run_comment(store, &file, page, &anchor, &body)
        }
        Commands::List { file, json } => run_list(store, &file, json),
        Commands::Remove { file, position } => run_remove(store, &file, position),
        Commands::Clear { file } => run_clear(store, &file),
        Commands::Note { file, note, topic, text } => run_note(store, &file, &topic, &text, &note),
        Commands::Find { file, query } => run_find(store, &file, &query),
        Commands::Summary { file } => run_summary(store, &file),
        Commands::Topics { file, add, remove, notes } => {
            run_topics(store, &file, add, remove, notes)
        }
        Commands::Compile { file, format, output, topic } => run_compile(
            store,
            &file,
            format.map(Into::into),
            output.as_deref(),
            topic.as_deref(),
        ),
        Commands::Export { file, output } => run_export(&store, &file, &output),
        Commands::Import { bundle } => run_import(&store, &bundle),
        Commands::Documents => run_documents(&store),
        Commands::Prefs { color, format, preview_chars } => {
            run_prefs(&store, color, format.map(Into::into), preview_chars)
        }
        Commands::Version => Ok(()),
    }
}

/// Resolves the storage root and proves it is writable. This is the one
/// failure that stops every command.
fn open_store(data_dir: Option<&Path>) -> Result<AnnotationStore> {
    let layout = match data_dir {
        Some(dir) => StorageLayout::with_root(dir),
        None => StorageLayout::from_default_project()?,
    };

    let store = AnnotationStore::new(layout);
    store.ensure_writable().context("storage is not usable")?;
    Ok(store)
}

fn open_session(store: AnnotationStore, file: &Path) -> Result<Session> {
    ensure_pdf_exists(file)?;

    let mut session = Session::with_store(store);
    session.open_path(file).context("failed to open PDF")?;
    Ok(session)
}

fn save(session: &mut Session) -> Result<()> {
    session.save().context("failed to save annotations")
}

fn run_info(store: AnnotationStore, file: &Path) -> Result<()> {
    let session = open_session(store, file)?;
    let copy = session.document()?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        document_key: copy.key.to_string(),
        page_count: copy.page_count,
        annotations: copy.annotations.len(),
        topics: copy.topics.len(),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_text(store: AnnotationStore, file: &Path, page: Option<u32>) -> Result<()> {
    let session = open_session(store, file)?;
    let text = match page {
        Some(page) => session.page_text(page)?,
        None => session.full_text()?,
    };

    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_search(store: AnnotationStore, file: &Path, query: &str) -> Result<()> {
    let session = open_session(store, file)?;
    let needle_chars = query.trim().chars().count();

    let mut results = Vec::new();
    for found in session.search(query)? {
        let found = found?;
        let text = session.page_text(found.page)?;
        let start = found.offset.saturating_sub(EXCERPT_CONTEXT_CHARS);
        let excerpt: String = text
            .chars()
            .skip(start)
            .take(found.offset - start + needle_chars + EXCERPT_CONTEXT_CHARS)
            .collect();

        results.push(SearchOutput {
            page: found.page,
            offset: found.offset,
            excerpt: excerpt.split_whitespace().collect::<Vec<_>>().join(" "),
        });
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn run_stats(store: AnnotationStore, file: &Path, page: Option<u32>) -> Result<()> {
    let session = open_session(store, file)?;
    let text = match page {
        Some(page) => session.page_text(page)?,
        None => session.full_text()?,
    };

    let payload = StatsOutput::from(TextStatistics::from_text(&text));
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_suggest_topics(store: AnnotationStore, file: &Path, limit: usize, add: bool) -> Result<()> {
    let mut session = open_session(store, file)?;
    let suggestions = suggest_topics(&session.full_text()?, limit);

    if add {
        for label in &suggestions {
            session.apply(SessionAction::AddTopic { label: label.clone() })?;
        }
        save(&mut session)?;
    }

    for label in &suggestions {
        println!("{label}");
    }
    Ok(())
}

fn run_highlight(
    store: AnnotationStore,
    file: &Path,
    page: u32,
    text: &str,
    color: Option<HighlightColor>,
) -> Result<()> {
    let color = match color {
        Some(color) => color,
        None => store.load_preferences()?.default_color,
    };

    let mut session = open_session(store, file)?;
    let index = session.highlight(page, text, color)?;
    save(&mut session)?;

    println!("added highlight #{} on page {page} ({})", index + 1, color.label());
    Ok(())
}

fn run_comment(
    store: AnnotationStore,
    file: &Path,
    page: u32,
    anchor: &str,
    body: &str,
) -> Result<()> {
    let mut session = open_session(store, file)?;
    let index = session.comment(page, anchor, body)?;
    save(&mut session)?;

    println!("added comment #{} on page {page}", index + 1);
    Ok(())
}

fn run_list(store: AnnotationStore, file: &Path, json: bool) -> Result<()> {
    let preview_chars = store.load_preferences()?.preview_chars;
    let session = open_session(store, file)?;
    let annotations = &session.document()?.annotations;

    if json {
        println!("{}", serde_json::to_string_pretty(annotations)?);
        return Ok(());
    }

    if annotations.is_empty() {
        println!("no annotations");
    }
    for (index, record) in annotations.iter().enumerate() {
        println!("{}", describe(index, record, preview_chars));
    }
    Ok(())
}

fn describe(index: usize, record: &Annotation, preview_chars: usize) -> String {
    let position = index + 1;
    let page = record.page();
    let marker = record.kind().marker();

    match record {
        Annotation::Highlight(highlight) => format!(
            "#{position}  p.{page}  {marker}  [{}]  \"{}\"",
            highlight.color.label(),
            record.preview(preview_chars)
        ),
        Annotation::Comment(comment) if comment.anchor.is_empty() => {
            let body = truncate_chars(&comment.body, preview_chars);
            format!("#{position}  p.{page}  {marker}  {body}")
        }
        Annotation::Comment(comment) => format!(
            "#{position}  p.{page}  {marker}  on \"{}\": {}",
            record.preview(preview_chars),
            truncate_chars(&comment.body, preview_chars)
        ),
    }
}

fn run_remove(store: AnnotationStore, file: &Path, position: usize) -> Result<()> {
    let index = position.checked_sub(1).context("annotation positions start at 1")?;

    let mut session = open_session(store, file)?;
    session.apply(SessionAction::RemoveAnnotation { index })?;
    save(&mut session)?;

    println!("removed annotation #{position}");
    Ok(())
}

fn run_clear(store: AnnotationStore, file: &Path) -> Result<()> {
    let mut session = open_session(store, file)?;
    let count = session.document()?.annotations.len();
    session.apply(SessionAction::ClearAnnotations)?;
    save(&mut session)?;

    println!("removed {count} annotations");
    Ok(())
}

fn run_note(
    store: AnnotationStore,
    file: &Path,
    topic: &str,
    text: &str,
    note: &str,
) -> Result<()> {
    let mut session = open_session(store, file)?;
    let (topic, number) = session.note(topic, text, note)?;
    save(&mut session)?;

    println!("added note #{number} to topic {topic:?}");
    Ok(())
}

fn run_find(store: AnnotationStore, file: &Path, query: &str) -> Result<()> {
    let preview_chars = store.load_preferences()?.preview_chars;
    let session = open_session(store, file)?;
    let copy = session.document()?;

    let hits = copy.annotations.search(query);
    let topics = copy.topics.search(query);
    let notes = copy.topics.search_notes(query);
    if hits.is_empty() && topics.is_empty() && notes.is_empty() {
        println!("no matches for {query:?}");
    }

    for (index, record) in hits {
        println!("{}", describe(index, record, preview_chars));
    }
    for topic in topics {
        println!("topic: {topic}");
    }
    for (topic, index, note) in notes {
        println!("note: {topic} #{}  {}", index + 1, truncate_chars(&note.note, preview_chars));
    }
    Ok(())
}

fn run_summary(store: AnnotationStore, file: &Path) -> Result<()> {
    let session = open_session(store, file)?;
    let copy = session.document()?;
    let summary = copy.annotations.summary();

    let payload = SummaryOutput {
        document_key: copy.key.to_string(),
        total: summary.total(),
        highlights: summary.highlights,
        comments: summary.comments,
        pages_annotated: summary.pages_annotated,
        topics: copy.topics.len(),
        topic_notes: copy.topics.note_count(),
        last_modified: summary.last_modified.map(|at| at.to_rfc3339()),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_topics(
    store: AnnotationStore,
    file: &Path,
    add: Vec<String>,
    remove: Vec<String>,
    show_notes: bool,
) -> Result<()> {
    let mut session = open_session(store, file)?;

    for label in add {
        session.apply(SessionAction::AddTopic { label })?;
    }
    for label in remove {
        session.apply(SessionAction::RemoveTopic { label })?;
    }
    if session.document()?.is_dirty() {
        save(&mut session)?;
    }

    for (label, notes) in session.document()?.topics.iter_notes() {
        println!("{label}");
        if !show_notes {
            continue;
        }
        for (index, note) in notes.iter().enumerate() {
            println!("  {}. {}", index + 1, note.note);
            if !note.text.is_empty() {
                let reference = truncate_chars(&note.text, DEFAULT_PREVIEW_CHARS);
                println!("     Reference: \"{reference}\"");
            }
        }
    }
    Ok(())
}

fn run_compile(
    store: AnnotationStore,
    file: &Path,
    format: Option<NotesFormat>,
    output: Option<&Path>,
    topic: Option<&str>,
) -> Result<()> {
    let format = match format {
        Some(format) => format,
        None => store.load_preferences()?.notes_format,
    };
    let notes_dir = store.layout().notes_dir();

    let session = open_session(store, file)?;
    let notes = match topic {
        Some(topic) => session.compile_topic(topic)?,
        None => session.compile()?,
    };

    let path = match output {
        Some(path) => {
            notes::write_to(&notes, format, path)?;
            path.to_path_buf()
        }
        None => notes::write_notes(&notes, format, &notes_dir)?,
    };

    println!("{}", path.display());
    Ok(())
}

fn document_key(file: &Path) -> Result<DocumentKey> {
    let name = file
        .file_name()
        .with_context(|| format!("path has no file name: {}", file.display()))?;
    Ok(DocumentKey::from_document_name(&name.to_string_lossy())?)
}

fn run_export(store: &AnnotationStore, file: &Path, output: &Path) -> Result<()> {
    let key = document_key(file)?;
    let bundle = store.export_bundle(&key, output).context("failed to export bundle")?;

    println!(
        "exported {} annotations and {} topics to {}",
        bundle.annotations.len(),
        bundle.topics.len(),
        output.display()
    );
    Ok(())
}

fn run_import(store: &AnnotationStore, bundle: &Path) -> Result<()> {
    let bundle = store.import_bundle(bundle).context("failed to import bundle")?;

    println!(
        "imported {} annotations and {} topics for {}",
        bundle.annotations.len(),
        bundle.topics.len(),
        bundle.document
    );
    Ok(())
}

fn run_documents(store: &AnnotationStore) -> Result<()> {
    for key in store.list_documents()? {
        println!("{key}");
    }
    Ok(())
}

fn run_prefs(
    store: &AnnotationStore,
    color: Option<HighlightColor>,
    format: Option<NotesFormat>,
    preview_chars: Option<usize>,
) -> Result<()> {
    let mut preferences: Preferences = store.load_preferences()?;
    let changed = color.is_some() || format.is_some() || preview_chars.is_some();

    if let Some(color) = color {
        preferences.default_color = color;
    }
    if let Some(format) = format {
        preferences.notes_format = format;
    }
    if let Some(preview_chars) = preview_chars {
        if preview_chars == 0 {
            anyhow::bail!("--preview-chars must be >= 1");
        }
        preferences.preview_chars = preview_chars;
    }
    if changed {
        store.save_preferences(&preferences)?;
    }

    println!("{}", serde_json::to_string_pretty(&preferences)?);
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

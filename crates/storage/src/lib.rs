pub mod bundle;

use directories::ProjectDirs;
use doc_model::{Annotation, AnnotationCollection, DocumentKey, Preferences, TopicSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFS_SCHEMA_VERSION: u32 = 1;
const ANNOTATIONS_SCHEMA_VERSION: u32 = 1;
// Version 1 stored bare labels; version 2 stores each topic's notes.
const TOPICS_SCHEMA_VERSION: u32 = 2;

const ANNOTATIONS_DIR: &str = "annotations";
const TOPICS_DIR: &str = "topics";
const NOTES_DIR: &str = "notes";
const ANNOTATIONS_SUFFIX: &str = ".annotations.json";
const TOPICS_SUFFIX: &str = ".topics.json";
const WRITE_CHECK_FILE: &str = ".write-check";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed data in {}: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} uses unsupported schema version {version}", path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("storage directory {} is not writable: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io { path: path.to_path_buf(), source }
    }

    fn serde(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Serde { path: path.to_path_buf(), source }
    }
}

/// Directory layout under a storage root.
///
/// Annotation and topic files live in separate directories with distinct
/// suffixes, so the two namespaces never collide for the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Marginalia", "Marginalia")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join(ANNOTATIONS_DIR)
    }

    pub fn topics_dir(&self) -> PathBuf {
        self.root.join(TOPICS_DIR)
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.root.join(NOTES_DIR)
    }

    pub fn annotations_path(&self, key: &DocumentKey) -> PathBuf {
        self.annotations_dir().join(format!("{key}{ANNOTATIONS_SUFFIX}"))
    }

    pub fn topics_path(&self, key: &DocumentKey) -> PathBuf {
        self.topics_dir().join(format!("{key}{TOPICS_SUFFIX}"))
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.root.join("preferences.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferencesEnvelope {
    version: u32,
    preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnnotationsEnvelope {
    version: u32,
    document: DocumentKey,
    annotations: AnnotationCollection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TopicsEnvelope {
    version: u32,
    document: DocumentKey,
    topics: TopicSet,
}

/// Flat JSON-per-document persistence for annotations and topics.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    layout: StorageLayout,
}

impl AnnotationStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(StorageLayout::with_root(root))
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Creates the storage directories and proves they accept writes.
    pub fn ensure_writable(&self) -> Result<(), StorageError> {
        for dir in [self.layout.annotations_dir(), self.layout.topics_dir(), self.layout.notes_dir()]
        {
            let not_writable =
                |source| StorageError::NotWritable { path: dir.clone(), source };

            fs::create_dir_all(&dir).map_err(not_writable)?;

            let check = dir.join(WRITE_CHECK_FILE);
            fs::write(&check, b"ok").map_err(not_writable)?;
            fs::remove_file(&check).map_err(not_writable)?;
        }

        Ok(())
    }

    /// Loads the collection for `key`; a document without a file has none yet.
    pub fn load(&self, key: &DocumentKey) -> Result<AnnotationCollection, StorageError> {
        let path = self.layout.annotations_path(key);
        let Some(bytes) = read_optional(&path)? else {
            debug!(%key, "no annotations file yet");
            return Ok(AnnotationCollection::new());
        };

        let envelope: AnnotationsEnvelope =
            serde_json::from_slice(&bytes).map_err(StorageError::serde(&path))?;
        check_version(&path, envelope.version, ANNOTATIONS_SCHEMA_VERSION)?;

        if envelope.document != *key {
            warn!(%key, stored = %envelope.document, "annotations file names a different document");
        }

        Ok(envelope.annotations)
    }

    pub fn save(
        &self,
        key: &DocumentKey,
        collection: &AnnotationCollection,
    ) -> Result<(), StorageError> {
        self.stage_annotations(key, collection)?.commit()?;
        debug!(%key, records = collection.len(), "saved annotations");
        Ok(())
    }

    /// Saves annotations and topics together. Both files are fully written
    /// and synced beside their targets before either replaces its old file.
    pub fn save_document(
        &self,
        key: &DocumentKey,
        collection: &AnnotationCollection,
        topics: &TopicSet,
    ) -> Result<(), StorageError> {
        let annotations = self.stage_annotations(key, collection)?;
        let topics_file = self.stage_topics(key, topics)?;

        annotations.commit()?;
        topics_file.commit()?;
        debug!(%key, records = collection.len(), topics = topics.len(), "saved document");
        Ok(())
    }

    fn stage_annotations(
        &self,
        key: &DocumentKey,
        collection: &AnnotationCollection,
    ) -> Result<StagedWrite, StorageError> {
        let envelope = AnnotationsEnvelope {
            version: ANNOTATIONS_SCHEMA_VERSION,
            document: key.clone(),
            annotations: collection.clone(),
        };

        stage_json(&self.layout.annotations_path(key), &envelope)
    }

    fn stage_topics(
        &self,
        key: &DocumentKey,
        topics: &TopicSet,
    ) -> Result<StagedWrite, StorageError> {
        let envelope = TopicsEnvelope {
            version: TOPICS_SCHEMA_VERSION,
            document: key.clone(),
            topics: topics.clone(),
        };

        stage_json(&self.layout.topics_path(key), &envelope)
    }

    /// Load, push, save. Returns the collection as written.
    pub fn append_annotation(
        &self,
        key: &DocumentKey,
        record: Annotation,
    ) -> Result<AnnotationCollection, StorageError> {
        let mut collection = self.load(key)?;
        collection.push(record);
        self.save(key, &collection)?;
        Ok(collection)
    }

    pub fn load_topics(&self, key: &DocumentKey) -> Result<TopicSet, StorageError> {
        let path = self.layout.topics_path(key);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(TopicSet::new());
        };

        let envelope: TopicsEnvelope =
            serde_json::from_slice(&bytes).map_err(StorageError::serde(&path))?;
        check_version(&path, envelope.version, TOPICS_SCHEMA_VERSION)?;

        Ok(envelope.topics)
    }

    pub fn save_topics(&self, key: &DocumentKey, topics: &TopicSet) -> Result<(), StorageError> {
        self.stage_topics(key, topics)?.commit()
    }

    /// Keys of every document that has an annotations file, sorted.
    pub fn list_documents(&self) -> Result<Vec<DocumentKey>, StorageError> {
        let dir = self.layout.annotations_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(&dir)(err)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StorageError::io(&dir))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(ANNOTATIONS_SUFFIX))
            else {
                continue;
            };

            match DocumentKey::parse(stem) {
                Ok(key) => keys.push(key),
                Err(err) => warn!(file = ?name, %err, "ignoring unexpected file in annotations dir"),
            }
        }

        keys.sort();
        Ok(keys)
    }

    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        let path = self.layout.preferences_path();
        let Some(bytes) = read_optional(&path)? else {
            return Ok(Preferences::default());
        };

        let envelope: PreferencesEnvelope =
            serde_json::from_slice(&bytes).map_err(StorageError::serde(&path))?;
        check_version(&path, envelope.version, PREFS_SCHEMA_VERSION)?;

        Ok(envelope.preferences)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        let envelope =
            PreferencesEnvelope { version: PREFS_SCHEMA_VERSION, preferences: preferences.clone() };

        write_json_atomic(&self.layout.preferences_path(), &envelope)
    }
}

/// Reads a file that may legitimately not exist yet.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StorageError::io(path)(err)),
    }
}

fn check_version(path: &Path, found: u32, supported: u32) -> Result<(), StorageError> {
    if found > supported {
        return Err(StorageError::UnsupportedVersion { path: path.to_path_buf(), version: found });
    }
    Ok(())
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    stage_json(path, value)?.commit()
}

fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<StagedWrite, StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(StorageError::serde(path))?;
    StagedWrite::new(path, &bytes)
}

/// File contents written and synced to a temp file beside `path`, waiting to
/// be renamed over it. Dropping it uncommitted removes the temp file and
/// leaves `path` untouched.
struct StagedWrite {
    temp: tempfile::NamedTempFile,
    path: PathBuf,
}

impl StagedWrite {
    fn new(path: &Path, bytes: &[u8]) -> Result<Self, StorageError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(StorageError::io(dir))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(StorageError::io(dir))?;
        temp.write_all(bytes).map_err(StorageError::io(path))?;
        temp.as_file().sync_all().map_err(StorageError::io(path))?;

        Ok(Self { temp, path: path.to_path_buf() })
    }

    fn commit(self) -> Result<(), StorageError> {
        let Self { temp, path } = self;
        temp.persist(&path).map_err(|err| StorageError::io(&path)(err.error))?;
        Ok(())
    }
}

//! Single-file export of one document's annotations and topics.

use crate::{write_json_atomic, AnnotationStore, StorageError};
use chrono::{DateTime, Utc};
use doc_model::{AnnotationCollection, DocumentKey, TopicSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub document: DocumentKey,
    pub exported_at: DateTime<Utc>,
    pub annotations: AnnotationCollection,
    #[serde(default)]
    pub topics: TopicSet,
}

impl AnnotationStore {
    /// Writes the stored annotations and topics for `key` to `path`.
    pub fn export_bundle(
        &self,
        key: &DocumentKey,
        path: &Path,
    ) -> Result<ExportBundle, StorageError> {
        let bundle = ExportBundle {
            document: key.clone(),
            exported_at: Utc::now(),
            annotations: self.load(key)?,
            topics: self.load_topics(key)?,
        };

        write_json_atomic(path, &bundle)?;
        info!(%key, path = %path.display(), records = bundle.annotations.len(), "exported bundle");
        Ok(bundle)
    }

    /// Reads a bundle and stores its contents under the key it names,
    /// replacing whatever was stored for that key. Annotations and topics are
    /// staged together, so a failed import leaves both old files in place.
    pub fn import_bundle(&self, path: &Path) -> Result<ExportBundle, StorageError> {
        let bytes = fs::read(path).map_err(StorageError::io(path))?;
        let bundle: ExportBundle =
            serde_json::from_slice(&bytes).map_err(StorageError::serde(path))?;

        self.save_document(&bundle.document, &bundle.annotations, &bundle.topics)?;

        info!(key = %bundle.document, records = bundle.annotations.len(), "imported bundle");
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Annotation, HighlightColor, TopicNote};

    #[test]
    fn export_then_import_into_another_root() {
        let source_dir = tempfile::tempdir().expect("temp dir should be created");
        let target_dir = tempfile::tempdir().expect("temp dir should be created");
        let source = AnnotationStore::with_root(source_dir.path());
        let target = AnnotationStore::with_root(target_dir.path());
        let key = DocumentKey::from_document_name("thesis.pdf").expect("key");

        let mut collection = AnnotationCollection::new();
        collection.push(Annotation::highlight(1, "key finding", HighlightColor::Blue));
        collection.push(Annotation::comment(2, "method", "sample size is small"));
        source.save(&key, &collection).expect("save annotations");
        let mut topics: TopicSet = ["Methods", "Results"].into_iter().collect();
        topics.add_note("Results", TopicNote::new("key finding", "replicates the 2019 result"));
        source.save_topics(&key, &topics).expect("save topics");

        let bundle_path = source_dir.path().join("thesis-bundle.json");
        let exported = source.export_bundle(&key, &bundle_path).expect("export");
        assert_eq!(exported.annotations, collection);

        let imported = target.import_bundle(&bundle_path).expect("import");
        assert_eq!(imported, exported);
        assert_eq!(target.load(&key).expect("load"), collection);
        assert_eq!(target.load_topics(&key).expect("load topics"), topics);
    }

    #[test]
    fn exporting_an_unknown_document_yields_an_empty_bundle() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = AnnotationStore::with_root(temp.path());
        let key = DocumentKey::from_document_name("unknown.pdf").expect("key");

        let bundle = store.export_bundle(&key, &temp.path().join("out.json")).expect("export");
        assert!(bundle.annotations.is_empty());
        assert!(bundle.topics.is_empty());
    }

    #[test]
    fn failed_import_leaves_previous_annotations_untouched() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let root = temp.path().join("store");
        let store = AnnotationStore::with_root(&root);
        let key = DocumentKey::from_document_name("thesis.pdf").expect("key");

        let mut previous = AnnotationCollection::new();
        previous.push(Annotation::comment(1, "", "kept across a failed import"));
        store.save(&key, &previous).expect("save annotations");

        let bundle = ExportBundle {
            document: key.clone(),
            exported_at: Utc::now(),
            annotations: AnnotationCollection::new(),
            topics: ["Methods"].into_iter().collect(),
        };
        let bundle_path = temp.path().join("bundle.json");
        fs::write(&bundle_path, serde_json::to_vec(&bundle).expect("serialize")).expect("write");

        // A regular file where the topics directory belongs fails the topics write.
        fs::write(store.layout().topics_dir(), b"not a directory").expect("write blocker");

        let err = store.import_bundle(&bundle_path).expect_err("import should fail");
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.load(&key).expect("load"), previous);
    }

    #[test]
    fn importing_garbage_is_a_serde_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("bundle.json");
        fs::write(&path, b"{\"document\": 3}").expect("write");

        let err = AnnotationStore::with_root(temp.path()).import_bundle(&path).expect_err("reject");
        assert!(matches!(err, StorageError::Serde { .. }));
    }

    #[test]
    fn bundles_with_unsanitized_keys_are_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("bundle.json");
        let body = r#"{"document":"../escape","exported_at":"2024-01-01T00:00:00Z","annotations":[]}"#;
        fs::write(&path, body).expect("write");

        let err = AnnotationStore::with_root(temp.path()).import_bundle(&path).expect_err("reject");
        assert!(matches!(err, StorageError::Serde { .. }));
        assert!(!temp.path().join("escape.annotations.json").exists());
    }
}

//! Write-once snapshot storage for stage outputs.
//!
//! Each stage's full output is written to
//! `<root>/<NN>_<stage>_<timestamp>.json` exactly once per run.

use crate::{Error, Result, RunTimestamp, Stage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Snapshot store rooted at a directory.
#[derive(Debug, Clone)]
pub struct IntermediateStore {
    root: PathBuf,
}

impl IntermediateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot for a stage and run.
    pub fn snapshot_path(&self, stage: Stage, timestamp: &RunTimestamp) -> PathBuf {
        self.root.join(format!(
            "{:02}_{}_{}.json",
            stage.ordinal(),
            stage.key(),
            timestamp
        ))
    }

    /// Persist a complete stage output. Fails if the snapshot already exists.
    pub fn write<T: Serialize>(
        &self,
        stage: Stage,
        timestamp: &RunTimestamp,
        records: &[T],
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.snapshot_path(stage, timestamp);

        if path.exists() {
            return Err(Error::SnapshotExists(path.display().to_string()));
        }

        // Staged beside the final path and linked into place once complete.
        let mut staged = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        staged.as_file().sync_all()?;

        staged.persist_noclobber(&path).map_err(|e| match e.error.kind() {
            ErrorKind::AlreadyExists => Error::SnapshotExists(path.display().to_string()),
            _ => Error::Io(e.error),
        })?;

        log::info!("Saved {} snapshot: {}", stage, path.display());
        Ok(path)
    }

    /// Load a stage output written by an earlier run.
    pub fn read<T: DeserializeOwned>(
        &self,
        stage: Stage,
        timestamp: &RunTimestamp,
    ) -> Result<Vec<T>> {
        let path = self.snapshot_path(stage, timestamp);
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Snapshots present on disk for a run, in stage order.
    pub fn existing(&self, timestamp: &RunTimestamp) -> Vec<PathBuf> {
        Stage::ALL
            .iter()
            .map(|stage| self.snapshot_path(*stage, timestamp))
            .filter(|path| path.is_file())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlideBlock;

    fn ts() -> RunTimestamp {
        RunTimestamp::parse("20240102030405").unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path().join("intermediate"));
        let blocks = vec![SlideBlock::new(0, "# A"), SlideBlock::new(1, "# B")];

        let path = store.write(Stage::Parsed, &ts(), &blocks).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "01_parsed_slides_20240102030405.json"
        );

        let back: Vec<SlideBlock> = store.read(Stage::Parsed, &ts()).unwrap();
        assert_eq!(back, blocks);
    }

    #[test]
    fn test_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());
        let blocks = vec![SlideBlock::new(0, "# A")];

        store.write(Stage::Formatted, &ts(), &blocks).unwrap();
        let err = store.write(Stage::Formatted, &ts(), &blocks).unwrap_err();
        assert!(matches!(err, Error::SnapshotExists(_)));
    }

    /// Serializes its first field, then fails.
    struct FailsMidway;

    impl Serialize for FailsMidway {
        fn serialize<S: serde::Serializer>(
            &self,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            use serde::ser::{Error as _, SerializeStruct};
            let mut record = serializer.serialize_struct("FailsMidway", 2)?;
            record.serialize_field("text", "x".repeat(64 * 1024).as_str())?;
            Err(S::Error::custom("record cannot be serialized"))
        }
    }

    #[test]
    fn test_failed_write_leaves_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());

        let err = store.write(Stage::Parsed, &ts(), &[FailsMidway]).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(!store.snapshot_path(Stage::Parsed, &ts()).exists());
        assert!(store.existing(&ts()).is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let blocks = vec![SlideBlock::new(0, "# A")];
        store.write(Stage::Parsed, &ts(), &blocks).unwrap();
        let back: Vec<SlideBlock> = store.read(Stage::Parsed, &ts()).unwrap();
        assert_eq!(back, blocks);
    }

    #[test]
    fn test_existing_in_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());
        let empty: Vec<SlideBlock> = Vec::new();

        store.write(Stage::TemplateSelection, &ts(), &empty).unwrap();
        store.write(Stage::Parsed, &ts(), &empty).unwrap();

        let names: Vec<String> = store
            .existing(&ts())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "01_parsed_slides_20240102030405.json",
                "03_template_selection_20240102030405.json"
            ]
        );
    }
}

//! Per-file content fingerprints for change detection
//!
//! A build records the SHA-256 of every schema resource it compiled. The
//! next build compares against that record to find the modified, added and
//! removed files, which seed the rebuild plan.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use xsom_loader::ResourceLoader;

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub content_hash: String,
    pub size: u64,
}

impl FileFingerprint {
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self {
            content_hash: format!("{:x}", hasher.finalize()),
            size: content.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFingerprints {
    pub files: BTreeMap<String, FileFingerprint>,
    /// Hash over every file name and content hash, for quick comparison
    pub combined_hash: String,
    pub created_at: DateTime<Utc>,
    /// Version of xsom that recorded these fingerprints
    pub xsom_version: String,
}

/// Difference between two fingerprint records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub modified: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    /// Recorded by a different xsom version; nothing can be reused
    pub version_changed: bool,
}

impl ChangeSet {
    /// Every file whose namespaces need recompiling
    pub fn changed_files(&self) -> BTreeSet<String> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.removed)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.version_changed
            && self.modified.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
    }
}

impl FileFingerprints {
    pub fn from_contents<I, N, C>(contents: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: AsRef<[u8]>,
    {
        let files: BTreeMap<String, FileFingerprint> = contents
            .into_iter()
            .map(|(name, content)| (name.into(), FileFingerprint::of(content.as_ref())))
            .collect();

        let mut hasher = Sha256::new();
        for (name, fingerprint) in &files {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(fingerprint.content_hash.as_bytes());
        }

        Self {
            files,
            combined_hash: format!("{:x}", hasher.finalize()),
            created_at: Utc::now(),
            xsom_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Fingerprint the loader's resources accepted by `filter`
    pub fn capture(loader: &dyn ResourceLoader, filter: impl Fn(&str) -> bool) -> Result<Self> {
        let mut contents = Vec::new();
        for name in loader.resource_names()?.into_iter().filter(|name| filter(name)) {
            // listed a moment ago; a concurrent delete just drops it
            if let Some(bytes) = loader.read(&name)? {
                contents.push((name, bytes));
            }
        }
        let fingerprints = Self::from_contents(contents);
        debug!(
            "Captured fingerprints for {} file(s): {}",
            fingerprints.files.len(),
            fingerprints.short_hash()
        );
        Ok(fingerprints)
    }

    pub fn changes_since(&self, previous: &FileFingerprints) -> ChangeSet {
        let mut changes = ChangeSet {
            version_changed: self.xsom_version != previous.xsom_version,
            ..ChangeSet::default()
        };
        if self.combined_hash == previous.combined_hash {
            return changes;
        }

        for (name, fingerprint) in &self.files {
            match previous.files.get(name) {
                None => {
                    changes.added.insert(name.clone());
                }
                Some(old) if old != fingerprint => {
                    changes.modified.insert(name.clone());
                }
                Some(_) => {}
            }
        }
        changes.removed = previous
            .files
            .keys()
            .filter(|name| !self.files.contains_key(*name))
            .cloned()
            .collect();
        changes
    }

    pub fn short_hash(&self) -> String {
        self.combined_hash.chars().take(12).collect()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// `None` when no fingerprints were recorded yet
    pub fn load_from_file(path: &Path) -> Result<Option<Self>> {
        read_json(path)
    }
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let io_error = |source: std::io::Error| CompileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(io_error)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CompileError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(Some(serde_json::from_str(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xsom_loader::MemoryLoader;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_contents_have_no_changes() {
        let a = FileFingerprints::from_contents([("a.xsd", "<a/>"), ("b.xsd", "<b/>")]);
        let b = FileFingerprints::from_contents([("b.xsd", "<b/>"), ("a.xsd", "<a/>")]);

        assert_eq!(a.combined_hash, b.combined_hash);
        assert!(b.changes_since(&a).is_empty());
        assert_eq!(a.short_hash().len(), 12);
    }

    #[test]
    fn test_changes_are_classified() {
        let before = FileFingerprints::from_contents([
            ("keep.xsd", "<k/>"),
            ("edit.xsd", "<e/>"),
            ("gone.xsd", "<g/>"),
        ]);
        let after = FileFingerprints::from_contents([
            ("keep.xsd", "<k/>"),
            ("edit.xsd", "<e version='2'/>"),
            ("new.xsd", "<n/>"),
        ]);

        let changes = after.changes_since(&before);
        assert_eq!(changes.modified, set(&["edit.xsd"]));
        assert_eq!(changes.added, set(&["new.xsd"]));
        assert_eq!(changes.removed, set(&["gone.xsd"]));
        assert!(!changes.version_changed);
        assert_eq!(
            changes.changed_files(),
            set(&["edit.xsd", "gone.xsd", "new.xsd"])
        );
    }

    #[test]
    fn test_version_change_is_reported() {
        let mut before = FileFingerprints::from_contents([("a.xsd", "<a/>")]);
        before.xsom_version = "0.0.1".to_string();
        let after = FileFingerprints::from_contents([("a.xsd", "<a/>")]);

        let changes = after.changes_since(&before);
        assert!(changes.version_changed);
        assert!(!changes.is_empty());
        assert!(changes.changed_files().is_empty());
    }

    #[test]
    fn test_capture_from_loader() {
        let loader = MemoryLoader::new()
            .with("a.xsd", "<a/>")
            .unwrap()
            .with("nested/b.xsd", "<b/>")
            .unwrap()
            .with("README.txt", "notes")
            .unwrap();

        let fingerprints =
            FileFingerprints::capture(&loader, |name| name.ends_with(".xsd")).unwrap();
        assert_eq!(
            fingerprints.files.keys().cloned().collect::<Vec<_>>(),
            vec!["a.xsd".to_string(), "nested/b.xsd".to_string()]
        );
        assert_eq!(fingerprints.files["a.xsd"], FileFingerprint::of(b"<a/>"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/fingerprints.json");
        assert!(FileFingerprints::load_from_file(&path).unwrap().is_none());

        let fingerprints = FileFingerprints::from_contents([("a.xsd", "<a/>")]);
        fingerprints.save_to_file(&path).unwrap();

        let loaded = FileFingerprints::load_from_file(&path).unwrap().unwrap();
        assert_eq!(loaded.files, fingerprints.files);
        assert_eq!(loaded.combined_hash, fingerprints.combined_hash);
        assert!(loaded.changes_since(&fingerprints).is_empty());
    }
}

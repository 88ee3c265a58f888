use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;
use walkdir::WalkDir;

use crate::error::{LoaderError, Result};
use crate::{normalize_name, ResourceLoader};

/// Resources are the files below a root directory
#[derive(Debug)]
pub struct DirectoryLoader {
    root: PathBuf,
    closed: AtomicBool,
}

impl DirectoryLoader {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| LoaderError::io(root, e))?;
        Ok(Self {
            root,
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoaderError::Closed);
        }
        Ok(())
    }
}

impl ResourceLoader for DirectoryLoader {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let path = self.root.join(normalize_name(name)?);

        match fs::read(&path) {
            Ok(bytes) => {
                trace!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // a directory with the requested name is not a resource
            Err(_) if path.is_dir() => Ok(None),
            Err(e) => Err(LoaderError::io(path, e)),
        }
    }

    fn resource_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

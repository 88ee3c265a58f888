//! Named byte-stream sources for schema documents
//!
//! A [`ResourceLoader`] hands out the bytes of a schema document by its
//! relative name. Directories, zip/jar archives and in-memory maps are
//! supported; [`open`] picks the right one for a locator path.

pub mod archive;
pub mod directory;
pub mod error;
pub mod memory;

use std::path::Path;

use tracing::debug;

pub use archive::ArchiveLoader;
pub use directory::DirectoryLoader;
pub use error::{LoaderError, Result};
pub use memory::MemoryLoader;

pub trait ResourceLoader: Send + Sync {
    /// Bytes of the named resource, or `None` when no such resource exists
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Every resource name, sorted, with `/` separators
    fn resource_names(&self) -> Result<Vec<String>>;

    /// Release underlying handles. Closing twice is a no-op; reads after
    /// closing fail with [`LoaderError::Closed`].
    fn close(&self);
}

/// Open a directory or a `.zip`/`.jar` archive
pub fn open(locator: impl AsRef<Path>) -> Result<Box<dyn ResourceLoader>> {
    let locator = locator.as_ref();
    if locator.is_dir() {
        debug!("Opening directory loader at {}", locator.display());
        return Ok(Box::new(DirectoryLoader::new(locator)?));
    }

    let is_archive = locator
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip") || ext.eq_ignore_ascii_case("jar"));
    if is_archive {
        debug!("Opening archive loader at {}", locator.display());
        return Ok(Box::new(ArchiveLoader::open(locator)?));
    }

    Err(LoaderError::UnsupportedLocator(locator.to_path_buf()))
}

/// Reject absolute names and names that climb out of the root
pub(crate) fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim_start_matches("./").replace('\\', "/");
    let escapes = trimmed
        .split('/')
        .any(|segment| segment == ".." || segment.contains(':'));
    if trimmed.is_empty() || trimmed.starts_with('/') || escapes {
        return Err(LoaderError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{LoaderError, Result};
use crate::{normalize_name, ResourceLoader};

/// Resources are the file entries of a zip or jar archive
///
/// The archive handle is shared behind a mutex: zip entries are read through
/// a single seekable file.
pub struct ArchiveLoader {
    path: PathBuf,
    archive: Mutex<Option<ZipArchive<File>>>,
}

impl ArchiveLoader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| LoaderError::io(&path, e))?;
        let archive = ZipArchive::new(file)?;
        debug!("Opened archive {} with {} entries", path.display(), archive.len());

        Ok(Self {
            path,
            archive: Mutex::new(Some(archive)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResourceLoader for ArchiveLoader {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let name = normalize_name(name)?;
        let mut guard = self.archive.lock();
        let archive = guard.as_mut().ok_or(LoaderError::Closed)?;

        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.is_dir() {
            return Ok(None);
        }

        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| LoaderError::io(self.path.join(&name), e))?;
        trace!("Read {} bytes from {}!{}", bytes.len(), self.path.display(), name);
        Ok(Some(bytes))
    }

    fn resource_names(&self) -> Result<Vec<String>> {
        let mut guard = self.archive.lock();
        let archive = guard.as_mut().ok_or(LoaderError::Closed)?;

        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if !entry.is_file() {
                continue;
            }
            // only names that read() would look up unchanged are resources
            match normalize_name(entry.name()) {
                Ok(name) if name == entry.name() => names.push(name),
                _ => warn!(
                    "Skipping archive entry {:?} in {}",
                    entry.name(),
                    self.path.display()
                ),
            }
        }
        names.sort();
        Ok(names)
    }

    fn close(&self) {
        if self.archive.lock().take().is_some() {
            debug!("Closed archive {}", self.path.display());
        }
    }
}

impl std::fmt::Debug for ArchiveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveLoader")
            .field("path", &self.path)
            .field("open", &self.archive.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        writer.add_directory("common/", options).unwrap();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_reads_entries_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.jar");
        write_archive(
            &path,
            &[("po.xsd", b"<po/>"), ("common/addr.xsd", b"<addr/>")],
        );

        let loader = ArchiveLoader::open(&path).unwrap();
        assert_eq!(
            loader.resource_names().unwrap(),
            vec!["common/addr.xsd".to_string(), "po.xsd".to_string()]
        );
        assert_eq!(loader.read("./common/addr.xsd").unwrap(), Some(b"<addr/>".to_vec()));
        assert_eq!(loader.read("nope.xsd").unwrap(), None);
        assert_eq!(loader.read("common/").unwrap(), None);
    }

    #[test]
    fn test_entries_outside_the_archive_root_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostile.zip");
        write_archive(
            &path,
            &[
                ("../escape.xsd", b"<x/>"),
                ("/abs.xsd", b"<x/>"),
                ("./dotted.xsd", b"<x/>"),
                ("ok.xsd", b"<ok/>"),
            ],
        );

        let loader = ArchiveLoader::open(&path).unwrap();
        assert_eq!(loader.resource_names().unwrap(), vec!["ok.xsd".to_string()]);
        assert!(matches!(loader.read("../escape.xsd"), Err(LoaderError::InvalidName(_))));
    }

    #[test]
    fn test_close_releases_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.zip");
        write_archive(&path, &[("po.xsd", b"<po/>")]);

        let loader = ArchiveLoader::open(&path).unwrap();
        loader.close();
        loader.close();
        assert!(matches!(loader.read("po.xsd"), Err(LoaderError::Closed)));
        assert!(matches!(loader.resource_names(), Err(LoaderError::Closed)));
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(ArchiveLoader::open(&path), Err(LoaderError::Archive(_))));
    }
}

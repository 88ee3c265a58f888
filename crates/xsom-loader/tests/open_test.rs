use std::fs::{self, File};
use std::io::Write;

use xsom_loader::{open, LoaderError};
use zip::write::FileOptions;
use zip::ZipWriter;

#[test]
fn test_open_directory_and_archive_expose_same_resources() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("schemas");
    fs::create_dir_all(root.join("include")).unwrap();
    fs::write(root.join("main.xsd"), "<main/>").unwrap();
    fs::write(root.join("include/types.xsd"), "<types/>").unwrap();

    let archive_path = dir.path().join("schemas.ZIP");
    let mut writer = ZipWriter::new(File::create(&archive_path).unwrap());
    for name in ["main.xsd", "include/types.xsd"] {
        writer.start_file(name, FileOptions::default()).unwrap();
        writer.write_all(&fs::read(root.join(name)).unwrap()).unwrap();
    }
    writer.finish().unwrap();

    let from_dir = open(&root).unwrap();
    let from_zip = open(&archive_path).unwrap();

    assert_eq!(from_dir.resource_names().unwrap(), from_zip.resource_names().unwrap());
    for name in from_dir.resource_names().unwrap() {
        assert_eq!(from_dir.read(&name).unwrap(), from_zip.read(&name).unwrap());
    }

    from_zip.close();
    assert!(matches!(from_zip.read("main.xsd"), Err(LoaderError::Closed)));
    // the directory loader is independent
    assert!(from_dir.read("main.xsd").unwrap().is_some());
}

#[test]
fn test_open_missing_archive() {
    let dir = tempfile::tempdir().unwrap();
    let err = open(dir.path().join("absent.jar")).err();
    assert!(matches!(err, Some(LoaderError::Io { .. })));
}

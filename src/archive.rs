//! Unpacking an archive into a scratch directory and packing it back up.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{Level, Log};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::FixupError;

/// Location of the manifest inside a jar.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Extracts every entry of `archive_path` below `dest_dir`.
///
/// `dest_dir` is removed first if it exists, so the result never contains
/// stale files. Entries whose names would escape `dest_dir` are skipped.
/// Returns the number of files written.
pub fn extract(
    archive_path: &Path,
    dest_dir: &Path,
    logger: &dyn Log,
) -> Result<usize, FixupError> {
    let file = File::open(archive_path).map_err(|e| FixupError::open(archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| FixupError::archive(archive_path, e))?;

    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir).map_err(|e| FixupError::io(dest_dir, e))?;
    }
    fs::create_dir_all(dest_dir).map_err(|e| FixupError::io(dest_dir, e))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FixupError::archive(archive_path, e))?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                emit!(
                    logger,
                    Level::Warn,
                    "skipping entry with unsafe path {:?} in {}",
                    entry.name(),
                    archive_path.display()
                );
                continue;
            }
        };
        let target = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| FixupError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| FixupError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| FixupError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| FixupError::io(&target, e))?;
        count += 1;
    }

    emit!(
        logger,
        Level::Debug,
        "extracted {} files from {} to {}",
        count,
        archive_path.display(),
        dest_dir.display()
    );
    Ok(count)
}

/// Packs every regular file below `src_dir` into a new archive at
/// `archive_path`, replacing it.
///
/// Directories are not stored as entries. The manifest is written first,
/// all other entries follow in path order. The archive is assembled next to
/// the destination and renamed over it once complete, so a failed write
/// leaves the previous archive in place. Returns the number of entries.
pub fn rebuild(
    src_dir: &Path,
    archive_path: &Path,
    logger: &dyn Log,
) -> Result<usize, FixupError> {
    let mut files = collect_files(src_dir)?;
    files.sort_by(|(a, _), (b, _)| (a != MANIFEST_PATH, a).cmp(&(b != MANIFEST_PATH, b)));

    let tmp_path = tmp_path(archive_path);
    if let Err(err) = write_archive(&tmp_path, &files, logger) {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                emit!(
                    logger,
                    Level::Warn,
                    "could not remove {}: {}",
                    tmp_path.display(),
                    cleanup
                );
            }
        }
        return Err(err);
    }

    fs::rename(&tmp_path, archive_path).map_err(|e| FixupError::io(archive_path, e))?;
    emit!(
        logger,
        Level::Debug,
        "wrote {} entries to {}",
        files.len(),
        archive_path.display()
    );
    Ok(files.len())
}

/// Collects `(entry name, path)` for every regular file below `root`.
fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>, FixupError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            FixupError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = match entry.path().strip_prefix(root) {
            Ok(relative) => entry_name(relative),
            Err(_) => continue,
        };
        files.push((name, entry.into_path()));
    }
    Ok(files)
}

/// Joins path components with `/`, regardless of platform.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn tmp_path(archive_path: &Path) -> PathBuf {
    let mut tmp = OsString::from(archive_path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_archive(
    path: &Path,
    files: &[(String, PathBuf)],
    logger: &dyn Log,
) -> Result<(), FixupError> {
    let file = File::create(path).map_err(|e| FixupError::io(path, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, source) in files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| FixupError::archive(path, e))?;
        let mut input = File::open(source).map_err(|e| FixupError::io(source, e))?;
        io::copy(&mut input, &mut writer).map_err(|e| FixupError::io(source, e))?;
    }

    let buffered = writer.finish().map_err(|e| FixupError::archive(path, e))?;
    let file = buffered
        .into_inner()
        .map_err(|e| FixupError::io(path, e.into_error()))?;
    // everything is written at this point
    if let Err(err) = file.sync_all() {
        emit!(
            logger,
            Level::Warn,
            "could not sync {}: {}",
            path.display(),
            err
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::{Read, Write};
    use std::sync::Mutex;

    use log::{Metadata, Record};

    use super::*;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            let line = format!("{} {}", record.level(), record.args());
            self.0.lock().unwrap().push(line);
        }

        fn flush(&self) {}
    }

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in entries {
            match content {
                Some(content) => {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(content).unwrap();
                }
                None => writer.add_directory(*name, options).unwrap(),
            }
        }
        writer.finish().unwrap();
    }

    fn read_zip(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entries = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            entries.insert(entry.name().to_owned(), content);
        }
        entries
    }

    #[test]
    fn test_extract_then_rebuild_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bundle.jar");
        let class_bytes: Vec<u8> = (0..=255).collect();
        write_zip(
            &jar,
            &[
                ("META-INF/", None),
                ("META-INF/MANIFEST.MF", Some(b"Manifest-Version: 1.0\n".as_slice())),
                ("a/", None),
                ("a/b/", None),
                ("a/b/C.class", Some(class_bytes.as_slice())),
                ("empty/", None),
                ("README", Some(b"".as_slice())),
            ],
        );
        let before = read_zip(&jar);

        let scratch = dir.path().join("bundle");
        let logger = Capture::default();
        assert_eq!(extract(&jar, &scratch, &logger).unwrap(), 3);
        assert!(scratch.join("empty").is_dir());
        assert_eq!(fs::read(scratch.join("a/b/C.class")).unwrap(), class_bytes);

        assert_eq!(rebuild(&scratch, &jar, &logger).unwrap(), 3);
        let after = read_zip(&jar);
        let files: BTreeMap<_, _> = before
            .into_iter()
            .filter(|(name, _)| !name.ends_with('/'))
            .collect();
        assert_eq!(after, files);
        assert!(!tmp_path(&jar).exists());
    }

    #[test]
    fn test_rebuild_puts_manifest_first() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("META-INF")).unwrap();
        fs::create_dir_all(src.join("A")).unwrap();
        fs::write(src.join("A/x.txt"), b"x").unwrap();
        fs::write(src.join("META-INF/MANIFEST.MF"), b"Manifest-Version: 1.0\n").unwrap();
        fs::write(src.join("META-INF/LICENSE"), b"l").unwrap();

        let jar = dir.path().join("out.jar");
        rebuild(&src, &jar, log::logger()).unwrap();

        let archive = ZipArchive::new(File::open(&jar).unwrap()).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert_eq!(names[0], MANIFEST_PATH);
        let mut rest = names[1..].to_vec();
        rest.sort_unstable();
        assert_eq!(rest, ["A/x.txt", "META-INF/LICENSE"]);
    }

    #[test]
    fn test_extract_purges_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bundle.jar");
        write_zip(&jar, &[("a.txt", Some(b"a".as_slice()))]);

        let scratch = dir.path().join("bundle");
        fs::create_dir_all(scratch.join("old")).unwrap();
        fs::write(scratch.join("old/stale.txt"), b"stale").unwrap();

        extract(&jar, &scratch, log::logger()).unwrap();
        assert!(!scratch.join("old").exists());
        assert!(scratch.join("a.txt").is_file());
    }

    #[test]
    fn test_extract_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        fs::write(scratch.join("keep.txt"), b"keep").unwrap();

        let err = extract(&dir.path().join("missing.jar"), &scratch, log::logger()).unwrap_err();
        assert!(matches!(err, FixupError::MissingFile { .. }));
        assert!(scratch.join("keep.txt").exists());
    }

    #[test]
    fn test_extract_skips_unsafe_entries() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("evil.jar");
        write_zip(
            &jar,
            &[
                ("../evil.txt", Some(b"evil".as_slice())),
                ("ok.txt", Some(b"ok".as_slice())),
            ],
        );

        let scratch = dir.path().join("evil");
        let logger = Capture::default();
        assert_eq!(extract(&jar, &scratch, &logger).unwrap(), 1);
        assert!(!dir.path().join("evil.txt").exists());

        let lines = logger.0.lock().unwrap();
        assert!(lines
            .iter()
            .any(|l| l.starts_with("WARN") && l.contains("../evil.txt")));
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("broken.jar");
        fs::write(&jar, b"definitely not a zip file").unwrap();

        let err = extract(&jar, &dir.path().join("broken"), log::logger()).unwrap_err();
        assert!(matches!(err, FixupError::Archive { .. }));
    }

    #[test]
    fn test_rebuild_failure_keeps_archive() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bundle.jar");
        fs::write(&jar, b"ORIGINAL").unwrap();

        let src = dir.path().join("bundle");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();

        // the temporary archive cannot be created over a directory
        fs::create_dir_all(tmp_path(&jar)).unwrap();

        let err = rebuild(&src, &jar, log::logger()).unwrap_err();
        assert!(matches!(err, FixupError::Io { .. }));
        assert_eq!(fs::read(&jar).unwrap(), b"ORIGINAL");
    }

    #[test]
    fn test_entry_name_uses_forward_slashes() {
        let path: PathBuf = ["META-INF", "maven", "pom.xml"].iter().collect();
        assert_eq!(entry_name(&path), "META-INF/maven/pom.xml");
    }
}

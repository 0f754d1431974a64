//! Archival: zip the working tree and tear it down afterwards.
//!
//! The zip is the sole durable artifact of a successful run. Entry order is
//! lexicographic so two runs over identical trees produce identical
//! archives.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::ExportError;

/// Name of the checkpoint file, excluded from the archive.
const CHECKPOINT_FILE: &str = "checkpoint.ckpt";

/// Zip everything under `export_dir` (except the checkpoint file and the
/// archive itself) into `<export_dir>/<org>.zip`.
pub(crate) fn create_archive(export_dir: &Path, org: &str) -> Result<PathBuf, ExportError> {
    let archive_path = export_dir.join(format!("{org}.zip"));
    let file = File::create(&archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    add_dir(&mut zip, export_dir, export_dir, &archive_path, options)?;
    zip.finish()?;

    tracing::info!(archive = %archive_path.display(), "created interchange archive");
    Ok(archive_path)
}

fn add_dir(
    zip: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
    archive_path: &Path,
    options: SimpleFileOptions,
) -> Result<(), ExportError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path == archive_path || entry.file_name() == CHECKPOINT_FILE {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|e| ExportError::Internal(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        if entry.file_type()?.is_dir() {
            zip.add_directory(format!("{relative}/"), options)?;
            add_dir(zip, root, &path, archive_path, options)?;
        } else {
            zip.start_file(relative, options)?;
            let mut src = File::open(&path)?;
            io::copy(&mut src, zip)?;
        }
    }
    Ok(())
}

/// Delete everything in `export_dir` except the archive. Failures are
/// logged, never fatal: the archive already exists and that is what matters.
pub(crate) fn remove_working_tree(export_dir: &Path, archive: &Path) {
    let entries = match fs::read_dir(export_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list working tree for cleanup");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path == archive {
            continue;
        }
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove, skipping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Read;

    fn archive_names(path: &Path) -> BTreeSet<String> {
        let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn archive_contains_tree_but_not_checkpoint_or_itself() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("acme/app/pr")).unwrap();
        fs::write(dir.path().join("acme/app/info.json"), b"{}").unwrap();
        fs::write(dir.path().join("acme/app/pr/pr0.json"), b"[]").unwrap();
        fs::write(dir.path().join("users.json"), b"{\"emails\":[]}").unwrap();
        fs::write(dir.path().join(CHECKPOINT_FILE), b"{}").unwrap();

        let archive = create_archive(dir.path(), "acme").unwrap();
        let names = archive_names(&archive);

        assert!(names.contains("acme/app/info.json"));
        assert!(names.contains("acme/app/pr/pr0.json"));
        assert!(names.contains("users.json"));
        assert!(!names.iter().any(|n| n.contains("checkpoint")));
        assert!(!names.iter().any(|n| n.ends_with(".zip")));
    }

    #[test]
    fn archive_roundtrips_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("users.json"), b"{\"emails\":[\"a@b.c\"]}").unwrap();

        let archive = create_archive(dir.path(), "acme").unwrap();
        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut contents = String::new();
        zip.by_name("users.json")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "{\"emails\":[\"a@b.c\"]}");
    }

    #[test]
    fn working_tree_cleanup_keeps_only_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("acme/app")).unwrap();
        fs::write(dir.path().join("acme/app/info.json"), b"{}").unwrap();
        fs::write(dir.path().join("exporter.log"), b"log\n").unwrap();

        let archive = create_archive(dir.path(), "acme").unwrap();
        remove_working_tree(dir.path(), &archive);

        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("acme.zip")]);
    }
}

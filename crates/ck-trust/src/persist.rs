// persist.rs — Crash-safe JSON documents.
//
// Write protocol for `<path>`:
//   1. serialize and write `<path>.tmp`, fsync it
//   2. copy the current `<path>` (if any) to `<path>.bak`, fsync it
//   3. rename `<path>.tmp` over `<path>` (atomic on POSIX filesystems)
//   4. fsync the parent directory so the rename itself is durable
//
// A reader therefore always finds either the old or the new document at
// `<path>`, never a torn write. If the primary is unreadable for any other
// reason, the reader falls back to `<path>.bak`.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::PersistError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `<path>.<suffix>`, keeping any existing extension.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Path of the fallback copy for `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, "bak")
}

/// Serialize `value` and publish it atomically at `path`.
///
/// Returns only after the new document is durable.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp = sibling(path, "tmp");
    {
        let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(&bytes).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }

    if path.exists() {
        let bak = backup_path(path);
        fs::copy(path, &bak).map_err(io_err(&bak))?;
        File::open(&bak)
            .and_then(|f| f.sync_all())
            .map_err(io_err(&bak))?;
    }

    fs::rename(&tmp, path).map_err(io_err(path))?;
    sync_parent(path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), PersistError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => File::open(dir)
            .and_then(|d| d.sync_all())
            .map_err(io_err(dir)),
        None => Ok(()),
    }
}

// Directory handles cannot be fsynced on this platform; rename durability
// is left to the filesystem.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), PersistError> {
    Ok(())
}

/// Read the document at `path`, falling back to its backup.
///
/// `Ok(None)` means neither copy exists (first run). If a copy exists but
/// neither parses, the caller gets [`PersistError::Unrecoverable`] rather
/// than an empty document.
pub fn read_with_fallback<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let bak = backup_path(path);
    if !path.exists() && !bak.exists() {
        return Ok(None);
    }

    if path.exists() {
        match read_json(path) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => warn!(path = %path.display(), error = %e, "primary document unreadable, trying backup"),
        }
    }

    if bak.exists() {
        match read_json(&bak) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => warn!(path = %bak.display(), error = %e, "backup document unreadable"),
        }
    }

    Err(PersistError::Unrecoverable {
        path: path.to_path_buf(),
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let content = fs::read(path).map_err(io_err(path))?;
    Ok(serde_json::from_slice(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    type Doc = BTreeMap<String, u32>;

    fn doc(pairs: &[(&str, u32)]) -> Doc {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn missing_document_reads_as_none() {
        let dir = tempdir().unwrap();
        let read: Option<Doc> = read_with_fallback(&dir.path().join("ledger.json")).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        write_atomic(&path, &doc(&[("a", 1)])).unwrap();
        let read: Doc = read_with_fallback(&path).unwrap().unwrap();
        assert_eq!(read, doc(&[("a", 1)]));
        assert!(!sibling(&path, "tmp").exists(), "temp file must be renamed away");
    }

    #[test]
    fn second_write_keeps_previous_as_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        write_atomic(&path, &doc(&[("a", 1)])).unwrap();
        write_atomic(&path, &doc(&[("a", 1), ("b", 2)])).unwrap();

        let backup: Doc = serde_json::from_slice(&fs::read(backup_path(&path)).unwrap()).unwrap();
        assert_eq!(backup, doc(&[("a", 1)]));
    }

    #[test]
    fn corrupt_primary_falls_back_to_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        write_atomic(&path, &doc(&[("a", 1)])).unwrap();
        write_atomic(&path, &doc(&[("a", 1), ("b", 2)])).unwrap();

        // Simulate a torn write that bypassed the protocol.
        fs::write(&path, b"{\"a\": 1, \"b\"").unwrap();
        let read: Doc = read_with_fallback(&path).unwrap().unwrap();
        assert_eq!(read, doc(&[("a", 1)]));
    }

    #[test]
    fn both_copies_corrupt_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"garbage").unwrap();
        fs::write(backup_path(&path), b"more garbage").unwrap();
        let result: Result<Option<Doc>, _> = read_with_fallback(&path);
        assert!(matches!(result, Err(PersistError::Unrecoverable { .. })));
    }

    #[test]
    fn leftover_temp_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        write_atomic(&path, &doc(&[("a", 1)])).unwrap();
        // A crash after step 1 leaves a temp file; readers never look at it.
        fs::write(sibling(&path, "tmp"), b"{\"partial").unwrap();
        let read: Doc = read_with_fallback(&path).unwrap().unwrap();
        assert_eq!(read, doc(&[("a", 1)]));
    }
}

use crate::error::Result;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tempfile::NamedTempFile;

/// Atomically replace `path` with `data` via a tempfile in the same directory.
///
/// A sink that dies mid-write must never leave a half-written credentials
/// file behind. The tempfile is created owner-only (0600 on unix) and keeps
/// that mode after the rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-file edit locks
// ---------------------------------------------------------------------------

/// One mutex per distinct file, allocated once and kept for the process.
static FILE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();

/// Exclusive handle on one file for a read-modify-write cycle.
///
/// Parallel sinks may target the same file; each one must hold this from the
/// read through [`atomic_write`], or the last rename drops the other edits.
/// Only serializes writers inside this process.
#[must_use = "the file is unlocked as soon as the guard is dropped"]
pub struct FileLock {
    _guard: MutexGuard<'static, ()>,
}

pub fn lock_file(path: &Path) -> FileLock {
    let key = lock_key(path);
    let mutex: &'static Mutex<()> = {
        let mut table = FILE_LOCKS
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *table
            .entry(key)
            .or_insert_with(|| &*Box::leak(Box::new(Mutex::new(()))))
    };
    FileLock {
        _guard: mutex.lock().unwrap_or_else(PoisonError::into_inner),
    }
}

/// Resolve `path` so that different spellings of one file share a lock.
fn lock_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(dir), Some(name)) => dir.canonicalize().ok().map(|dir| dir.join(name)),
        _ => None,
    };
    resolved.unwrap_or(absolute)
}

//! Small filesystem and naming helpers shared by the config store.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Checks whether `name` is a legal config key.
///
/// Allowed characters are `[0-9a-z_.]`; the empty string is rejected.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'.')
}

/// Recursively collects every regular file under `dir` whose extension
/// matches `extension` (without the leading dot).
///
/// A missing or non-directory path yields an empty list rather than an
/// error, so callers can point at directories that may not exist yet.
pub fn list_files_by_ext(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect_files(dir, extension, &mut files);
    }
    files
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extension, out);
        } else if path.extension().is_some_and(|ext| ext == extension) {
            out.push(path);
        }
    }
}

/// Returns the file's last-modification time at the filesystem clock's
/// full resolution, or `None` when the metadata cannot be read.
pub fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

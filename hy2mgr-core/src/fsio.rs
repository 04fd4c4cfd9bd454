//! Atomic file replacement and copy helpers.
//!
//! Every writer in the workspace funnels through [`atomic_write`]:
//! content goes to a hidden temp sibling, gets its final mode, then is renamed
//! over the target. The temp file lives in the target's directory so the
//! rename never crosses a filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};

/// Replace `path` with `contents`, creating parent directories as needed.
///
/// On failure the temp file is removed and `path` is left untouched.
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    let result = fs::write(&tmp, contents)
        .and_then(|()| set_mode(&tmp, mode))
        .and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Copy `src` to `dst` byte-for-byte and apply `mode` to the copy.
pub fn copy_file(src: &Path, dst: &Path, mode: u32) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let copied = fs::copy(src, dst)?;
    set_mode(dst, mode)?;
    Ok(copied)
}

/// Create `path` (and parents) and force its mode.
pub fn ensure_dir(path: &Path, mode: u32) -> io::Result<()> {
    fs::create_dir_all(path)?;
    set_mode(path, mode)
}

/// UTC RFC 3339 timestamp used in backup file names. Nanosecond digits are
/// fixed width, so names still sort chronologically.
pub fn backup_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `<dir>/<name>.<stamp>.bak` that does not exist yet. An existing backup is
/// never overwritten.
pub fn backup_target(dir: &Path, name: &str) -> PathBuf {
    loop {
        let candidate = dir.join(format!("{name}.{}.bak", backup_stamp()));
        if !candidate.exists() {
            return candidate;
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp.{nanos}"))
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("file.yaml");
        atomic_write(&path, b"hello", 0o640).expect("write");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp file must be renamed away");
    }

    #[test]
    #[cfg(unix)]
    fn atomic_write_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        atomic_write(&path, b"x", 0o600).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    #[cfg(unix)]
    fn failed_rename_keeps_original() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        let path = locked.join("file");
        fs::write(&path, "original").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        let result = atomic_write(&path, b"new", 0o644);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        // Root ignores directory permissions; only assert when the write was refused.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        }
    }

    #[test]
    fn backup_stamp_is_rfc3339_utc() {
        let stamp = backup_stamp();
        assert!(stamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn backup_targets_in_the_same_second_stay_distinct() {
        let dir = TempDir::new().unwrap();
        let mut seen = Vec::new();
        for i in 0..20 {
            let target = backup_target(dir.path(), "config.yaml");
            assert!(!target.exists());
            fs::write(&target, i.to_string()).unwrap();
            seen.push(target);
        }
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(sorted, seen, "names sort in creation order");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 20);
    }
}

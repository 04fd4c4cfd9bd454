//! Daemon config writer.
//!
//! ## Write protocol
//!
//! 1. Render + validate (done by the caller).
//! 2. Read the on-disk config; identical content → [`WriteResult::Unchanged`].
//! 3. Dry-run → [`WriteResult::WouldWrite`], nothing touched.
//! 4. Copy the old file to `config.yaml.<RFC3339>.bak` next to it.
//! 5. Temp sibling → `chmod 0640` → rename.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use hy2mgr_core::fsio;

use crate::error::{io_err, ReconcileError};

const CONFIG_MODE: u32 = 0o640;
const CONFIG_DIR_MODE: u32 = 0o750;

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of a config write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Content changed or the file did not exist. `backup` holds the previous
    /// content when there was any.
    Written { path: PathBuf, backup: Option<PathBuf> },
    /// On-disk content already matches.
    Unchanged { path: PathBuf },
    /// Dry-run: the file would have been written.
    WouldWrite { path: PathBuf },
}

// ---------------------------------------------------------------------------
// write_config
// ---------------------------------------------------------------------------

/// Current content of `path`, or `None` when it does not exist.
pub fn read_existing(path: &Path) -> Result<Option<String>, ReconcileError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Write `content` to `path` unless it is already there.
pub fn write_config(path: &Path, content: &str, dry_run: bool) -> Result<WriteResult, ReconcileError> {
    let existing = read_existing(path)?;
    if existing.as_deref() == Some(content) {
        debug!("unchanged: {}", path.display());
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    if dry_run {
        info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        fsio::ensure_dir(parent, CONFIG_DIR_MODE).map_err(|e| io_err(parent, e))?;
    }

    let backup = match existing {
        Some(_) => {
            let target = backup_path(path);
            fsio::copy_file(path, &target, CONFIG_MODE).map_err(|e| io_err(&target, e))?;
            Some(target)
        }
        None => None,
    };

    fsio::atomic_write(path, content.as_bytes(), CONFIG_MODE).map_err(|e| io_err(path, e))?;
    info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
        backup,
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let name = file_name(path);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fsio::backup_target(dir, &name)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Backups / restore
// ---------------------------------------------------------------------------

/// `<name>.*.bak` siblings of `config_path`, sorted (oldest first).
pub fn config_backups(config_path: &Path) -> Result<Vec<PathBuf>, ReconcileError> {
    let Some(dir) = config_path.parent() else {
        return Ok(vec![]);
    };
    if !dir.exists() {
        return Ok(vec![]);
    }
    let prefix = format!("{}.", file_name(config_path));
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(&prefix) && name.ends_with(".bak")
        })
        .map(|e| e.path())
        .collect();
    found.sort();
    Ok(found)
}

pub fn latest_backup(config_path: &Path) -> Result<Option<PathBuf>, ReconcileError> {
    Ok(config_backups(config_path)?.pop())
}

/// Copy a backup over `config_path`.
///
/// `backup` may be a bare file name (resolved next to the config) or an
/// absolute path; `None` picks the latest backup. Returns the backup used.
pub fn restore_config(config_path: &Path, backup: Option<&str>) -> Result<PathBuf, ReconcileError> {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let source = match backup {
        Some(name) if Path::new(name).is_absolute() => PathBuf::from(name),
        Some(name) => dir.join(name),
        None => latest_backup(config_path)?.ok_or_else(|| ReconcileError::NoBackup {
            dir: dir.to_path_buf(),
        })?,
    };
    fsio::copy_file(&source, config_path, CONFIG_MODE).map_err(|e| io_err(&source, e))?;
    info!(from = %source.display(), "config restored");
    Ok(source)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

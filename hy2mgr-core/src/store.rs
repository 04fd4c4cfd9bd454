//! Persisted desired state.
//!
//! # Storage layout
//!
//! ```text
//! <state_dir>/
//!   state.json                         (mode 0600)
//!   backups/state.json.<RFC3339>.bak   (prior content, copied unmodified)
//! ```
//!
//! Saves are serialized through a store-scoped mutex so that two writers in
//! the same process never interleave their backup and rename steps.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{io_err, StateError};
use crate::fsio;
use crate::layout::Layout;
use crate::types::DesiredState;

const STATE_FILE_MODE: u32 = 0o600;
const STATE_DIR_MODE: u32 = 0o700;

/// Owner of `state.json`: load-or-init and crash-safe save with backups.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    backups_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(layout: &Layout) -> Self {
        Self::at(layout.state_path(), layout.state_backups_dir())
    }

    /// Store with explicit paths; used by tests with a `TempDir`.
    pub fn at(path: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backups_dir: backups_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    // -----------------------------------------------------------------------
    // 1. Load
    // -----------------------------------------------------------------------

    /// Load the record, or return the default record when the file is absent.
    ///
    /// Returns `StateError::Decode` (with the path) for structurally invalid
    /// content. A zero `version` is normalized to the current one.
    pub fn load_or_init(&self) -> Result<DesiredState, StateError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "state absent, using defaults");
            return Ok(DesiredState::default());
        }
        let raw = fs::read(&self.path).map_err(|e| io_err(&self.path, e))?;
        let mut state: DesiredState =
            serde_json::from_slice(&raw).map_err(|source| StateError::Decode {
                path: self.path.clone(),
                source,
            })?;
        state.normalize();
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // 2. Save (atomic)
    // -----------------------------------------------------------------------

    /// Persist `state`, backing up the previous file first.
    ///
    /// Write flow: copy prior file to `backups/` (best-effort) → serialize →
    /// temp sibling → `chmod 0600` → `rename`. Returns the backup path when one
    /// was taken.
    pub fn save_atomic(&self, state: &DesiredState) -> Result<Option<PathBuf>, StateError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let body = serde_json::to_vec_pretty(state)?;
        if let Some(dir) = self.path.parent() {
            fsio::ensure_dir(dir, STATE_DIR_MODE).map_err(|e| io_err(dir, e))?;
        }

        let backup = if self.path.exists() {
            self.backup_prior()
        } else {
            None
        };

        fsio::atomic_write(&self.path, &body, STATE_FILE_MODE)
            .map_err(|e| io_err(&self.path, e))?;
        info!(path = %self.path.display(), nodes = state.nodes.len(), "state saved");
        Ok(backup)
    }

    fn backup_prior(&self) -> Option<PathBuf> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        let target = fsio::backup_target(&self.backups_dir, &name);
        let result = fsio::ensure_dir(&self.backups_dir, STATE_DIR_MODE)
            .and_then(|()| fsio::copy_file(&self.path, &target, STATE_FILE_MODE));
        match result {
            Ok(_) => Some(target),
            Err(e) => {
                warn!(path = %target.display(), error = %e, "state backup failed, saving anyway");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Backups
    // -----------------------------------------------------------------------

    /// Existing state backups, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>, StateError> {
        if !self.backups_dir.exists() {
            return Ok(vec![]);
        }
        let mut found: Vec<PathBuf> = fs::read_dir(&self.backups_dir)
            .map_err(|e| io_err(&self.backups_dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "bak").unwrap_or(false))
            .collect();
        found.sort();
        Ok(found)
    }
}

//! Unified diff of the on-disk config against what `apply` would write.
//!
//! Both sides are masked before diffing so passwords never reach a terminal.

use std::path::{Path, PathBuf};

use similar::TextDiff;

use hy2mgr_render::mask_userpass;

use crate::error::ReconcileError;
use crate::writer::read_existing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiff {
    pub path: PathBuf,
    pub unified_diff: String,
    /// Only masked values (passwords) differ; `unified_diff` is empty.
    pub secrets_only: bool,
}

/// Diff `rendered` against the file at `path`. `None` when they are identical.
/// A missing file diffs as empty.
pub fn diff_config(path: &Path, rendered: &str) -> Result<Option<ConfigDiff>, ReconcileError> {
    let existing = read_existing(path)?.unwrap_or_default();
    if existing == rendered {
        return Ok(None);
    }
    let old = mask_userpass(&existing);
    let new = mask_userpass(rendered);
    if old == new {
        return Ok(Some(ConfigDiff {
            path: path.to_path_buf(),
            unified_diff: String::new(),
            secrets_only: true,
        }));
    }
    let name = path.display().to_string();
    let unified = TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&format!("a{name}"), &format!("b{name}"))
        .context_radius(3)
        .to_string();
    Ok(Some(ConfigDiff {
        path: path.to_path_buf(),
        unified_diff: unified,
        secrets_only: false,
    }))
}

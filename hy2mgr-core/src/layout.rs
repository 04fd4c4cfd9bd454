//! Well-known filesystem locations.
//!
//! ```text
//! <root>/etc/hy2mgr/
//!   state.json                  (mode 0600)
//!   backups/state.json.<ts>.bak
//! <root>/etc/hysteria/
//!   config.yaml                 (mode 0640) + config.yaml.<ts>.bak siblings
//!   cert.crt                    (mode 0644)
//!   cert.key                    (mode 0640)
//! ```
//!
//! `<root>` is `/` in production. Setting `HY2MGR_ROOT` re-roots every path,
//! which is how the integration tests and staging installs run.

use std::path::{Path, PathBuf};

/// systemd unit of the managed daemon.
pub const DAEMON_UNIT: &str = "hysteria-server.service";
/// systemd unit of the manager's own web service.
pub const MANAGER_UNIT: &str = "hy2mgr.service";
/// Environment variable that re-roots [`Layout::from_env`].
pub const ROOT_ENV: &str = "HY2MGR_ROOT";

/// All paths the manager reads or writes, derived from a single root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Production layout rooted at `/`.
    pub fn system() -> Self {
        Self::under("/")
    }

    pub fn under(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `HY2MGR_ROOT` when set and non-empty, otherwise [`Layout::system`].
    pub fn from_env() -> Self {
        match std::env::var_os(ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::under(root),
            _ => Self::system(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when operating on the real host filesystem.
    pub fn is_system(&self) -> bool {
        self.root == Path::new("/")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("etc").join("hy2mgr")
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    pub fn state_backups_dir(&self) -> PathBuf {
        self.state_dir().join("backups")
    }

    pub fn daemon_dir(&self) -> PathBuf {
        self.root.join("etc").join("hysteria")
    }

    pub fn config_path(&self) -> PathBuf {
        self.daemon_dir().join("config.yaml")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.daemon_dir().join("cert.crt")
    }

    pub fn key_path(&self) -> PathBuf {
        self.daemon_dir().join("cert.key")
    }
}

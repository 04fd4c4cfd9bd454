//! Permission self-heal for the daemon's TLS and config files.
//!
//! The daemon usually runs as an unprivileged account, so the key and config
//! must be group-readable by that account's group and owned by root.

use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid, Uid, User};
use tracing::{debug, warn};

use hy2mgr_core::{fsio, Layout};

use crate::systemd::ServiceController;

/// Account the daemon runs as when its unit names none.
pub const DEFAULT_SERVICE_USER: &str = "hysteria";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSpec {
    pub path: PathBuf,
    pub mode: u32,
}

/// Required modes, applied in this order.
pub fn desired_permissions(layout: &Layout) -> Vec<PermissionSpec> {
    let spec = |path: PathBuf, mode| PermissionSpec { path, mode };
    let key = layout.key_path();
    let config = layout.config_path();
    vec![
        spec(parent_of(&key), 0o750),
        spec(key, 0o640),
        spec(layout.cert_path(), 0o644),
        spec(config.clone(), 0o640),
        spec(parent_of(&config), 0o750),
    ]
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Value of the last `User=` directive in a unit file, if any.
pub fn service_user(unit_text: &str) -> Option<String> {
    unit_text
        .lines()
        .filter_map(|l| l.trim().strip_prefix("User="))
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .last()
}

/// Best-effort chmod/chown of the daemon's files.
#[derive(Debug, Clone)]
pub struct PermissionHealer {
    layout: Layout,
    unit: String,
}

impl PermissionHealer {
    pub fn new(layout: Layout, unit: impl Into<String>) -> Self {
        Self {
            layout,
            unit: unit.into(),
        }
    }

    /// Apply [`desired_permissions`] and chown to `root:<service group>`.
    ///
    /// Never fails; every problem is returned as a warning line.
    pub fn fix_key_permission(&self, services: &dyn ServiceController) -> Vec<String> {
        let mut warnings = Vec::new();

        let unit_text = services.cat(&self.unit).unwrap_or_else(|e| {
            debug!(unit = %self.unit, error = %e, "unit text unavailable");
            String::new()
        });
        let user = service_user(&unit_text).unwrap_or_else(|| DEFAULT_SERVICE_USER.to_string());
        let gid = match User::from_name(&user) {
            Ok(Some(u)) => Some(u.gid),
            Ok(None) => {
                warnings.push(format!("service user {user:?} not found; ownership left unchanged"));
                None
            }
            Err(e) => {
                warnings.push(format!("looking up service user {user:?}: {e}"));
                None
            }
        };

        for spec in desired_permissions(&self.layout) {
            if let Err(e) = fsio::set_mode(&spec.path, spec.mode) {
                warnings.push(format!("chmod {:o} {}: {e}", spec.mode, spec.path.display()));
            }
            if let Some(gid) = gid {
                if let Err(e) = chown_root(&spec.path, gid) {
                    warnings.push(format!("chown root:{gid} {}: {e}", spec.path.display()));
                }
            }
        }
        for w in &warnings {
            warn!("{w}");
        }
        warnings
    }
}

fn chown_root(path: &Path, gid: Gid) -> nix::Result<()> {
    chown(path, Some(Uid::from_raw(0)), Some(gid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systemd::MemoryServiceController;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case("[Service]\nUser=hysteria\n", Some("hysteria"))]
    #[case("[Service]\nUser=a\n# drop-in\n[Service]\n  User=b  \n", Some("b"))]
    #[case("[Service]\nExecStart=/usr/bin/x\n", None)]
    #[case("[Service]\nUser=\n", None)]
    fn service_user_takes_last_directive(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(service_user(text).as_deref(), expected);
    }

    #[test]
    fn desired_permissions_cover_required_modes() {
        let layout = Layout::system();
        let perms = desired_permissions(&layout);
        let mode_of = |p: PathBuf| perms.iter().find(|s| s.path == p).map(|s| s.mode);
        assert_eq!(mode_of(layout.key_path()), Some(0o640));
        assert_eq!(mode_of(layout.cert_path()), Some(0o644));
        assert_eq!(mode_of(layout.config_path()), Some(0o640));
        assert_eq!(mode_of(layout.daemon_dir()), Some(0o750));
    }

    #[test]
    #[cfg(unix)]
    fn heal_sets_modes_and_reports_unresolvable_user() {
        use std::os::unix::fs::PermissionsExt;
        let root = TempDir::new().unwrap();
        let layout = Layout::under(root.path());
        fs::create_dir_all(layout.daemon_dir()).unwrap();
        for p in [layout.key_path(), layout.cert_path(), layout.config_path()] {
            fs::write(&p, "x").unwrap();
            fs::set_permissions(&p, fs::Permissions::from_mode(0o600)).unwrap();
        }
        let services = MemoryServiceController::new().with_unit_file(
            "hysteria-server.service",
            "[Service]\nUser=hy2mgr-no-such-user-xyz\n",
        );

        let warnings = PermissionHealer::new(layout.clone(), "hysteria-server.service")
            .fix_key_permission(&services);

        let mode = |p: PathBuf| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(layout.key_path()), 0o640);
        assert_eq!(mode(layout.cert_path()), 0o644);
        assert_eq!(mode(layout.config_path()), 0o640);
        assert_eq!(mode(layout.daemon_dir()), 0o750);
        assert!(warnings.iter().any(|w| w.contains("hy2mgr-no-such-user-xyz")));
    }

    #[test]
    fn missing_files_become_warnings() {
        let root = TempDir::new().unwrap();
        let services = MemoryServiceController::new();
        let warnings = PermissionHealer::new(Layout::under(root.path()), "hysteria-server.service")
            .fix_key_permission(&services);
        assert!(warnings.iter().any(|w| w.starts_with("chmod")));
    }
}

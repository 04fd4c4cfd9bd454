//! `hy2mgr apply`, `hy2mgr diff` and `hy2mgr restore`.

use anyhow::{Context, Result};
use clap::Args;

use hy2mgr_sync::diff_config;

use super::{alert, banner, done, print_apply_report, Host};

/// Arguments for `hy2mgr apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Preview the config (passwords masked) without touching the host.
    #[arg(long)]
    pub dry_run: bool,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(true)?;
        let mut state = host.load_state()?;

        let report = host
            .manager()
            .apply(&mut state, self.dry_run)
            .context("apply failed")?;

        if let Some(preview) = &report.preview {
            banner("Preview of config (passwords masked)");
            print!("{preview}");
        }
        print_apply_report(&report);
        if report.dry_run {
            done("Dry run complete.");
        } else {
            done("Applied.");
        }
        Ok(())
    }
}

/// Arguments for `hy2mgr diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(false)?;
        let state = host.load_state()?;
        let rendered = host
            .reconciler
            .render(&state)
            .context("failed to render config")?;

        let path = host.layout.config_path();
        let Some(diff) = diff_config(&path, &rendered).context("diff failed")? else {
            println!("No differences for {}.", path.display());
            return Ok(());
        };
        if diff.secrets_only {
            println!("Only masked credentials differ in {}.", path.display());
            return Ok(());
        }
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}

/// Arguments for `hy2mgr restore`.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup file name or absolute path (default: latest).
    #[arg(long)]
    pub backup: Option<String>,
}

impl RestoreArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(true)?;
        let report = host
            .manager()
            .restore(self.backup.as_deref())
            .context("restore failed")?;

        println!("Restoring from: {}", report.backup.display());
        match report.restart_warning {
            None => done("Restored and restarted."),
            Some(w) => alert(&format!("Restored, but restart failed: {w}")),
        }
        Ok(())
    }
}

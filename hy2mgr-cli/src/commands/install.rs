//! `hy2mgr install` and `hy2mgr uninstall`.
//!
//! Both drive the official Hysteria2 install script. Unlike reconcile steps,
//! script failures here are fatal.

use std::fs;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::warn;

use hy2mgr_core::DAEMON_UNIT;
use hy2mgr_host::{CommandRunner, SystemRunner, DEFAULT_SERVICE_USER};

use super::{alert, banner, done, print_apply_report, Host};

const INSTALL_SCRIPT: &str = "bash <(curl -fsSL https://get.hy2.sh/)";
const HEALTH_LOG_LINES: usize = 120;

/// Arguments for `hy2mgr install`.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Print what would happen without changing the host.
    #[arg(long)]
    pub dry_run: bool,

    /// Install a specific Hysteria2 version (e.g. v2.7.0).
    #[arg(long)]
    pub version: Option<String>,
}

impl InstallArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(true)?;

        banner("Installing/Upgrading Hysteria2 via official script (get.hy2.sh)");
        let script = match &self.version {
            Some(v) => format!("{INSTALL_SCRIPT} --version {v}"),
            None => INSTALL_SCRIPT.to_string(),
        };
        if self.dry_run {
            println!("[dry-run] {script}");
        } else {
            run_script(&script, &[("HYSTERIA_USER", DEFAULT_SERVICE_USER)])
                .context("install hysteria2 failed")?;
        }

        let mut state = host.load_state()?;
        let mgr = host.manager();

        if state.subscription.token_hashed.is_empty() {
            if self.dry_run {
                println!("[dry-run] would issue a subscription token");
            } else {
                let issued = mgr
                    .subscription_rotate(&mut state)
                    .context("failed to issue subscription token")?;
                println!("{}", "==> Subscription token (shown once):".cyan().bold());
                println!("    token: {}", issued.token);
                println!("    path:  {}", issued.path);
                println!("    (Rotate later: hy2mgr export subscription --rotate)");
            }
        }

        banner("Applying configuration (idempotent)");
        let report = mgr.apply(&mut state, self.dry_run).context("apply failed")?;
        print_apply_report(&report);

        if !self.dry_run {
            health_check(&host);
        }
        done("Done.");
        Ok(())
    }
}

/// Report daemon state; dump status and recent logs when it is not running.
fn health_check(host: &Host) {
    banner(&format!("Checking {DAEMON_UNIT}"));
    let services = host.reconciler.services();
    if services.is_active(DAEMON_UNIT) {
        done(&format!("{DAEMON_UNIT} is active"));
        return;
    }
    alert(&format!("{DAEMON_UNIT} is not running"));
    if let Ok(out) = services.status(DAEMON_UNIT) {
        println!("{}", out.trim_end());
    }
    if let Ok(logs) = services.journal_tail(DAEMON_UNIT, HEALTH_LOG_LINES) {
        println!("{}", format!("==> Recent logs ({DAEMON_UNIT})").yellow().bold());
        println!("{}", logs.trim_end());
    }
}

/// Arguments for `hy2mgr uninstall`.
#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Also remove the manager state directory.
    #[arg(long)]
    pub purge: bool,

    /// Print what would happen without changing the host.
    #[arg(long)]
    pub dry_run: bool,
}

impl UninstallArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(true)?;

        banner("Stopping services");
        if self.dry_run {
            println!("[dry-run] systemctl disable --now {DAEMON_UNIT}");
        } else if let Err(e) = host.reconciler.services().disable_now(DAEMON_UNIT) {
            warn!("disable {DAEMON_UNIT}: {e}");
        }

        banner("Removing Hysteria2 via official script");
        let script = format!("{INSTALL_SCRIPT} --remove");
        if self.dry_run {
            println!("[dry-run] {script}");
        } else {
            run_script(&script, &[]).context("remove hysteria2 failed")?;
        }

        let state_dir = host.layout.state_dir();
        if self.purge {
            banner(&format!("Purging state ({})", state_dir.display()));
            if !self.dry_run && state_dir.exists() {
                fs::remove_dir_all(&state_dir)
                    .with_context(|| format!("failed to remove {}", state_dir.display()))?;
            }
        } else {
            println!("State kept. Reinstall will reuse {}", host.store.path().display());
        }

        done("Done.");
        Ok(())
    }
}

fn run_script(script: &str, env: &[(&str, &str)]) -> Result<()> {
    let args = ["-c", script];
    let out = SystemRunner.run_env("bash", &args, env)?.check("bash", &args)?;
    print!("{}", out.stdout);
    Ok(())
}

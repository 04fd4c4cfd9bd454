//! Subcommand implementations and the host context they share.

pub mod apply;
pub mod cert;
pub mod export;
pub mod install;
pub mod node;
pub mod status;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use nix::unistd::Uid;

use hy2mgr_core::{DesiredState, Layout, StateStore};
use hy2mgr_host::{HostFirewall, Systemctl, SystemRunner};
use hy2mgr_sync::{ApplyReport, CertStep, Manager, Reconciler, WriteResult};

// ---------------------------------------------------------------------------
// Host context
// ---------------------------------------------------------------------------

/// Layout, store and a reconciler wired to the real host tools.
pub struct Host {
    pub layout: Layout,
    pub store: StateStore,
    pub reconciler: Reconciler<'static>,
}

impl Host {
    /// Open the host. `mutating` commands require root on the real root.
    pub fn open(mutating: bool) -> Result<Self> {
        let layout = Layout::from_env();
        if mutating {
            require_root(&layout)?;
        }
        let store = StateStore::new(&layout);
        let reconciler = Reconciler::new(
            layout.clone(),
            Systemctl::new(SystemRunner),
            HostFirewall::new(SystemRunner),
        )
        .context("failed to initialise config renderer")?;
        Ok(Self {
            layout,
            store,
            reconciler,
        })
    }

    pub fn manager(&self) -> Manager<'_, 'static> {
        Manager::new(&self.store, &self.reconciler)
    }

    pub fn load_state(&self) -> Result<DesiredState> {
        self.store
            .load_or_init()
            .with_context(|| format!("failed to load {}", self.store.path().display()))
    }
}

pub fn require_root(layout: &Layout) -> Result<()> {
    if layout.is_system() && !Uid::effective().is_root() {
        bail!("this command must be run as root (try: sudo hy2mgr ...)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

pub fn banner(msg: &str) {
    println!("{}", format!("==> {msg}").blue().bold());
}

pub fn alert(msg: &str) {
    println!("{}", format!("!! {msg}").red().bold());
}

pub fn done(msg: &str) {
    println!("{}", msg.green().bold());
}

/// One line per step of an apply, then its warnings.
pub fn print_apply_report(report: &ApplyReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    match &report.cert {
        CertStep::Present => {}
        CertStep::Generated { pin } => println!("{prefix}certificate generated (pinSHA256 {pin})"),
        CertStep::WouldGenerate { pin } => {
            println!("{prefix}certificate would be generated (pinSHA256 {pin})")
        }
    }
    if let Some(id) = &report.default_node {
        println!("{prefix}no nodes defined; added default node {id}");
    }
    if report.port_changed() {
        println!(
            "{prefix}listen port {} unavailable, using {}",
            report.previous_port, report.port
        );
    }
    match &report.config {
        WriteResult::Written { path, backup } => {
            println!("  ✎  {}", path.display());
            if let Some(b) = backup {
                println!("     backup: {}", b.display());
            }
        }
        WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
        WriteResult::Unchanged { path } => println!("  ·  {} (unchanged)", path.display()),
    }
    if let Some(fw) = &report.firewall {
        println!("firewall ({}): {}", fw.backend, fw.message);
    }
    for w in &report.warnings {
        println!("{} {w}", "warning:".yellow().bold());
    }
}

//! hy2mgr, the Hysteria2 proxy manager CLI.
//!
//! # Usage
//!
//! ```text
//! hy2mgr install [--dry-run] [--version V]
//! hy2mgr uninstall [--purge] [--dry-run]
//! hy2mgr status
//! hy2mgr logs [--lines N]
//! hy2mgr apply [--dry-run]
//! hy2mgr diff
//! hy2mgr restore [--backup NAME]
//! hy2mgr node add|rm|ls|enable|disable|reset
//! hy2mgr export uri --id ID | subscription [--rotate] [--revoke]
//! hy2mgr cert rotate [--dry-run] | fingerprint
//! ```
//!
//! Every path is rooted at `/` unless `HY2MGR_ROOT` is set.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    apply::{ApplyArgs, DiffArgs, RestoreArgs},
    cert::CertCommand,
    export::ExportCommand,
    install::{InstallArgs, UninstallArgs},
    node::NodeCommand,
    status::{LogsArgs, StatusArgs},
};

/// Log filter variable; defaults to `warn`.
const LOG_ENV: &str = "HY2MGR_LOG";

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "hy2mgr",
    version,
    about = "Manage a Hysteria2 server from a single desired-state file",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install or upgrade Hysteria2, initialize state and apply it.
    Install(InstallArgs),

    /// Remove Hysteria2 and optionally the manager state.
    Uninstall(UninstallArgs),

    /// Show state location, port, certificate pin and service status.
    Status(StatusArgs),

    /// Show recent journal lines of the daemon.
    Logs(LogsArgs),

    /// Reconcile cert, config, permissions, firewall and service.
    Apply(ApplyArgs),

    /// Unified diff of the on-disk config against the desired one.
    Diff(DiffArgs),

    /// Restore the daemon config from a backup and restart it.
    Restore(RestoreArgs),

    /// Manage nodes (client accounts).
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Export client URIs and the subscription link.
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },

    /// Manage the self-signed certificate.
    Cert {
        #[command(subcommand)]
        command: CertCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Install(args) => args.run(),
        Commands::Uninstall(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Logs(args) => args.run(),
        Commands::Apply(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Restore(args) => args.run(),
        Commands::Node { command } => commands::node::run(command),
        Commands::Export { command } => commands::export::run(command),
        Commands::Cert { command } => commands::cert::run(command),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

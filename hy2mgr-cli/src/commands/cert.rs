//! `hy2mgr cert`: rotate or inspect the self-signed certificate.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use hy2mgr_core::Layout;
use hy2mgr_sync::parse_pin;

use super::{done, print_apply_report, Host};

#[derive(Subcommand, Debug)]
pub enum CertCommand {
    /// Generate a new certificate, apply and restart the daemon.
    Rotate(CertRotateArgs),
    /// Print the pinSHA256 of the current certificate.
    Fingerprint,
}

#[derive(Args, Debug)]
pub struct CertRotateArgs {
    /// Generate and report without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(command: CertCommand) -> Result<()> {
    match command {
        CertCommand::Rotate(args) => {
            let host = Host::open(true)?;
            let mut state = host.load_state()?;
            let (generated, report) = host
                .manager()
                .rotate_cert(&mut state, args.dry_run)
                .context("certificate rotation failed")?;
            print_apply_report(&report);
            println!("pinSHA256: {}", generated.pin);
            done("Rotated.");
            Ok(())
        }
        CertCommand::Fingerprint => {
            let path = Layout::from_env().cert_path();
            let pin = parse_pin(&path)
                .with_context(|| format!("failed to read certificate {}", path.display()))?;
            println!("{pin}");
            Ok(())
        }
    }
}

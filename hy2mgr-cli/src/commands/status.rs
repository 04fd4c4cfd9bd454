//! `hy2mgr status` and `hy2mgr logs`.

use anyhow::Result;
use clap::Args;

use hy2mgr_core::{DAEMON_UNIT, MANAGER_UNIT};
use hy2mgr_sync::parse_pin;

use super::Host;

const DEFAULT_LOG_LINES: usize = 200;
const MAX_LOG_LINES: i64 = 5000;

/// Arguments for `hy2mgr status`.
#[derive(Args, Debug)]
pub struct StatusArgs {}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(false)?;
        let state = host.load_state()?;

        println!("HY2 Manager state: {}", host.store.path().display());
        println!("Listen UDP port: {}", state.settings.listen_port);
        let pin = parse_pin(&host.layout.cert_path()).unwrap_or_else(|e| format!("unavailable ({e})"));
        println!("Cert pinSHA256: {pin}");

        let services = host.reconciler.services();
        for unit in [DAEMON_UNIT, MANAGER_UNIT] {
            println!("\n== {unit} ==");
            match services.status(unit) {
                Ok(out) => println!("{}", out.trim_end()),
                Err(e) => println!("{e}"),
            }
        }
        Ok(())
    }
}

/// Arguments for `hy2mgr logs`.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of journal lines (1..=5000; anything else means 200).
    #[arg(long, default_value_t = 200, allow_negative_numbers = true)]
    pub lines: i64,
}

impl LogsArgs {
    pub fn run(self) -> Result<()> {
        let host = Host::open(false)?;
        let out = host
            .reconciler
            .services()
            .journal_tail(DAEMON_UNIT, clamp_lines(self.lines))?;
        println!("{}", out.trim_end());
        Ok(())
    }
}

fn clamp_lines(requested: i64) -> usize {
    if requested <= 0 || requested > MAX_LOG_LINES {
        DEFAULT_LOG_LINES
    } else {
        requested as usize
    }
}

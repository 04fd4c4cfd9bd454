//! Host firewall: make sure the daemon's UDP port is reachable.
//!
//! The backend is re-detected on every call, in priority order ufw →
//! firewalld → iptables. With none of them installed the call is a no-op.
//! Tool failures never surface as errors; they come back as a warning on the
//! [`FirewallOutcome`].

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::exec::CommandRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Ufw,
    Firewalld,
    Iptables,
    None,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Ufw => "ufw",
            Backend::Firewalld => "firewalld",
            Backend::Iptables => "iptables",
            Backend::None => "none",
        })
    }
}

/// What the adapter did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallAction {
    /// No backend, or the backend is not enforcing.
    Skipped,
    AlreadyOpen,
    Opened,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallOutcome {
    pub backend: Backend,
    pub action: FirewallAction,
    /// Human-readable status line, always present.
    pub message: String,
    pub warning: Option<String>,
}

impl FirewallOutcome {
    fn new(backend: Backend, action: FirewallAction, message: impl Into<String>) -> Self {
        Self {
            backend,
            action,
            message: message.into(),
            warning: None,
        }
    }

    fn failed(backend: Backend, detail: impl fmt::Display) -> Self {
        let message = format!("{backend}: could not open port: {detail}");
        Self {
            backend,
            action: FirewallAction::Failed,
            warning: Some(message.clone()),
            message,
        }
    }

    fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Opens a UDP port on whatever firewall the host runs.
pub trait FirewallBackend {
    fn ensure_udp_port_open(&self, port: u16) -> FirewallOutcome;
}

impl<T: FirewallBackend + ?Sized> FirewallBackend for &T {
    fn ensure_udp_port_open(&self, port: u16) -> FirewallOutcome {
        (**self).ensure_udp_port_open(port)
    }
}

/// [`FirewallBackend`] that shells out through a [`CommandRunner`].
#[derive(Debug, Clone, Default)]
pub struct HostFirewall<R> {
    runner: R,
}

impl<R: CommandRunner> HostFirewall<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn detect(&self) -> Backend {
        if self.runner.exists("ufw") {
            Backend::Ufw
        } else if self.runner.exists("firewall-cmd") {
            Backend::Firewalld
        } else if self.runner.exists("iptables") {
            Backend::Iptables
        } else {
            Backend::None
        }
    }

    /// Combined output of a command; spawn failures read as empty text.
    fn output_of(&self, program: &str, args: &[&str]) -> String {
        match self.runner.run(program, args) {
            Ok(out) => out.combined(),
            Err(e) => {
                debug!(program, error = %e, "firewall probe failed");
                String::new()
            }
        }
    }

    /// Run a mutating command; `Err` carries a printable reason.
    fn mutate(&self, program: &str, args: &[&str]) -> Result<(), String> {
        self.runner
            .run(program, args)
            .and_then(|out| out.check(program, args))
            .map(drop)
            .map_err(|e| e.to_string())
    }

    // -----------------------------------------------------------------------
    // 1. ufw
    // -----------------------------------------------------------------------

    fn ensure_ufw(&self, port: u16) -> FirewallOutcome {
        let status = self.output_of("ufw", &["status"]);
        if status.contains("Status: inactive") {
            return FirewallOutcome::new(Backend::Ufw, FirewallAction::Skipped, "UFW detected but inactive; skipped.");
        }
        let rule = format!("{port}/udp");
        if ufw_has_rule(&status, &rule) {
            return FirewallOutcome::new(Backend::Ufw, FirewallAction::AlreadyOpen, "UFW rule already present.");
        }
        match self.mutate("ufw", &["allow", &rule]) {
            Ok(()) => FirewallOutcome::new(Backend::Ufw, FirewallAction::Opened, format!("UFW allow {rule} added.")),
            Err(e) => FirewallOutcome::failed(Backend::Ufw, e),
        }
    }

    // -----------------------------------------------------------------------
    // 2. firewalld
    // -----------------------------------------------------------------------

    fn ensure_firewalld(&self, port: u16) -> FirewallOutcome {
        let state = self.output_of("firewall-cmd", &["--state"]);
        if state.trim() != "running" {
            return FirewallOutcome::new(
                Backend::Firewalld,
                FirewallAction::Skipped,
                "firewalld detected but not running; skipped.",
            );
        }
        let listed = self.output_of("firewall-cmd", &["--list-ports"]);
        if listed_ports(&listed).any(|(p, proto)| p == port && proto == "udp") {
            return FirewallOutcome::new(Backend::Firewalld, FirewallAction::AlreadyOpen, "firewalld port already open.");
        }
        let rule = format!("{port}/udp");
        let result = self
            .mutate("firewall-cmd", &["--permanent", "--add-port", &rule])
            .and_then(|()| self.mutate("firewall-cmd", &["--reload"]));
        match result {
            Ok(()) => FirewallOutcome::new(Backend::Firewalld, FirewallAction::Opened, "firewalld rule added and reloaded."),
            Err(e) => FirewallOutcome::failed(Backend::Firewalld, e),
        }
    }

    // -----------------------------------------------------------------------
    // 3. iptables
    // -----------------------------------------------------------------------

    fn ensure_iptables(&self, port: u16) -> FirewallOutcome {
        let rules = self.output_of("iptables", &["-S", "INPUT"]);
        let needle = format!("-p udp -m udp --dport {port} -j ACCEPT");
        if rules.contains(&needle) {
            return FirewallOutcome::new(Backend::Iptables, FirewallAction::AlreadyOpen, "iptables rule already present.");
        }
        let port_arg = port.to_string();
        match self.mutate("iptables", &["-I", "INPUT", "-p", "udp", "--dport", &port_arg, "-j", "ACCEPT"]) {
            Ok(()) => FirewallOutcome::new(Backend::Iptables, FirewallAction::Opened, "iptables rule inserted.")
                .with_warning("iptables rule is not persisted across reboots; save it yourself (e.g. iptables-persistent)."),
            Err(e) => FirewallOutcome::failed(Backend::Iptables, e),
        }
    }
}

impl<R: CommandRunner> FirewallBackend for HostFirewall<R> {
    fn ensure_udp_port_open(&self, port: u16) -> FirewallOutcome {
        let backend = self.detect();
        let outcome = match backend {
            Backend::Ufw => self.ensure_ufw(port),
            Backend::Firewalld => self.ensure_firewalld(port),
            Backend::Iptables => self.ensure_iptables(port),
            Backend::None => FirewallOutcome::new(
                Backend::None,
                FirewallAction::Skipped,
                "No supported firewall backend detected; skipped local firewall rules.",
            ),
        };
        match &outcome.warning {
            Some(w) => warn!(%backend, port, warning = %w, "firewall"),
            None => info!(%backend, port, action = ?outcome.action, "firewall"),
        }
        outcome
    }
}

/// `rule` is the first column of a `ufw status` line (`443/udp` or
/// `443/udp (v6)`), never a suffix of a longer port.
fn ufw_has_rule(status: &str, rule: &str) -> bool {
    status
        .lines()
        .any(|line| line.split_whitespace().next() == Some(rule))
}

fn port_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)/(tcp|udp)\b").expect("valid port regex"))
}

/// `(port, proto)` pairs in `firewall-cmd --list-ports` output.
fn listed_ports(text: &str) -> impl Iterator<Item = (u16, &str)> + '_ {
    port_pattern().captures_iter(text).filter_map(|c| {
        let port = c.get(1)?.as_str().parse().ok()?;
        Some((port, c.get(2)?.as_str()))
    })
}

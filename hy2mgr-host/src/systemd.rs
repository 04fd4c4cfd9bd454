//! Service supervision through `systemctl` / `journalctl`.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use crate::error::HostError;
use crate::exec::CommandRunner;

/// The narrow service-control contract the reconciler depends on.
pub trait ServiceController {
    fn enable_now(&self, unit: &str) -> Result<(), HostError>;
    fn disable_now(&self, unit: &str) -> Result<(), HostError>;
    fn restart(&self, unit: &str) -> Result<(), HostError>;
    fn is_active(&self, unit: &str) -> bool;
    fn status(&self, unit: &str) -> Result<String, HostError>;
    fn journal_tail(&self, unit: &str, lines: usize) -> Result<String, HostError>;
    /// Installed unit file text (including drop-ins).
    fn cat(&self, unit: &str) -> Result<String, HostError>;
}

impl<T: ServiceController + ?Sized> ServiceController for &T {
    fn enable_now(&self, unit: &str) -> Result<(), HostError> {
        (**self).enable_now(unit)
    }
    fn disable_now(&self, unit: &str) -> Result<(), HostError> {
        (**self).disable_now(unit)
    }
    fn restart(&self, unit: &str) -> Result<(), HostError> {
        (**self).restart(unit)
    }
    fn is_active(&self, unit: &str) -> bool {
        (**self).is_active(unit)
    }
    fn status(&self, unit: &str) -> Result<String, HostError> {
        (**self).status(unit)
    }
    fn journal_tail(&self, unit: &str, lines: usize) -> Result<String, HostError> {
        (**self).journal_tail(unit, lines)
    }
    fn cat(&self, unit: &str) -> Result<String, HostError> {
        (**self).cat(unit)
    }
}

// ---------------------------------------------------------------------------
// systemctl
// ---------------------------------------------------------------------------

/// systemd via its command-line tools.
#[derive(Debug, Clone, Default)]
pub struct Systemctl<R> {
    runner: R,
}

impl<R: CommandRunner> Systemctl<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn systemctl(&self, args: &[&str]) -> Result<String, HostError> {
        let out = self.runner.run("systemctl", args)?.check("systemctl", args)?;
        Ok(out.combined())
    }
}

impl<R: CommandRunner> ServiceController for Systemctl<R> {
    fn enable_now(&self, unit: &str) -> Result<(), HostError> {
        self.systemctl(&["enable", "--now", unit]).map(drop)
    }

    fn disable_now(&self, unit: &str) -> Result<(), HostError> {
        self.systemctl(&["disable", "--now", unit]).map(drop)
    }

    fn restart(&self, unit: &str) -> Result<(), HostError> {
        self.systemctl(&["restart", unit]).map(drop)
    }

    fn is_active(&self, unit: &str) -> bool {
        // `is-active` exits non-zero for anything but "active"; read stdout regardless.
        self.runner
            .run("systemctl", &["is-active", unit])
            .map(|out| out.stdout.trim() == "active")
            .unwrap_or(false)
    }

    fn status(&self, unit: &str) -> Result<String, HostError> {
        // `status` exits 3 for a stopped unit; the text is still what we want.
        let out = self.runner.run("systemctl", &["status", "--no-pager", unit])?;
        Ok(out.combined())
    }

    fn journal_tail(&self, unit: &str, lines: usize) -> Result<String, HostError> {
        let n = lines.to_string();
        let args = ["--no-pager", "-n", n.as_str(), "-u", unit];
        let out = self.runner.run("journalctl", &args)?.check("journalctl", &args)?;
        Ok(out.combined())
    }

    fn cat(&self, unit: &str) -> Result<String, HostError> {
        self.systemctl(&["cat", unit])
    }
}

// ---------------------------------------------------------------------------
// In-memory controller
// ---------------------------------------------------------------------------

/// Fake supervisor that records requests and keeps per-unit active flags.
#[derive(Debug, Default)]
pub struct MemoryServiceController {
    active: RefCell<BTreeSet<String>>,
    unit_files: HashMap<String, String>,
    failing: BTreeSet<String>,
    calls: RefCell<Vec<String>>,
}

impl MemoryServiceController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit_file(mut self, unit: &str, text: &str) -> Self {
        self.unit_files.insert(unit.to_string(), text.to_string());
        self
    }

    pub fn with_active(self, unit: &str) -> Self {
        self.active.borrow_mut().insert(unit.to_string());
        self
    }

    /// Make every mutating request for `unit` fail.
    pub fn failing(mut self, unit: &str) -> Self {
        self.failing.insert(unit.to_string());
        self
    }

    /// Requests in order, e.g. `"restart hysteria-server.service"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, verb: &str, unit: &str) -> Result<(), HostError> {
        self.calls.borrow_mut().push(format!("{verb} {unit}"));
        if self.failing.contains(unit) {
            return Err(HostError::CommandFailed {
                command: format!("systemctl {verb} {unit}"),
                status: "exit status 1".to_string(),
                output: format!("Failed to {verb} {unit}"),
            });
        }
        Ok(())
    }
}

impl ServiceController for MemoryServiceController {
    fn enable_now(&self, unit: &str) -> Result<(), HostError> {
        self.record("enable-now", unit)?;
        self.active.borrow_mut().insert(unit.to_string());
        Ok(())
    }

    fn disable_now(&self, unit: &str) -> Result<(), HostError> {
        self.record("disable-now", unit)?;
        self.active.borrow_mut().remove(unit);
        Ok(())
    }

    fn restart(&self, unit: &str) -> Result<(), HostError> {
        self.record("restart", unit)?;
        self.active.borrow_mut().insert(unit.to_string());
        Ok(())
    }

    fn is_active(&self, unit: &str) -> bool {
        self.active.borrow().contains(unit)
    }

    fn status(&self, unit: &str) -> Result<String, HostError> {
        let state = if self.is_active(unit) { "active (running)" } else { "inactive (dead)" };
        Ok(format!("● {unit}\n     Active: {state}\n"))
    }

    fn journal_tail(&self, unit: &str, lines: usize) -> Result<String, HostError> {
        Ok(format!("-- last {lines} lines of {unit} --\n"))
    }

    fn cat(&self, unit: &str) -> Result<String, HostError> {
        self.unit_files
            .get(unit)
            .cloned()
            .ok_or_else(|| HostError::CommandFailed {
                command: format!("systemctl cat {unit}"),
                status: "exit status 1".to_string(),
                output: format!("No files found for {unit}."),
            })
    }
}

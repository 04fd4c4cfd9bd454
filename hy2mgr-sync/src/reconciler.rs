//! The reconcile pass: drive cert, config, permissions, firewall and service
//! towards the desired state.
//!
//! ## Sequence
//!
//! 1. No cert + key pair on disk → generate one and write it.
//! 2. No nodes → add a default node.
//! 3. Pick the listen port (kept when the running daemon already holds it).
//! 4. Render + validate.
//! 5. Write the config if it changed (dry-run stops after this step).
//! 6. Permission self-heal.
//! 7. Open the UDP port in the host firewall.
//! 8. `enable --now` + `restart` the daemon unit.
//!
//! Steps 1–5 abort on failure. Steps 6–8 only add [`Warning`]s to the report.
//! Nothing is rolled back; running `apply` again is the recovery path.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use tracing::{info, warn};

use hy2mgr_core::{DesiredState, Layout, Node, NodeId, DAEMON_UNIT};
use hy2mgr_detector::{choose_port_with, PortProbe, PublicAddress, SystemAddress, UdpProbe, PREFERRED_PORTS};
use hy2mgr_host::{FirewallBackend, FirewallOutcome, PermissionHealer, ServiceController};
use hy2mgr_render::{listen_port, validate, ConfigContext, ConfigRenderer};

use crate::cert::{generate_self_signed, write_cert_files, GeneratedCert, DEFAULT_VALID_DAYS};
use crate::error::ReconcileError;
use crate::writer::{read_existing, write_config, WriteResult};

/// Name of the node synthesized when the collection is empty.
pub const DEFAULT_NODE_NAME: &str = "default";

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Best-effort stage that produced a [`Warning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Users,
    Permissions,
    Firewall,
    Service,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Users => "users",
            Step::Permissions => "permissions",
            Step::Firewall => "firewall",
            Step::Service => "service",
        })
    }
}

/// A swallowed failure, surfaced to the caller instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub step: Step,
    pub message: String,
}

impl Warning {
    fn new(step: Step, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertStep {
    /// A certificate was already on disk.
    Present,
    Generated { pin: String },
    /// Dry-run: a certificate would have been generated.
    WouldGenerate { pin: String },
}

/// Everything one `apply` did (or, in dry-run, would do).
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub cert: CertStep,
    /// Id of the node added because none existed.
    pub default_node: Option<NodeId>,
    pub previous_port: u16,
    pub port: u16,
    pub config: WriteResult,
    /// Masked rendering of the config (dry-run only).
    pub preview: Option<String>,
    pub firewall: Option<FirewallOutcome>,
    pub warnings: Vec<Warning>,
}

impl ApplyReport {
    pub fn port_changed(&self) -> bool {
        self.previous_port != self.port
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Owns the collaborators of a reconcile pass. Build once per process.
pub struct Reconciler<'a> {
    layout: Layout,
    services: Box<dyn ServiceController + 'a>,
    firewall: Box<dyn FirewallBackend + 'a>,
    ports: Box<dyn PortProbe + 'a>,
    address: Box<dyn PublicAddress + 'a>,
    renderer: ConfigRenderer,
}

impl<'a> Reconciler<'a> {
    /// Reconciler with the real UDP probe and public-address detection.
    pub fn new(
        layout: Layout,
        services: impl ServiceController + 'a,
        firewall: impl FirewallBackend + 'a,
    ) -> Result<Self, ReconcileError> {
        Ok(Self {
            layout,
            services: Box::new(services),
            firewall: Box::new(firewall),
            ports: Box::new(UdpProbe),
            address: Box::new(SystemAddress::new()),
            renderer: ConfigRenderer::new()?,
        })
    }

    pub fn with_port_probe(mut self, probe: impl PortProbe + 'a) -> Self {
        self.ports = Box::new(probe);
        self
    }

    pub fn with_public_address(mut self, address: impl PublicAddress + 'a) -> Self {
        self.address = Box::new(address);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn services(&self) -> &dyn ServiceController {
        &*self.services
    }

    /// Host for client URIs: the configured one, else the detected public
    /// address, else a placeholder.
    pub fn public_host(&self, state: &DesiredState) -> String {
        let configured = state.settings.listen_host.trim();
        if configured.is_empty() {
            self.address.host_or_placeholder()
        } else {
            configured.to_string()
        }
    }

    /// SAN for a new certificate: configured host if it is an IP, else the
    /// detected public address, else loopback.
    pub fn cert_ips(&self, state: &DesiredState) -> Vec<IpAddr> {
        let ip = state
            .settings
            .listen_host
            .trim()
            .parse::<IpAddr>()
            .ok()
            .or_else(|| self.address.detect())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        vec![ip]
    }

    /// Generate a fresh certificate; written unless `dry_run`.
    pub fn rotate_cert(&self, state: &DesiredState, dry_run: bool) -> Result<GeneratedCert, ReconcileError> {
        let generated = generate_self_signed(&self.cert_ips(state), DEFAULT_VALID_DAYS)?;
        if !dry_run {
            write_cert_files(&self.layout, &generated)?;
        }
        Ok(generated)
    }

    pub fn config_context(&self, state: &DesiredState) -> ConfigContext {
        ConfigContext::from_state(state, &self.layout)
    }

    /// Rendered and validated config for `state` as it stands.
    pub fn render(&self, state: &DesiredState) -> Result<String, ReconcileError> {
        let doc = self.renderer.render(&self.config_context(state))?;
        validate(&doc)?;
        Ok(doc)
    }

    /// Config for `state` with passwords masked; not validated.
    pub fn render_masked(&self, state: &DesiredState) -> Result<String, ReconcileError> {
        Ok(self.renderer.render_masked(&self.config_context(state))?)
    }

    // -----------------------------------------------------------------------
    // apply
    // -----------------------------------------------------------------------

    /// Run the reconcile sequence. May change `state.settings.listen_port`
    /// and `state.nodes`; the caller persists `state` afterwards.
    pub fn apply(&self, state: &mut DesiredState, dry_run: bool) -> Result<ApplyReport, ReconcileError> {
        let mut warnings = Vec::new();

        // 1. certificate (a cert without its key counts as missing)
        let cert = if self.layout.cert_path().exists() && self.layout.key_path().exists() {
            CertStep::Present
        } else {
            let generated = self.rotate_cert(state, dry_run)?;
            if dry_run {
                CertStep::WouldGenerate { pin: generated.pin }
            } else {
                CertStep::Generated { pin: generated.pin }
            }
        };

        // 2. at least one credential
        let default_node = if state.nodes.is_empty() {
            let node = Node::new(DEFAULT_NODE_NAME, None, None);
            let id = node.id.clone();
            info!(id = %id, "no nodes, added default node");
            state.nodes.push(node);
            Some(id)
        } else {
            None
        };
        for user in state.duplicate_enabled_usernames() {
            warnings.push(Warning::new(
                Step::Users,
                format!("username {user:?} is shared by several enabled nodes; only one can authenticate"),
            ));
        }

        // 3. port
        let previous_port = state.settings.listen_port;
        state.settings.listen_port = self.select_port(previous_port);

        // 4. render + validate
        let doc = self.render(state)?;

        // 5. config file
        let config = write_config(&self.layout.config_path(), &doc, dry_run)?;
        if dry_run {
            return Ok(ApplyReport {
                dry_run,
                cert,
                default_node,
                previous_port,
                port: state.settings.listen_port,
                config,
                preview: Some(self.render_masked(state)?),
                firewall: None,
                warnings,
            });
        }

        // 6. permissions
        let healer = PermissionHealer::new(self.layout.clone(), DAEMON_UNIT);
        warnings.extend(
            healer
                .fix_key_permission(&*self.services)
                .into_iter()
                .map(|m| Warning::new(Step::Permissions, m)),
        );

        // 7. firewall
        let firewall = self.firewall.ensure_udp_port_open(state.settings.listen_port);
        if let Some(w) = &firewall.warning {
            warnings.push(Warning::new(Step::Firewall, w.clone()));
        }

        // 8. service
        if let Err(e) = self.services.enable_now(DAEMON_UNIT) {
            warnings.push(Warning::new(Step::Service, e.to_string()));
        }
        if let Err(e) = self.services.restart(DAEMON_UNIT) {
            warnings.push(Warning::new(Step::Service, e.to_string()));
        }

        for w in &warnings {
            warn!(step = %w.step, "{}", w.message);
        }
        info!(port = state.settings.listen_port, warnings = warnings.len(), "apply finished");
        Ok(ApplyReport {
            dry_run,
            cert,
            default_node,
            previous_port,
            port: state.settings.listen_port,
            config,
            preview: None,
            firewall: Some(firewall),
            warnings,
        })
    }

    /// Keep `current` when the running daemon was started with it; otherwise
    /// probe from `current` through the well-known ports.
    fn select_port(&self, current: u16) -> u16 {
        let on_disk = read_existing(&self.layout.config_path())
            .ok()
            .flatten()
            .and_then(|doc| listen_port(&doc));
        if on_disk == Some(current) && self.services.is_active(DAEMON_UNIT) {
            return current;
        }
        choose_port_with(&*self.ports, current, &PREFERRED_PORTS)
    }
}

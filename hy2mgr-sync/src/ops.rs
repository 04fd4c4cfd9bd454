//! Node, certificate and subscription operations.
//!
//! Mutating node/cert operations follow one pattern: change the record,
//! [`Reconciler::apply`], then persist. A failed apply leaves the store
//! untouched. Subscription changes never feed the daemon config, so they
//! persist without applying.

use std::path::PathBuf;

use chrono::Utc;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use hy2mgr_core::token::random_hex;
use hy2mgr_core::{DesiredState, Node, NodeId, StateStore, DAEMON_UNIT};
use hy2mgr_render::{client_uri, UriParams};

use crate::cert::{parse_pin, GeneratedCert};
use crate::error::ReconcileError;
use crate::reconciler::{ApplyReport, Reconciler};
use crate::writer::restore_config;

/// Raw subscription token length before hex encoding.
const TOKEN_BYTES: usize = 18;

/// A freshly issued subscription token. Shown once; only its hash is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Export path relative to the management listener.
    pub path: String,
}

/// Result of [`Manager::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub backup: PathBuf,
    /// Restart failure, if any. The restored file stays in place.
    pub restart_warning: Option<String>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Couples the store with a reconciler for apply-then-persist operations.
pub struct Manager<'s, 'a> {
    store: &'s StateStore,
    reconciler: &'s Reconciler<'a>,
}

impl<'s, 'a> Manager<'s, 'a> {
    pub fn new(store: &'s StateStore, reconciler: &'s Reconciler<'a>) -> Self {
        Self { store, reconciler }
    }

    pub fn store(&self) -> &StateStore {
        self.store
    }

    pub fn reconciler(&self) -> &Reconciler<'a> {
        self.reconciler
    }

    /// Apply and, outside dry-run, persist the (possibly adjusted) record.
    pub fn apply(&self, state: &mut DesiredState, dry_run: bool) -> Result<ApplyReport, ReconcileError> {
        let report = self.reconciler.apply(state, dry_run)?;
        if !dry_run {
            self.store.save_atomic(state)?;
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // 1. Nodes
    // -----------------------------------------------------------------------

    pub fn node_add(
        &self,
        state: &mut DesiredState,
        name: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<(Node, ApplyReport), ReconcileError> {
        let node = Node::new(name, username, password);
        info!(id = %node.id, name, "adding node");
        state.nodes.push(node.clone());
        let report = self.apply(state, false)?;
        Ok((node, report))
    }

    pub fn node_delete(&self, state: &mut DesiredState, id: &NodeId) -> Result<ApplyReport, ReconcileError> {
        let before = state.nodes.len();
        state.nodes.retain(|n| &n.id != id);
        if state.nodes.len() == before {
            return Err(ReconcileError::NodeNotFound(id.clone()));
        }
        info!(id = %id, "node deleted");
        self.apply(state, false)
    }

    pub fn node_set_enabled(
        &self,
        state: &mut DesiredState,
        id: &NodeId,
        enabled: bool,
    ) -> Result<ApplyReport, ReconcileError> {
        let node = state
            .node_mut(id)
            .ok_or_else(|| ReconcileError::NodeNotFound(id.clone()))?;
        node.enabled = enabled;
        node.touch();
        info!(id = %id, enabled, "node toggled");
        self.apply(state, false)
    }

    /// Give the node a new random password. Returns it with the report.
    pub fn node_reset_password(
        &self,
        state: &mut DesiredState,
        id: &NodeId,
    ) -> Result<(String, ApplyReport), ReconcileError> {
        let node = state
            .node_mut(id)
            .ok_or_else(|| ReconcileError::NodeNotFound(id.clone()))?;
        let password = random_hex(16);
        node.password = password.clone();
        node.touch();
        info!(id = %id, "node password reset");
        let report = self.apply(state, false)?;
        Ok((password, report))
    }

    /// Client URI for one node (enabled or not).
    pub fn node_uri(&self, state: &DesiredState, id: &NodeId) -> Result<String, ReconcileError> {
        let node = state
            .node(id)
            .ok_or_else(|| ReconcileError::NodeNotFound(id.clone()))?;
        let host = self.reconciler.public_host(state);
        let pin = self.current_pin();
        Ok(uri_for(state, node, &host, pin.as_deref()))
    }

    // -----------------------------------------------------------------------
    // 2. Certificate
    // -----------------------------------------------------------------------

    /// Replace the certificate, then apply so the daemon picks it up.
    pub fn rotate_cert(
        &self,
        state: &mut DesiredState,
        dry_run: bool,
    ) -> Result<(GeneratedCert, ApplyReport), ReconcileError> {
        let generated = self.reconciler.rotate_cert(state, dry_run)?;
        info!(pin = %generated.pin, dry_run, "certificate rotated");
        let report = self.apply(state, dry_run)?;
        Ok((generated, report))
    }

    /// Pin of the certificate on disk, if one is readable.
    pub fn current_pin(&self) -> Option<String> {
        parse_pin(&self.reconciler.layout().cert_path()).ok()
    }

    // -----------------------------------------------------------------------
    // 3. Subscription
    // -----------------------------------------------------------------------

    /// Issue a new token. Every earlier token stops verifying.
    pub fn subscription_rotate(&self, state: &mut DesiredState) -> Result<IssuedToken, ReconcileError> {
        let token = random_hex(TOKEN_BYTES);
        state.subscription.token_hashed = hash_token(&token);
        state.subscription.created_at = Some(Utc::now());
        state.subscription.revoked_at = None;
        self.store.save_atomic(state)?;
        info!("subscription token rotated");
        Ok(IssuedToken {
            path: format!("/sub/{token}"),
            token,
        })
    }

    pub fn subscription_revoke(&self, state: &mut DesiredState) -> Result<(), ReconcileError> {
        state.subscription.revoked_at = Some(Utc::now());
        self.store.save_atomic(state)?;
        info!("subscription revoked");
        Ok(())
    }

    /// URIs of enabled nodes in creation order, one per line, when `token`
    /// verifies.
    pub fn subscription_export(&self, state: &DesiredState, token: &str) -> Option<String> {
        if !subscription_verify(state, token) {
            return None;
        }
        let host = self.reconciler.public_host(state);
        let pin = self.current_pin();
        let lines: Vec<String> = state
            .nodes_sorted()
            .into_iter()
            .filter(|n| n.enabled)
            .map(|n| uri_for(state, n, &host, pin.as_deref()))
            .collect();
        Some(lines.join("\n") + "\n")
    }

    // -----------------------------------------------------------------------
    // 4. Restore
    // -----------------------------------------------------------------------

    /// Put a config backup back in place and restart the daemon.
    pub fn restore(&self, backup: Option<&str>) -> Result<RestoreReport, ReconcileError> {
        let layout = self.reconciler.layout();
        let used = restore_config(&layout.config_path(), backup)?;
        let restart_warning = match self.reconciler.services().restart(DAEMON_UNIT) {
            Ok(()) => None,
            Err(e) => {
                warn!("restart after restore failed: {e}");
                Some(e.to_string())
            }
        };
        Ok(RestoreReport {
            backup: used,
            restart_warning,
        })
    }
}

// ---------------------------------------------------------------------------
// Token verification
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of a raw token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// `true` when `token` matches the stored hash and the subscription is live.
pub fn subscription_verify(state: &DesiredState, token: &str) -> bool {
    let sub = &state.subscription;
    if !sub.is_active() {
        return false;
    }
    bool::from(hash_token(token).as_bytes().ct_eq(sub.token_hashed.as_bytes()))
}

fn uri_for(state: &DesiredState, node: &Node, host: &str, pin: Option<&str>) -> String {
    client_uri(&UriParams {
        username: &node.username,
        password: &node.password,
        host,
        port: state.settings.listen_port,
        sni: &state.settings.sni,
        pin,
    })
}

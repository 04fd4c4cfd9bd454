//! # hy2mgr-sync
//!
//! Reconciliation of the Hysteria2 host against the desired state.
//!
//! [`Reconciler::apply`] renders the daemon config and drives certificate,
//! permissions, firewall and service towards it. [`Manager`] wraps the
//! apply-then-persist node, certificate and subscription operations.

pub mod cert;
pub mod diff;
pub mod error;
pub mod ops;
pub mod reconciler;
pub mod writer;

pub use cert::{format_pin, generate_self_signed, parse_pin, write_cert_files, GeneratedCert};
pub use diff::{diff_config, ConfigDiff};
pub use error::{CertError, ReconcileError};
pub use ops::{hash_token, subscription_verify, IssuedToken, Manager, RestoreReport};
pub use reconciler::{ApplyReport, CertStep, Reconciler, Step, Warning, DEFAULT_NODE_NAME};
pub use writer::{config_backups, latest_backup, restore_config, write_config, WriteResult};

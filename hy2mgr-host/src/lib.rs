//! Host integration for `hy2mgr`: subprocesses, systemd, the firewall and
//! file ownership.
//!
//! Each OS-facing concern is a trait with a real implementation and an
//! in-memory one:
//!
//! | Trait                 | Real                 | Fake                        |
//! |-----------------------|----------------------|-----------------------------|
//! | [`CommandRunner`]     | [`SystemRunner`]     | [`ScriptedRunner`]          |
//! | [`ServiceController`] | [`Systemctl`]        | [`MemoryServiceController`] |
//! | [`FirewallBackend`]   | [`HostFirewall`]     | `HostFirewall<ScriptedRunner>` |

mod error;
pub mod exec;
pub mod firewall;
pub mod perms;
pub mod systemd;

pub use error::HostError;
pub use exec::{CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
pub use firewall::{Backend, FirewallAction, FirewallBackend, FirewallOutcome, HostFirewall};
pub use perms::{desired_permissions, service_user, PermissionHealer, PermissionSpec, DEFAULT_SERVICE_USER};
pub use systemd::{MemoryServiceController, ServiceController, Systemctl};

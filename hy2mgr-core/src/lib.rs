//! hy2mgr core library: desired-state types, persistence, filesystem layout.
//!
//! - [`types`]: the [`DesiredState`] record and its parts
//! - [`store`]: [`StateStore`], load-or-init and crash-safe save with backups
//! - [`layout`]: well-known paths, re-rootable through `HY2MGR_ROOT`
//! - [`fsio`]: atomic write / copy helpers shared by every writer
//! - [`token`]: random hex identifiers and secrets
//! - [`error`]: [`StateError`]

pub mod error;
pub mod fsio;
pub mod layout;
pub mod store;
pub mod token;
pub mod types;

pub use error::StateError;
pub use layout::{Layout, DAEMON_UNIT, MANAGER_UNIT, ROOT_ENV};
pub use store::StateStore;
pub use types::{Admin, DesiredState, Node, NodeId, Settings, Subscription};

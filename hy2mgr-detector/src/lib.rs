//! Host probing for `hy2mgr`.
//!
//! - [`port`]: pick a bindable UDP port from a preference list
//! - [`address`]: best-effort public address of this host
//!
//! Both probes sit behind small traits ([`PortProbe`], [`PublicAddress`]) so
//! callers and tests can substitute fixed answers.

pub mod address;
pub mod port;

pub use address::{is_public_ip, FixedAddress, PublicAddress, SystemAddress, PLACEHOLDER_HOST};
pub use port::{choose_port, choose_port_with, PortProbe, UdpProbe, PREFERRED_PORTS, SCAN_RANGE};

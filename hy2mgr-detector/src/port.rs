//! UDP port selection.
//!
//! Order: preferred (if > 0 and bindable) → candidates in order → first
//! bindable port in [`SCAN_RANGE`] → `preferred` unchanged. A probe is a
//! liveness check, not a reservation: another process may take the port
//! between the probe and the daemon's own bind.

use std::net::UdpSocket;
use std::ops::RangeInclusive;

use tracing::{debug, warn};

/// Well-known ports tried after the preferred one.
pub const PREFERRED_PORTS: [u16; 7] = [443, 8443, 2053, 2083, 2087, 2096, 10443];

/// Last-resort linear scan.
pub const SCAN_RANGE: RangeInclusive<u16> = 20000..=65000;

/// Answers "could a UDP socket bind this port right now?".
pub trait PortProbe {
    fn is_bindable(&self, port: u16) -> bool;
}

impl<F> PortProbe for F
where
    F: Fn(u16) -> bool,
{
    fn is_bindable(&self, port: u16) -> bool {
        self(port)
    }
}

/// Real probe: bind `0.0.0.0:p`, then `[::]:p`, and release immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpProbe;

impl PortProbe for UdpProbe {
    fn is_bindable(&self, port: u16) -> bool {
        try_bind(("0.0.0.0", port)) || try_bind(("::", port))
    }
}

/// The bind itself is the check; the socket is dropped on return.
fn try_bind(addr: (&str, u16)) -> bool {
    UdpSocket::bind(addr).is_ok()
}

/// [`choose_port_with`] using the real [`UdpProbe`].
pub fn choose_port(preferred: u16, candidates: &[u16]) -> u16 {
    choose_port_with(&UdpProbe, preferred, candidates)
}

pub fn choose_port_with<P: PortProbe + ?Sized>(probe: &P, preferred: u16, candidates: &[u16]) -> u16 {
    if preferred > 0 && probe.is_bindable(preferred) {
        return preferred;
    }
    if let Some(&port) = candidates.iter().find(|&&p| p > 0 && probe.is_bindable(p)) {
        debug!(preferred, port, "preferred port busy, using candidate");
        return port;
    }
    if let Some(port) = SCAN_RANGE.into_iter().find(|&p| probe.is_bindable(p)) {
        debug!(preferred, port, "all candidates busy, using scanned port");
        return port;
    }
    warn!(preferred, "no bindable UDP port found, keeping preferred");
    preferred
}

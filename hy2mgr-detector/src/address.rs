//! Best-effort public address detection.
//!
//! First a public IPv4 on an up, non-loopback interface (IPv6 as fallback),
//! then an HTTP lookup against `api.ipify.org` with a short timeout.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tracing::debug;

/// Shown to the operator when no address could be found.
pub const PLACEHOLDER_HOST: &str = "YOUR_VPS_IP";

const LOOKUP_URL: &str = "https://api.ipify.org";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const LOOKUP_MAX_BYTES: u64 = 64;

/// Source of this host's public address.
pub trait PublicAddress {
    fn detect(&self) -> Option<IpAddr>;

    /// [`detect`](Self::detect) as text, or [`PLACEHOLDER_HOST`].
    fn host_or_placeholder(&self) -> String {
        self.detect()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| PLACEHOLDER_HOST.to_string())
    }
}

/// Interfaces first, then the HTTP lookup.
#[derive(Debug, Clone)]
pub struct SystemAddress {
    lookup_url: String,
}

impl Default for SystemAddress {
    fn default() -> Self {
        Self {
            lookup_url: LOOKUP_URL.to_string(),
        }
    }
}

impl SystemAddress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interface scan only; never touches the network.
    pub fn scan_interfaces(&self) -> Option<IpAddr> {
        let addrs = match getifaddrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(error = %e, "getifaddrs failed");
                return None;
            }
        };
        let mut v6 = None;
        for ifa in addrs {
            if !ifa.flags.contains(InterfaceFlags::IFF_UP)
                || ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK)
            {
                continue;
            }
            let Some(addr) = ifa.address else { continue };
            if let Some(sin) = addr.as_sockaddr_in() {
                let ip = IpAddr::V4(*SocketAddrV4::from(*sin).ip());
                if is_public_ip(&ip) {
                    return Some(ip);
                }
            } else if let Some(sin6) = addr.as_sockaddr_in6() {
                let ip = IpAddr::V6(*SocketAddrV6::from(*sin6).ip());
                if v6.is_none() && is_public_ip(&ip) {
                    v6 = Some(ip);
                }
            }
        }
        v6
    }

    /// HTTP lookup; any failure yields `None`.
    pub fn lookup(&self) -> Option<IpAddr> {
        let agent = ureq::AgentBuilder::new().timeout(LOOKUP_TIMEOUT).build();
        let response = match agent.get(&self.lookup_url).call() {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %self.lookup_url, error = %e, "public address lookup failed");
                return None;
            }
        };
        let mut body = String::new();
        response
            .into_reader()
            .take(LOOKUP_MAX_BYTES)
            .read_to_string(&mut body)
            .ok()?;
        body.trim().parse().ok()
    }
}

impl PublicAddress for SystemAddress {
    fn detect(&self) -> Option<IpAddr> {
        self.scan_interfaces().or_else(|| self.lookup())
    }
}

/// Fixed answer, for tests and for hosts with a configured address.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAddress(pub Option<IpAddr>);

impl PublicAddress for FixedAddress {
    fn detect(&self) -> Option<IpAddr> {
        self.0
    }
}

/// Globally routable unicast: not loopback, private, link-local, multicast,
/// unspecified or broadcast.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast())
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(&v4);
    }
    !(ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() || unique_local || link_local)
}

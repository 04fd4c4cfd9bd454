//! Client-facing `hysteria2://` URIs.

use std::net::Ipv6Addr;

use url::form_urlencoded;

pub const SCHEME: &str = "hysteria2";

/// Inputs of a single client URI.
#[derive(Debug, Clone, Copy)]
pub struct UriParams<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub sni: &'a str,
    /// Colon-hex certificate pin; omitted from the query when `None` or empty.
    pub pin: Option<&'a str>,
}

/// `hysteria2://<user:pass>@<host>:<port>/?insecure=1&sni=..&pinSHA256=..`
///
/// The credential pair and query values are form-encoded and IPv6 hosts are
/// bracketed. Identical inputs always give byte-identical output.
pub fn client_uri(p: &UriParams<'_>) -> String {
    let auth: String =
        form_urlencoded::byte_serialize(format!("{}:{}", p.username, p.password).as_bytes())
            .collect();

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("insecure", "1");
    query.append_pair("sni", p.sni);
    if let Some(pin) = p.pin.filter(|pin| !pin.is_empty()) {
        query.append_pair("pinSHA256", pin);
    }

    format!(
        "{SCHEME}://{auth}@{host}:{port}/?{query}",
        host = bracket_host(p.host),
        port = p.port,
        query = query.finish(),
    )
}

fn bracket_host(host: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

//! Structural sanity gate for a rendered (or on-disk) daemon config.
//!
//! Not a schema check: only the fields the daemon cannot start without.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::RenderError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: Option<String>,
    pub tls: TlsConfig,
    pub auth: AuthConfig,
    pub masquerade: Option<Masquerade>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub password: Option<String>,
    pub userpass: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Masquerade {
    #[serde(rename = "type")]
    pub kind: String,
    pub proxy: Option<MasqueradeProxy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MasqueradeProxy {
    pub url: String,
    pub rewrite_host: bool,
}

impl ServerConfig {
    /// Port part of `listen` (`":443"`, `"0.0.0.0:443"`, `"[::]:443"`).
    pub fn listen_port(&self) -> Option<u16> {
        let listen = self.listen.as_deref()?;
        listen.rsplit_once(':')?.1.parse().ok()
    }
}

/// Parse `document` and reject it when the TLS paths are empty, the auth type
/// is empty, or userpass mode has no users.
pub fn validate(document: &str) -> Result<ServerConfig, RenderError> {
    let cfg: ServerConfig = serde_yaml::from_str(document)?;
    if cfg.tls.cert.is_empty() || cfg.tls.key.is_empty() {
        return Err(RenderError::Invalid("tls.cert/tls.key required"));
    }
    if cfg.auth.kind.is_empty() {
        return Err(RenderError::Invalid("auth.type required"));
    }
    let no_users = cfg.auth.userpass.as_ref().map_or(true, BTreeMap::is_empty);
    if cfg.auth.kind == "userpass" && no_users {
        return Err(RenderError::Invalid("auth.userpass required for userpass mode"));
    }
    Ok(cfg)
}

/// Listen port of a config document, if it parses and names one.
pub fn listen_port(document: &str) -> Option<u16> {
    serde_yaml::from_str::<ServerConfig>(document)
        .ok()?
        .listen_port()
}

/// Replace the values of the `auth.userpass` block with `***`, leaving every
/// other line as written.
pub fn mask_userpass(document: &str) -> String {
    let mut out = String::with_capacity(document.len());
    let mut block_indent: Option<usize> = None;
    for line in document.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = line.trim();
        if let Some(base) = block_indent {
            if body.is_empty() || indent > base {
                out.push_str(&mask_value(line));
                continue;
            }
            block_indent = None;
        }
        if body == "userpass:" {
            block_indent = Some(indent);
        }
        out.push_str(line);
    }
    out
}

fn mask_value(line: &str) -> String {
    let newline = if line.ends_with('\n') { "\n" } else { "" };
    let content = line.trim_end_matches(['\r', '\n']);
    match find_key_separator(content) {
        Some(idx) => format!("{}: \"***\"{newline}", &content[..idx]),
        None => line.to_string(),
    }
}

/// Byte offset of the `:` that ends a (possibly double-quoted) mapping key.
fn find_key_separator(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let offset = line.len() - trimmed.len();
    if let Some(rest) = trimmed.strip_prefix('"') {
        let mut escaped = false;
        for (i, c) in rest.char_indices() {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let close = offset + 1 + i + 1;
                    return line[close..].find(':').map(|j| close + j);
                }
                _ => escaped = false,
            }
        }
        None
    } else {
        trimmed.find(": ").or_else(|| trimmed.strip_suffix(':').map(|s| s.len())).map(|i| offset + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const GOOD: &str = "\
listen: \":8443\"
tls:
  cert: /c
  key: /k
auth:
  type: userpass
  userpass:
    u1: p1
";

    #[test]
    fn good_document_validates() {
        let cfg = validate(GOOD).unwrap();
        assert_eq!(cfg.listen_port(), Some(8443));
        assert_eq!(cfg.auth.userpass.unwrap()["u1"], "p1");
    }

    #[rstest]
    #[case::empty_cert("tls: {cert: '', key: /k}\nauth: {type: userpass, userpass: {u: p}}\n")]
    #[case::missing_tls("auth: {type: userpass, userpass: {u: p}}\n")]
    #[case::empty_auth_type("tls: {cert: /c, key: /k}\nauth: {type: ''}\n")]
    #[case::empty_userpass("tls: {cert: /c, key: /k}\nauth: {type: userpass, userpass: {}}\n")]
    #[case::null_userpass("tls: {cert: /c, key: /k}\nauth:\n  type: userpass\n  userpass:\n")]
    fn incomplete_documents_are_rejected(#[case] doc: &str) {
        let err = validate(doc).unwrap_err();
        assert!(matches!(err, RenderError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn unparseable_document_is_a_parse_error() {
        let err = validate("tls: [unclosed").unwrap_err();
        assert!(matches!(err, RenderError::Parse(_)), "got: {err}");
    }

    #[test]
    fn password_mode_needs_no_userpass() {
        validate("tls: {cert: /c, key: /k}\nauth: {type: password, password: x}\n").unwrap();
    }

    #[rstest]
    #[case(":443", Some(443))]
    #[case("0.0.0.0:2053", Some(2053))]
    #[case("[::]:10443", Some(10443))]
    #[case("nonsense", None)]
    fn listen_port_forms(#[case] listen: &str, #[case] expected: Option<u16>) {
        let doc = format!("listen: \"{listen}\"\n");
        assert_eq!(listen_port(&doc), expected);
    }

    #[test]
    fn mask_userpass_only_touches_credentials() {
        let doc = "\
auth:
  type: userpass
  userpass:
    \"u1\": \"p1\"
    plain: secret
    \"we\\\"ird:\": \"x\"
masquerade:
  type: proxy
";
        let masked = mask_userpass(doc);
        assert!(!masked.contains("p1"));
        assert!(!masked.contains("secret"));
        assert!(masked.contains("\"u1\": \"***\""));
        assert!(masked.contains("plain: \"***\""));
        assert!(masked.contains("\"we\\\"ird:\": \"***\""));
        assert!(masked.contains("masquerade:\n  type: proxy\n"));
        assert!(masked.contains("  type: userpass\n"));
    }
}

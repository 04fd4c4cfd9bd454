//! Domain types for the hy2mgr desired-state record.
//!
//! The record is persisted as camelCase JSON (`state.json`). Older files used
//! `passwordBcrypt` / `tokenSha256` and wrote empty strings for unset
//! timestamps; both shapes still decode.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::token::random_hex;

/// Current schema version of the persisted record.
pub const STATE_VERSION: u32 = 1;

pub const DEFAULT_LISTEN_PORT: u16 = 443;
pub const DEFAULT_SNI: &str = "www.bing.com";
pub const DEFAULT_MASQUERADE_URL: &str = "https://www.bing.com";
pub const DEFAULT_MANAGE_LISTEN: &str = "0.0.0.0:3333";
pub const DEFAULT_ADMIN: &str = "admin";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque, unique identifier of a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// 8 random bytes, hex encoded.
    pub fn random() -> Self {
        Self(random_hex(8))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Daemon-facing and management settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Public host/IP used in client URIs. Empty means auto-detect.
    pub listen_host: String,
    /// UDP port the daemon listens on.
    pub listen_port: u16,
    pub sni: String,
    /// Reverse-proxy target served to non-proxy clients.
    pub masquerade_url: String,
    pub masquerade_rewrite: bool,
    pub manage_listen: String,
    pub manage_public: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_host: String::new(),
            listen_port: DEFAULT_LISTEN_PORT,
            sni: DEFAULT_SNI.to_string(),
            masquerade_url: DEFAULT_MASQUERADE_URL.to_string(),
            masquerade_rewrite: true,
            manage_listen: DEFAULT_MANAGE_LISTEN.to_string(),
            manage_public: false,
        }
    }
}

/// The single administrative principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Admin {
    pub username: String,
    #[serde(alias = "passwordBcrypt")]
    pub password_hash: String,
    pub totp_enabled: bool,
    /// Base32 secret; root-only like the rest of the file.
    pub totp_secret: String,
}

impl Default for Admin {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN.to_string(),
            password_hash: String::new(),
            totp_enabled: false,
            totp_secret: String::new(),
        }
    }
}

/// One authorized client identity. `username` keys the daemon's auth map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub username: String,
    /// Stored in clear; the state file is root-only. Never log it.
    pub password: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build an enabled node. Missing username defaults to `u<id>`, missing
    /// password to 16 random bytes hex encoded.
    pub fn new(name: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        let id = NodeId::random();
        let now = Utc::now();
        let username = username
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("u{id}"));
        let password = password
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| random_hex(16));
        Self {
            id,
            name: name.into(),
            username,
            password,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Bearer credential for the read-only URI export. Only the hash is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subscription {
    #[serde(alias = "tokenSha256")]
    pub token_hashed: String,
    #[serde(
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// A token has been issued and not revoked.
    pub fn is_active(&self) -> bool {
        !self.token_hashed.is_empty() && self.revoked_at.is_none()
    }
}

/// Root of the persisted desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub admin: Admin,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub subscription: Subscription,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            settings: Settings::default(),
            admin: Admin::default(),
            nodes: vec![],
            subscription: Subscription::default(),
        }
    }
}

impl DesiredState {
    /// Fix up fields that older or hand-edited files leave unset.
    pub fn normalize(&mut self) {
        if self.version == 0 {
            self.version = STATE_VERSION;
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Nodes in creation order (stable for equal timestamps).
    pub fn nodes_sorted(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.created_at);
        nodes
    }

    /// `username -> password` for enabled nodes. On a username collision the
    /// later node in the collection wins.
    pub fn enabled_credentials(&self) -> BTreeMap<String, String> {
        self.nodes
            .iter()
            .filter(|n| n.enabled)
            .map(|n| (n.username.clone(), n.password.clone()))
            .collect()
    }

    /// Usernames shared by more than one enabled node.
    pub fn duplicate_enabled_usernames(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut dupes = BTreeSet::new();
        for node in self.nodes.iter().filter(|n| n.enabled) {
            if !seen.insert(node.username.as_str()) {
                dupes.insert(node.username.clone());
            }
        }
        dupes.into_iter().collect()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

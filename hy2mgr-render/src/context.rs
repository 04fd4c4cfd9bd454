//! Rendering payload for the daemon config template.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use hy2mgr_core::{DesiredState, Layout};

use crate::error::RenderError;

/// Placeholder shown instead of passwords in previews and diffs.
pub const MASK: &str = "***";

/// Everything the daemon config depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigContext {
    pub port: u16,
    pub cert_path: String,
    pub key_path: String,
    /// `username -> password`, enabled nodes only. Ordered, so output is deterministic.
    pub credentials: BTreeMap<String, String>,
    pub masquerade_url: String,
    pub rewrite_host: bool,
}

impl ConfigContext {
    pub fn new(
        port: u16,
        cert_path: &Path,
        key_path: &Path,
        credentials: BTreeMap<String, String>,
        masquerade_url: impl Into<String>,
        rewrite_host: bool,
    ) -> Self {
        Self {
            port,
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
            credentials,
            masquerade_url: masquerade_url.into(),
            rewrite_host,
        }
    }

    /// Context for `state` with the cert/key locations of `layout`.
    pub fn from_state(state: &DesiredState, layout: &Layout) -> Self {
        Self::new(
            state.settings.listen_port,
            &layout.cert_path(),
            &layout.key_path(),
            state.enabled_credentials(),
            state.settings.masquerade_url.clone(),
            state.settings.masquerade_rewrite,
        )
    }

    /// Same context with every password replaced by [`MASK`].
    pub fn masked(&self) -> Self {
        let credentials = self
            .credentials
            .keys()
            .map(|user| (user.clone(), MASK.to_string()))
            .collect();
        Self {
            credentials,
            ..self.clone()
        }
    }

    /// Build the tera context. Every string is pre-quoted as a JSON string,
    /// which is also a valid double-quoted YAML scalar.
    pub(crate) fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        let users = self
            .credentials
            .iter()
            .map(|(name, password)| {
                Ok(UserEntry {
                    name: quote(name)?,
                    password: quote(password)?,
                })
            })
            .collect::<Result<Vec<_>, RenderError>>()?;

        let mut ctx = tera::Context::new();
        ctx.insert("listen", &quote(&format!(":{}", self.port))?);
        ctx.insert("cert", &quote(&self.cert_path)?);
        ctx.insert("key", &quote(&self.key_path)?);
        ctx.insert("users", &users);
        ctx.insert("masquerade_url", &quote(&self.masquerade_url)?);
        ctx.insert("rewrite_host", &self.rewrite_host);
        Ok(ctx)
    }
}

#[derive(Serialize)]
struct UserEntry {
    name: String,
    password: String,
}

fn quote(raw: &str) -> Result<String, RenderError> {
    Ok(serde_json::to_string(raw)?)
}

//! # hy2mgr-render
//!
//! Turns desired state into the daemon's `config.yaml`, checks a document's
//! structural completeness, and builds client URIs.
//!
//! ```rust,no_run
//! use hy2mgr_core::{DesiredState, Layout};
//! use hy2mgr_render::{validate, ConfigContext, ConfigRenderer};
//!
//! fn preview(state: &DesiredState) -> Result<String, hy2mgr_render::RenderError> {
//!     let ctx = ConfigContext::from_state(state, &Layout::system());
//!     let doc = ConfigRenderer::new()?.render(&ctx)?;
//!     validate(&doc)?;
//!     Ok(doc)
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod uri;
pub mod validate;

pub use context::{ConfigContext, MASK};
pub use engine::{render, ConfigRenderer};
pub use error::RenderError;
pub use uri::{client_uri, UriParams};
pub use validate::{listen_port, mask_userpass, validate, ServerConfig};

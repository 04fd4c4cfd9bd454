//! Tera rendering of `config.yaml`.

use tera::Tera;

use crate::context::ConfigContext;
use crate::error::RenderError;

const TEMPLATE_NAME: &str = "config.yaml";
const TEMPLATE: &str = include_str!("templates/config.yaml.tera");

/// Renders the daemon config from a [`ConfigContext`].
///
/// Create once with [`ConfigRenderer::new`] and reuse.
pub struct ConfigRenderer {
    tera: Tera,
}

impl ConfigRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render(&self, ctx: &ConfigContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        Ok(self.tera.render(TEMPLATE_NAME, &tera_ctx)?)
    }

    /// Render with every password replaced by `***`.
    pub fn render_masked(&self, ctx: &ConfigContext) -> Result<String, RenderError> {
        self.render(&ctx.masked())
    }
}

/// One-shot render without keeping a [`ConfigRenderer`] around.
pub fn render(ctx: &ConfigContext) -> Result<String, RenderError> {
    ConfigRenderer::new()?.render(ctx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

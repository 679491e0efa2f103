//! Logical view name → concrete source and artifact paths.
//!
//! A logical name is at most `controller/action`. Shorter shapes borrow the
//! missing parts from the render context: a bare `action` uses the current
//! controller, an empty name uses the current controller *and* action. The
//! module-scoped source is probed first, the global one second; resolution
//! never invents paths outside those two trees.

use std::path::PathBuf;

use tracing::debug;

use crate::api::RenderContext;
use crate::config::Config;
use crate::error::{Result, TemplateError};
use crate::fs::TemplateFs;

/// A resolved view: where its source lives and where its compiled artifact
/// belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedView {
    pub source: PathBuf,
    pub compiled: PathBuf,
}

/// Resolve a logical view name against the context, module first.
pub(crate) fn resolve(
    fs: &dyn TemplateFs,
    cfg: &Config,
    ctx: &RenderContext,
    view: &str,
) -> Result<ResolvedView> {
    let name = normalize(view, ctx);

    if !ctx.module.is_empty() {
        let candidate = ResolvedView {
            source: cfg.root.join("program/module").join(&ctx.module).join("view").join(format!("{name}.tpl")),
            compiled: cfg.root.join("run/view_c").join(&ctx.module).join(format!("{name}.tplc")),
        };
        if fs.probe(&candidate.source) {
            debug!(view, module = %ctx.module, source = %candidate.source.display(), "resolved module view");
            return Ok(candidate);
        }
        debug!(view, module = %ctx.module, "no module view, falling back to global");
    }

    let global = ResolvedView {
        source: cfg.root.join("program/view").join(format!("{name}.tpl")),
        compiled: cfg.root.join("run/view_c").join(format!("{name}.tplc")),
    };
    if fs.probe(&global.source) {
        debug!(view, source = %global.source.display(), "resolved global view");
        return Ok(global);
    }

    Err(TemplateError::TemplateNotFound { view: view.to_string() })
}

/// Normalize a logical name to `controller/action` form.
fn normalize(view: &str, ctx: &RenderContext) -> String {
    let name = view.replace('\\', "/");
    let name = name.trim_matches('/');
    if name.is_empty() {
        return format!("{}/{}", ctx.controller, ctx.action);
    }
    if !name.contains('/') {
        return format!("{}/{}", ctx.controller, name);
    }
    name.to_string()
}

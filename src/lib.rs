extern crate self as glaze;

use regex::Regex;

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod fs;
mod render;
mod rules;

pub use api::{
    Bindings, Engine, PageCache, RecompileEntry, RecompileReport, RecompileStatus, RenderContext,
    replace,
};
pub use config::{Config, RecompileMode};
pub use error::{Result, TemplateError};
pub use fs::{MemFs, OsFs, TemplateFs};
pub use render::functions::NativeFn;

/// Value type flowing through variable bindings and expression evaluation.
pub use serde_json::Value;

// --- Internal types ---------------------------------------------------------

/// Opening marker of a code island in a compiled artifact.
///
/// This doubles as the raw-code marker: a template *source* containing it
/// anywhere fails compilation with [`TemplateError::RawCodeDisallowed`].
pub(crate) const CODE_OPEN: &str = "<?";

/// Closing marker of a code island in a compiled artifact.
pub(crate) const CODE_CLOSE: &str = "?>";

/// Rewriter callback: produces the replacement text for one directive
/// occurrence. Captured sub-spans arrive via `Captures`; compile-time
/// constants (path roots, client flags) via [`CompileEnv`].
pub(crate) type Rewrite = Box<dyn Fn(&regex::Captures, &CompileEnv) -> String + Send + Sync>;

/// A rewrite rule: a name, a `matcher` identifying one directive occurrence
/// (a non-greedy delimited span) and a `rewrite` producing its replacement.
///
/// Rules form a fixed, insertion-ordered sequence. Order matters: some
/// matchers are textually subsumed by others (the generic function-call
/// catch-all would swallow every directive ending in `)`), so the table is
/// evaluated top to bottom and a rule never re-scans text an earlier rule
/// already rewrote (see `engine::rewrite`).
pub(crate) struct Rule {
    pub name: &'static str,
    pub matcher: &'static Regex,
    pub rewrite: Rewrite,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("matcher", &self.matcher.as_str())
            .field("rewrite", &"<function>")
            .finish()
    }
}

/// Compile-time environment a rewrite runs against.
///
/// Everything here is baked into the compiled artifact as plain text, so it
/// must only hold values that are stable for the lifetime of the artifact
/// (static path roots from configuration). The one exception is
/// `legacy_browser`, a per-request fact that poisons any artifact it is
/// baked into; the rewriter logs a warning when a rule consumes it (see
/// `rules::directives`).
#[derive(Debug, Clone)]
pub(crate) struct CompileEnv {
    /// Image root URL, e.g. `/static/admin/images/`.
    pub img_root: String,
    /// Stylesheet root URL, e.g. `/static/admin/css/`.
    pub css_root: String,
    /// Script root URL, e.g. `/static/admin/js/`.
    pub js_root: String,
    /// Upload root URL, e.g. `/upload/`.
    pub upload_root: String,
    /// Client sniffed as a legacy browser at compile time.
    pub legacy_browser: bool,
}

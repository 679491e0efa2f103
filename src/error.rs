use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors surfaced at the engine boundary.
///
/// The first two variants mirror the stable numeric codes callers have
/// historically dispatched on; [`TemplateError::code`] preserves them.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// No source file matched the logical view name, neither module-scoped
    /// nor global.
    #[error("template not found: {view}")]
    TemplateNotFound { view: String },

    /// The raw source embeds the engine's own code marker. Templates must
    /// never carry native code outside a `{php}...{/php}` block.
    #[error("raw code is not allowed in template: {path}")]
    RawCodeDisallowed { path: PathBuf },

    /// A compiled artifact could not be parsed back into view code
    /// (truncated island, unbalanced block, malformed clause).
    #[error("malformed compiled artifact: {0}")]
    Parse(String),

    /// Expression or statement evaluation failed at render time.
    #[error("render error: {0}")]
    Eval(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TemplateError {
    /// Stable numeric code for cross-boundary dispatch.
    pub fn code(&self) -> u32 {
        match self {
            TemplateError::TemplateNotFound { .. } => 1,
            TemplateError::RawCodeDisallowed { .. } => 2,
            TemplateError::Parse(_) => 3,
            TemplateError::Eval(_) => 4,
            TemplateError::Config(_) => 5,
            TemplateError::Io(_) => 6,
        }
    }
}

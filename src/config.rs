//! Engine configuration.
//!
//! Two layers, in priority order: compiled defaults ([`Config::default`])
//! and an optional JSON file ([`Config::from_json_file`]). Unknown keys are
//! rejected so a typo in a deploy config fails loudly instead of silently
//! falling back to a default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TemplateError};

/// When the staleness cache recompiles a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecompileMode {
    /// Compare mtimes per request; recompile when the source is newer.
    #[default]
    Auto,
    /// Recompile unconditionally on every resolution (diagnostics).
    Always,
    /// Never check staleness; trust the deploy pipeline to have produced
    /// current artifacts.
    Never,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Filesystem root. Sources live under `program/`, compiled artifacts
    /// under `run/view_c/`, public assets under `public/`.
    pub root: PathBuf,
    /// Base URL prepended to every generated asset reference. Trailing
    /// slashes are ignored.
    pub base_url: String,
    /// Debug mode: keep source line correspondence (skip output stripping),
    /// rebuild asset bundles unconditionally, append cache-busting version
    /// parameters to single-file asset references.
    pub debug: bool,
    pub recompile: RecompileMode,
    /// Static version string used for cache busting.
    pub version: String,
    /// Upload root URL emitted for the `{upload}` directive.
    pub upload_path: String,
    /// All known module names; drives the bulk recompile walk.
    pub modules: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            base_url: String::new(),
            debug: false,
            recompile: RecompileMode::Auto,
            version: "0".to_string(),
            upload_path: "/upload/".to_string(),
            modules: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, on top of the defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| TemplateError::Config(format!("{}: {e}", path.display())))
    }

    /// Base URL with any trailing slash removed, ready for concatenation
    /// with an absolute asset path.
    pub(crate) fn url_root(&self) -> &str {
        self.base_url.trim_end_matches(['/', '\\'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_safe() {
        let cfg = Config::default();
        assert!(!cfg.debug);
        assert_eq!(cfg.recompile, RecompileMode::Auto);
        assert_eq!(cfg.version, "0");
    }

    #[test]
    fn json_overrides_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{"root": "/srv/app", "debug": true, "recompile": "never", "modules": ["admin"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.root, PathBuf::from("/srv/app"));
        assert!(cfg.debug);
        assert_eq!(cfg.recompile, RecompileMode::Never);
        assert_eq!(cfg.modules, vec!["admin".to_string()]);
        // Untouched keys keep their defaults.
        assert_eq!(cfg.upload_path, "/upload/");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res: std::result::Result<Config, _> = serde_json::from_str(r#"{"rooot": "/srv"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn url_root_trims_trailing_slash() {
        let cfg = Config { base_url: "https://cdn.example.com/".into(), ..Config::default() };
        assert_eq!(cfg.url_root(), "https://cdn.example.com");
    }
}

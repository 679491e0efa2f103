//! Asset bundling: an ordered list of stylesheet or script names becomes a
//! single HTML tag.
//!
//! Multi-file lists are concatenated into one bundle artifact under the
//! static cache directory, keyed by a hash of the kind-qualified, ordered
//! member list — order matters, `[a, b]` and `[b, a]` are distinct bundles.
//! A single-file request bypasses bundling entirely and references the file
//! directly. Bundle staleness is presence-only: members are not mtime-checked
//! (an existing bundle is reused as-is), so shipping changed assets means a
//! debug render or deleting the cache directory. Debug mode rebuilds bundles
//! unconditionally and appends a version parameter to direct references.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::api::RenderContext;
use crate::config::Config;
use crate::error::Result;
use crate::fs::TemplateFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssetKind {
    Style,
    Script,
}

impl AssetKind {
    fn subdir(self) -> &'static str {
        match self {
            AssetKind::Style => "css",
            AssetKind::Script => "js",
        }
    }

    fn ext(self) -> &'static str {
        self.subdir()
    }

    fn tag(self, url: &str) -> String {
        match self {
            AssetKind::Style => {
                format!("<link rel='stylesheet' type='text/css' href='{url}' media='all'/>\n")
            }
            AssetKind::Script => format!("<script type='text/javascript' src='{url}'></script>\n"),
        }
    }
}

/// Produce the HTML tag for an ordered asset list, bundling when the list
/// has more than one member.
pub(crate) fn include_assets(
    fs: &dyn TemplateFs,
    cfg: &Config,
    ctx: &RenderContext,
    kind: AssetKind,
    names: &[String],
) -> Result<String> {
    if names.is_empty() {
        return Ok(String::new());
    }

    let rels: Vec<String> = names.iter().map(|n| rel_path(fs, cfg, kind, ctx, n)).collect();

    if let [rel] = rels.as_slice() {
        // Single file: no bundle artifact, reference it directly. Debug mode
        // appends the version so a changed file beats browser caches.
        let mut url = format!("{}{rel}", cfg.url_root());
        if cfg.debug {
            url.push_str("?v=");
            url.push_str(&cfg.version);
        }
        return Ok(kind.tag(&url));
    }

    let key = bundle_key(kind, &rels);
    let bundle_rel = if ctx.module.is_empty() {
        format!("/static/cache/{key}.{}", kind.ext())
    } else {
        format!("/static/{}/cache/{key}.{}", ctx.module, kind.ext())
    };
    let bundle_path = physical(cfg, &bundle_rel);

    if cfg.debug || !fs.probe(&bundle_path) {
        debug!(bundle = %bundle_path.display(), members = rels.len(), "building asset bundle");
        let mut merged = String::new();
        for rel in &rels {
            merged.push_str(&format!("/* {rel} */\n"));
            merged.push_str(&fs.read_to_string(&physical(cfg, rel))?);
            merged.push('\n');
        }
        if let Some(parent) = bundle_path.parent() {
            fs.create_dir_all(parent)?;
        }
        fs.write_atomic(&bundle_path, &merged)?;
    } else {
        debug!(bundle = %bundle_path.display(), "reusing asset bundle");
    }

    Ok(kind.tag(&format!("{}{bundle_rel}", cfg.url_root())))
}

/// Root-relative URL path of one asset, module tree first with a global
/// fallback (same shape as view resolution). A leading `/` forces the
/// global static tree regardless of the current module.
fn rel_path(
    fs: &dyn TemplateFs,
    cfg: &Config,
    kind: AssetKind,
    ctx: &RenderContext,
    name: &str,
) -> String {
    let forced_global = name.starts_with('/');
    let name = name.trim_start_matches('/');
    let global = format!("/static/{}/{}.{}", kind.subdir(), name, kind.ext());

    if forced_global || ctx.module.is_empty() {
        return global;
    }
    let scoped = format!("/static/{}/{}/{}.{}", ctx.module, kind.subdir(), name, kind.ext());
    if fs.probe(&physical(cfg, &scoped)) || !fs.probe(&physical(cfg, &global)) {
        scoped
    } else {
        global
    }
}

fn physical(cfg: &Config, rel: &str) -> PathBuf {
    cfg.root.join("public").join(rel.trim_start_matches('/'))
}

/// Deterministic bundle key: SHA-256 of the JSON-encoded, kind-qualified,
/// ordered member list.
pub(crate) fn bundle_key(kind: AssetKind, rels: &[String]) -> String {
    let qualified: Vec<String> = rels.iter().map(|r| format!("{}:{r}", kind.subdir())).collect();
    let json = serde_json::to_string(&qualified).expect("strings always encode");
    let digest = Sha256::digest(json.as_bytes());
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use std::path::Path;

    fn cfg() -> Config {
        Config { root: "/app".into(), base_url: "https://cdn.example.com".into(), ..Config::default() }
    }

    fn ctx() -> RenderContext {
        RenderContext::new("admin", "user", "list")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_file_bypasses_bundling() {
        let fs = MemFs::new();
        let tag = include_assets(&fs, &cfg(), &ctx(), AssetKind::Style, &names(&["base"])).unwrap();
        assert_eq!(
            tag,
            "<link rel='stylesheet' type='text/css' href='https://cdn.example.com/static/admin/css/base.css' media='all'/>\n"
        );
        // No artifact was written anywhere.
        assert!(fs.walk(Path::new("/app")).is_empty());
    }

    #[test]
    fn debug_appends_version_to_direct_references() {
        let fs = MemFs::new();
        let cfg = Config { debug: true, version: "42".into(), ..cfg() };
        let tag = include_assets(&fs, &cfg, &ctx(), AssetKind::Script, &names(&["app"])).unwrap();
        assert!(tag.contains("/static/admin/js/app.js?v=42"));
    }

    #[test]
    fn bundle_key_is_order_sensitive_and_kind_qualified() {
        let ab = bundle_key(AssetKind::Style, &names(&["/static/css/a.css", "/static/css/b.css"]));
        let ba = bundle_key(AssetKind::Style, &names(&["/static/css/b.css", "/static/css/a.css"]));
        assert_ne!(ab, ba);

        let as_script = bundle_key(AssetKind::Script, &names(&["/static/css/a.css", "/static/css/b.css"]));
        assert_ne!(ab, as_script);
    }

    #[test]
    fn multi_file_lists_merge_into_one_artifact() {
        let fs = MemFs::new();
        fs.insert("/app/public/static/admin/css/a.css", "A{}");
        fs.insert("/app/public/static/admin/css/b.css", "B{}");

        let tag = include_assets(&fs, &cfg(), &ctx(), AssetKind::Style, &names(&["a", "b"])).unwrap();
        let key = bundle_key(
            AssetKind::Style,
            &names(&["/static/admin/css/a.css", "/static/admin/css/b.css"]),
        );
        assert!(tag.contains(&format!("https://cdn.example.com/static/admin/cache/{key}.css")));

        let bundle = fs
            .contents(&Path::new("/app/public/static/admin/cache").join(format!("{key}.css")))
            .unwrap();
        assert_eq!(bundle, "/* /static/admin/css/a.css */\nA{}\n/* /static/admin/css/b.css */\nB{}\n");
    }

    #[test]
    fn existing_bundles_are_reused_without_mtime_checks() {
        let fs = MemFs::new();
        fs.insert("/app/public/static/admin/css/a.css", "A{}");
        fs.insert("/app/public/static/admin/css/b.css", "B{}");
        include_assets(&fs, &cfg(), &ctx(), AssetKind::Style, &names(&["a", "b"])).unwrap();

        // Changing a member does not invalidate the bundle; presence is the
        // only staleness signal.
        fs.insert("/app/public/static/admin/css/a.css", "A-changed{}");
        include_assets(&fs, &cfg(), &ctx(), AssetKind::Style, &names(&["a", "b"])).unwrap();

        let key = bundle_key(
            AssetKind::Style,
            &names(&["/static/admin/css/a.css", "/static/admin/css/b.css"]),
        );
        let bundle = fs
            .contents(&Path::new("/app/public/static/admin/cache").join(format!("{key}.css")))
            .unwrap();
        assert!(bundle.contains("A{}"));
        assert!(!bundle.contains("A-changed"));
    }

    #[test]
    fn debug_rebuilds_existing_bundles() {
        let fs = MemFs::new();
        fs.insert("/app/public/static/admin/css/a.css", "A{}");
        fs.insert("/app/public/static/admin/css/b.css", "B{}");
        let debug_cfg = Config { debug: true, ..cfg() };
        include_assets(&fs, &debug_cfg, &ctx(), AssetKind::Style, &names(&["a", "b"])).unwrap();

        fs.insert("/app/public/static/admin/css/a.css", "A-changed{}");
        include_assets(&fs, &debug_cfg, &ctx(), AssetKind::Style, &names(&["a", "b"])).unwrap();

        let key = bundle_key(
            AssetKind::Style,
            &names(&["/static/admin/css/a.css", "/static/admin/css/b.css"]),
        );
        let bundle = fs
            .contents(&Path::new("/app/public/static/admin/cache").join(format!("{key}.css")))
            .unwrap();
        assert!(bundle.contains("A-changed"));
    }

    #[test]
    fn leading_slash_forces_the_global_tree() {
        let fs = MemFs::new();
        fs.insert("/app/public/static/admin/js/vendor/jquery.js", "");
        let rel = rel_path(&fs, &cfg(), AssetKind::Script, &ctx(), "/vendor/jquery");
        assert_eq!(rel, "/static/js/vendor/jquery.js");
        let rel = rel_path(&fs, &cfg(), AssetKind::Script, &ctx(), "app");
        assert_eq!(rel, "/static/admin/js/app.js");
    }

    #[test]
    fn module_asset_falls_back_to_the_global_tree() {
        let fs = MemFs::new();
        fs.insert("/app/public/static/js/shared.js", "");
        let rel = rel_path(&fs, &cfg(), AssetKind::Script, &ctx(), "shared");
        assert_eq!(rel, "/static/js/shared.js");

        // A module-scoped copy shadows the global one.
        fs.insert("/app/public/static/admin/js/shared.js", "");
        let rel = rel_path(&fs, &cfg(), AssetKind::Script, &ctx(), "shared");
        assert_eq!(rel, "/static/admin/js/shared.js");
    }
}

//! The staleness cache: decides when a compiled artifact is current and
//! produces a fresh one when it is not.
//!
//! Validity is a pure filesystem property. An artifact is reusable iff it
//! exists and its mtime is at least the source's mtime; nothing is cached in
//! memory, so any number of workers (plus a deploy process touching sources)
//! agree without coordination. Writes go through the atomic rename path so a
//! concurrent reader never sees a truncated artifact, and a failed
//! compilation writes nothing at all — the stale check simply fires again on
//! the next request.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::CompileEnv;
use crate::config::{Config, RecompileMode};
use crate::engine::resolve::ResolvedView;
use crate::engine::rewrite;
use crate::error::Result;
use crate::fs::TemplateFs;

/// Return current compiled text for the view, recompiling per the configured
/// mode.
pub(crate) fn compile_if_stale(
    fs: &dyn TemplateFs,
    cfg: &Config,
    view: &ResolvedView,
    env: &CompileEnv,
) -> Result<String> {
    let recompile = match cfg.recompile {
        RecompileMode::Always => true,
        RecompileMode::Never => !is_present(fs, &view.compiled),
        RecompileMode::Auto => is_stale(fs, view),
    };

    if !recompile {
        debug!(compiled = %view.compiled.display(), "artifact current, reusing");
        return Ok(fs.read_to_string(&view.compiled)?);
    }

    debug!(source = %view.source.display(), "artifact stale, recompiling");
    compile(fs, cfg, &view.source, &view.compiled, env)
}

fn is_present(fs: &dyn TemplateFs, compiled: &Path) -> bool {
    fs.mtime(compiled).is_ok()
}

/// Stale iff the artifact is missing or older than its source.
fn is_stale(fs: &dyn TemplateFs, view: &ResolvedView) -> bool {
    let Ok(compiled) = fs.mtime(&view.compiled) else {
        return true;
    };
    match fs.mtime(&view.source) {
        Ok(source) => compiled < source,
        Err(_) => true,
    }
}

fn compile(
    fs: &dyn TemplateFs,
    cfg: &Config,
    source: &Path,
    compiled: &Path,
    env: &CompileEnv,
) -> Result<String> {
    let text = fs.read_to_string(source)?;
    let out = rewrite::transpile(&text, source, env, cfg.debug)?;
    if let Some(parent) = compiled.parent() {
        fs.create_dir_all(parent)?;
    }
    fs.write_atomic(compiled, &out)?;
    Ok(out)
}

/// Outcome of one file in a bulk recompile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompileStatus {
    Compiled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RecompileEntry {
    pub source: PathBuf,
    pub compiled: PathBuf,
    pub status: RecompileStatus,
}

/// Per-file trace of a bulk recompile walk.
#[derive(Debug, Clone, Default)]
pub struct RecompileReport {
    pub entries: Vec<RecompileEntry>,
    /// Whether the page cache collaborator was cleared alongside the walk.
    pub cleared_page_cache: bool,
}

impl RecompileReport {
    pub fn compiled(&self) -> usize {
        self.entries.iter().filter(|e| e.status == RecompileStatus::Compiled).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.compiled()
    }
}

/// Recompile every `.tpl` under every configured module's view tree (and the
/// global tree) unconditionally. A file that fails to compile is recorded
/// and skipped; the walk continues.
pub(crate) fn recompile_all(
    fs: &dyn TemplateFs,
    cfg: &Config,
    env_of_module: impl Fn(&str) -> CompileEnv,
) -> RecompileReport {
    let mut report = RecompileReport::default();

    let mut trees: Vec<(String, PathBuf, PathBuf)> = vec![(
        String::new(),
        cfg.root.join("program/view"),
        cfg.root.join("run/view_c"),
    )];
    for module in &cfg.modules {
        trees.push((
            module.clone(),
            cfg.root.join("program/module").join(module).join("view"),
            cfg.root.join("run/view_c").join(module),
        ));
    }

    for (module, source_root, compiled_root) in trees {
        let env = env_of_module(&module);
        for source in fs.walk(&source_root) {
            if source.extension().is_none_or(|e| e != "tpl") {
                continue;
            }
            let rel = source.strip_prefix(&source_root).expect("walk stays under its root");
            let compiled = compiled_root.join(rel).with_extension("tplc");

            let status = match compile(fs, cfg, &source, &compiled, &env) {
                Ok(_) => {
                    info!(source = %source.display(), compiled = %compiled.display(), "recompiled");
                    RecompileStatus::Compiled
                }
                Err(e) => {
                    info!(source = %source.display(), error = %e, "recompile failed, continuing");
                    RecompileStatus::Failed(e.to_string())
                }
            };
            report.entries.push(RecompileEntry { source, compiled, status });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use std::time::{Duration, SystemTime};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn env() -> CompileEnv {
        CompileEnv {
            img_root: "/static/images/".into(),
            css_root: "/static/css/".into(),
            js_root: "/static/js/".into(),
            upload_root: "/upload/".into(),
            legacy_browser: false,
        }
    }

    fn view() -> ResolvedView {
        ResolvedView {
            source: "/app/program/view/user/list.tpl".into(),
            compiled: "/app/run/view_c/user/list.tplc".into(),
        }
    }

    #[test]
    fn fresh_artifact_is_reused_verbatim() {
        let fs = MemFs::new();
        fs.insert_at(view().source, "Hello {$name}", at(100));
        fs.insert_at(view().compiled, "CACHED", at(200));

        let out = compile_if_stale(&fs, &Config::default(), &view(), &env()).unwrap();
        assert_eq!(out, "CACHED");
    }

    #[test]
    fn equal_mtimes_count_as_fresh() {
        let fs = MemFs::new();
        fs.insert_at(view().source, "Hello {$name}", at(100));
        fs.insert_at(view().compiled, "CACHED", at(100));

        let out = compile_if_stale(&fs, &Config::default(), &view(), &env()).unwrap();
        assert_eq!(out, "CACHED");
    }

    #[test]
    fn newer_source_triggers_exactly_one_recompile() {
        let fs = MemFs::new();
        fs.insert_at(view().source, "Hello {$name}", at(300));
        fs.insert_at(view().compiled, "STALE", at(200));

        let out = compile_if_stale(&fs, &Config::default(), &view(), &env()).unwrap();
        assert_eq!(out, "Hello <?=$name?>");

        // Prove the next call reuses rather than recompiles: plant a sentinel
        // artifact with a newer mtime and watch it come back untouched.
        fs.insert_at(view().compiled, "SENTINEL", at(400));
        let out = compile_if_stale(&fs, &Config::default(), &view(), &env()).unwrap();
        assert_eq!(out, "SENTINEL");
    }

    #[test]
    fn missing_artifact_compiles_even_in_never_mode() {
        let fs = MemFs::new();
        fs.insert(view().source, "Hi {$x}");
        let cfg = Config { recompile: RecompileMode::Never, ..Config::default() };

        let out = compile_if_stale(&fs, &cfg, &view(), &env()).unwrap();
        assert_eq!(out, "Hi <?=$x?>");
    }

    #[test]
    fn never_mode_trusts_a_stale_artifact() {
        let fs = MemFs::new();
        fs.insert_at(view().source, "new {$x}", at(500));
        fs.insert_at(view().compiled, "OLD", at(100));
        let cfg = Config { recompile: RecompileMode::Never, ..Config::default() };

        let out = compile_if_stale(&fs, &cfg, &view(), &env()).unwrap();
        assert_eq!(out, "OLD");
    }

    #[test]
    fn always_mode_recompiles_fresh_artifacts() {
        let fs = MemFs::new();
        fs.insert_at(view().source, "Hello {$name}", at(100));
        fs.insert_at(view().compiled, "CACHED", at(200));
        let cfg = Config { recompile: RecompileMode::Always, ..Config::default() };

        let out = compile_if_stale(&fs, &cfg, &view(), &env()).unwrap();
        assert_eq!(out, "Hello <?=$name?>");
    }

    #[test]
    fn failed_compilation_writes_no_artifact() {
        let fs = MemFs::new();
        fs.insert(view().source, "bad <? raw ?> code");

        let err = compile_if_stale(&fs, &Config::default(), &view(), &env()).unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(!fs.exists(&view().compiled));
    }

    #[test]
    fn bulk_recompile_walks_all_trees_and_continues_past_failures() {
        let fs = MemFs::new();
        fs.insert("/app/program/view/home/index.tpl", "global {$a}");
        fs.insert("/app/program/module/admin/view/user/list.tpl", "module {$b}");
        fs.insert("/app/program/module/admin/view/user/bad.tpl", "oops <?");
        fs.insert("/app/program/view/notes.txt", "not a template");

        let cfg = Config {
            root: "/app".into(),
            modules: vec!["admin".to_string()],
            ..Config::default()
        };
        let report = recompile_all(&fs, &cfg, |_| env());

        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.compiled(), 2);
        assert_eq!(report.failed(), 1);
        assert!(fs.exists(std::path::Path::new("/app/run/view_c/home/index.tplc")));
        assert!(fs.exists(std::path::Path::new("/app/run/view_c/admin/user/list.tplc")));
        assert!(!fs.exists(std::path::Path::new("/app/run/view_c/admin/user/bad.tplc")));
    }
}

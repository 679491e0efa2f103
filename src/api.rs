//! Public engine surface.
//!
//! [`Engine`] ties the pipeline together: resolve a logical view name,
//! bring its compiled artifact up to date, execute it against the caller's
//! bindings. All request-dependent state travels in an explicit
//! [`RenderContext`] value; the engine itself holds only configuration and
//! the pluggable collaborators (filesystem, function/helper registries,
//! page cache).

use std::io;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::Config;
use crate::engine::bundle::{self, AssetKind};
use crate::engine::{cache, resolve};
use crate::error::Result;
use crate::fs::{OsFs, TemplateFs};
use crate::render::eval::{Evaluator, Scope, to_display};
use crate::render::functions::{self, NativeFn, Registry};
use crate::render::parse;
use crate::CompileEnv;

pub use crate::engine::cache::{RecompileEntry, RecompileReport, RecompileStatus};

/// Variable bindings handed to a render: name → value.
pub type Bindings = Map<String, Value>;

/// Request-scoped rendering state, threaded explicitly through every call.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Current module; empty for the global scope.
    pub module: String,
    pub controller: String,
    pub action: String,
    /// Client sniffed as a legacy browser; consumed by the `{ifIE}`
    /// directive at compile time.
    pub legacy_browser: bool,
}

impl RenderContext {
    pub fn new(module: impl Into<String>, controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            controller: controller.into(),
            action: action.into(),
            legacy_browser: false,
        }
    }
}

/// Whole-page cache collaborator, cleared alongside a bulk recompile.
pub trait PageCache: Send + Sync {
    fn clear_all(&self) -> Result<()>;
}

pub struct Engine {
    config: Config,
    fs: Arc<dyn TemplateFs>,
    functions: Registry,
    helpers: Registry,
    page_cache: Option<Box<dyn PageCache>>,
}

impl Engine {
    /// Engine over the real filesystem.
    pub fn new(config: Config) -> Self {
        Self::with_fs(config, Arc::new(OsFs))
    }

    /// Engine over an explicit filesystem (tests use [`crate::MemFs`]).
    pub fn with_fs(config: Config, fs: Arc<dyn TemplateFs>) -> Self {
        Self {
            config,
            fs,
            functions: functions::default_functions(),
            helpers: functions::default_helpers(),
            page_cache: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register (or override) a view-code function, e.g. a real `translate`
    /// backed by a catalog or a router-backed `url`.
    pub fn register_function(&mut self, name: impl Into<String>, f: NativeFn) {
        self.functions.insert(name.into(), f);
    }

    /// Register (or override) a `:name(args)` helper.
    pub fn register_helper(&mut self, name: impl Into<String>, f: NativeFn) {
        self.helpers.insert(name.into(), f);
    }

    pub fn set_page_cache(&mut self, cache: Box<dyn PageCache>) {
        self.page_cache = Some(cache);
    }

    pub(crate) fn function(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    pub(crate) fn helper(&self, name: &str) -> Option<&NativeFn> {
        self.helpers.get(name)
    }

    /// Render a view directly into a writer.
    pub fn render(
        &self,
        view: &str,
        ctx: &RenderContext,
        bindings: Bindings,
        out: &mut dyn io::Write,
    ) -> Result<()> {
        let text = self.render_to_string(view, ctx, bindings)?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Render a view and capture the output.
    pub fn render_to_string(&self, view: &str, ctx: &RenderContext, bindings: Bindings) -> Result<String> {
        let mut out = String::new();
        self.render_nested(view, ctx, bindings, &mut out, 0)?;
        Ok(out)
    }

    /// Render a view into an existing output buffer. Sub-template inclusion
    /// re-enters here with an incremented depth, so nesting is purely
    /// structural and cannot leak between top-level renders.
    pub(crate) fn render_nested(
        &self,
        view: &str,
        ctx: &RenderContext,
        bindings: Bindings,
        out: &mut String,
        depth: usize,
    ) -> Result<()> {
        let resolved = resolve::resolve(self.fs.as_ref(), &self.config, ctx, view)?;
        let compiled = cache::compile_if_stale(self.fs.as_ref(), &self.config, &resolved, &self.compile_env(ctx))?;
        let nodes = parse::parse(&compiled)?;
        let mut scope = Scope::from_bindings(bindings);
        Evaluator { engine: self, ctx, depth }.exec_block(&nodes, &mut scope, out)
    }

    /// Current compiled text for a view, recompiling first if stale. This is
    /// the transpiler's output before execution.
    pub fn compiled_source(&self, view: &str, ctx: &RenderContext) -> Result<String> {
        let resolved = resolve::resolve(self.fs.as_ref(), &self.config, ctx, view)?;
        cache::compile_if_stale(self.fs.as_ref(), &self.config, &resolved, &self.compile_env(ctx))
    }

    /// Recompile every configured view tree unconditionally and clear the
    /// page cache collaborator. Per-file failures are recorded in the report
    /// and do not stop the walk.
    pub fn recompile_all(&self) -> Result<RecompileReport> {
        let mut report = cache::recompile_all(self.fs.as_ref(), &self.config, |module| {
            self.env_for_module(module, false)
        });
        if let Some(cache) = &self.page_cache {
            cache.clear_all()?;
            report.cleared_page_cache = true;
        }
        Ok(report)
    }

    /// Stylesheet inclusion tag for an ordered file list.
    pub fn include_styles(&self, names: &[String], ctx: &RenderContext) -> Result<String> {
        bundle::include_assets(self.fs.as_ref(), &self.config, ctx, AssetKind::Style, names)
    }

    /// Script inclusion tag for an ordered file list.
    pub fn include_scripts(&self, names: &[String], ctx: &RenderContext) -> Result<String> {
        bundle::include_assets(self.fs.as_ref(), &self.config, ctx, AssetKind::Script, names)
    }

    fn compile_env(&self, ctx: &RenderContext) -> CompileEnv {
        self.env_for_module(&ctx.module, ctx.legacy_browser)
    }

    fn env_for_module(&self, module: &str, legacy_browser: bool) -> CompileEnv {
        let base = self.config.url_root();
        let scope = if module.is_empty() { String::new() } else { format!("{module}/") };
        CompileEnv {
            img_root: format!("{base}/static/{scope}images/"),
            css_root: format!("{base}/static/{scope}css/"),
            js_root: format!("{base}/static/{scope}js/"),
            upload_root: format!("{base}{}", self.config.upload_path),
            legacy_browser,
        }
    }
}

/// Literal `{$key}` substitution with no compilation or caching: the
/// mail-merge companion to the full pipeline.
pub fn replace(template: &str, params: &Bindings) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{${key}}}"), &to_display(value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn bindings(value: Value) -> Bindings {
        match value {
            Value::Object(map) => map,
            _ => panic!("bindings fixture must be an object"),
        }
    }

    fn engine_with(views: &[(&str, &str)]) -> Engine {
        let fs = MemFs::new();
        for (path, source) in views {
            fs.insert(format!("/app{path}"), *source);
        }
        let cfg = Config { root: "/app".into(), modules: vec!["admin".to_string()], ..Config::default() };
        Engine::with_fs(cfg, Arc::new(fs))
    }

    fn ctx() -> RenderContext {
        RenderContext::new("admin", "user", "list")
    }

    #[test]
    fn renders_variable_interpolation() {
        let engine = engine_with(&[("/program/view/user/list.tpl", "Hello {$name}!")]);
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"name": "Alice"})))
            .unwrap();
        assert_eq!(out, "Hello Alice!");
    }

    #[test]
    fn renders_if_else_branches() {
        let engine = engine_with(&[(
            "/program/view/user/list.tpl",
            "{if($n > 5)}big{else}small{endif}",
        )]);
        let out = engine.render_to_string("user/list", &ctx(), bindings(json!({"n": 9}))).unwrap();
        assert_eq!(out, "big");
        let out = engine.render_to_string("user/list", &ctx(), bindings(json!({"n": 3}))).unwrap();
        assert_eq!(out, "small");
    }

    #[test]
    fn renders_foreach_with_keys() {
        let engine = engine_with(&[(
            "/program/view/user/list.tpl",
            "{foreach($rows as $i => $row)}{$i}:{$row};{endforeach}",
        )]);
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"rows": ["a", "b"]})))
            .unwrap();
        assert_eq!(out, "0:a;1:b;");
    }

    #[test]
    fn comments_leave_no_trace() {
        let engine = engine_with(&[(
            "/program/view/user/list.tpl",
            "a{# hidden }b{* also\nhidden *}c",
        )]);
        let out = engine.render_to_string("user/list", &ctx(), Bindings::new()).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn raw_code_fails_with_the_stable_code() {
        let engine = engine_with(&[("/program/view/user/list.tpl", "x <? sneaky() ?> y")]);
        let err = engine.render_to_string("user/list", &ctx(), Bindings::new()).unwrap_err();
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn missing_view_fails_with_the_stable_code() {
        let engine = engine_with(&[]);
        let err = engine.render_to_string("user/missing", &ctx(), Bindings::new()).unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn empty_view_name_resolves_from_the_context() {
        let engine = engine_with(&[("/program/view/user/list.tpl", "current action")]);
        let out = engine.render_to_string("", &ctx(), Bindings::new()).unwrap();
        assert_eq!(out, "current action");
    }

    #[test]
    fn module_view_wins_over_global() {
        let engine = engine_with(&[
            ("/program/view/user/list.tpl", "global"),
            ("/program/module/admin/view/user/list.tpl", "module"),
        ]);
        let out = engine.render_to_string("user/list", &ctx(), Bindings::new()).unwrap();
        assert_eq!(out, "module");
    }

    #[test]
    fn include_renders_into_the_same_output() {
        let engine = engine_with(&[
            ("/program/view/user/list.tpl", "[{include('user/card', ['id' => $id])}]"),
            ("/program/view/user/card.tpl", "card #{$id}"),
        ]);
        let out = engine.render_to_string("user/list", &ctx(), bindings(json!({"id": 7}))).unwrap();
        assert_eq!(out, "[card #7]");
    }

    #[test]
    fn self_inclusion_hits_the_depth_limit() {
        let engine = engine_with(&[("/program/view/user/list.tpl", "{include('user/list')}")]);
        let err = engine.render_to_string("user/list", &ctx(), Bindings::new()).unwrap_err();
        assert_eq!(err.code(), 4);
    }

    #[test]
    fn default_directive_falls_back_on_empty() {
        let engine = engine_with(&[("/program/view/user/list.tpl", "{default($title,'untitled')}")]);
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"title": ""})))
            .unwrap();
        assert_eq!(out, "untitled");
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"title": "Report"})))
            .unwrap();
        assert_eq!(out, "Report");
    }

    #[test]
    fn conditional_display_hides_the_empty_date_sentinel() {
        let engine = engine_with(&[("/program/view/user/list.tpl", "[{?$born}]")]);
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"born": "0000-00-00"})))
            .unwrap();
        assert_eq!(out, "[]");
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"born": "1999-12-31"})))
            .unwrap();
        assert_eq!(out, "[1999-12-31]");
    }

    #[test]
    fn registered_helpers_dispatch_from_views() {
        let mut engine = engine_with(&[("/program/view/user/list.tpl", "{:shout($word)}")]);
        engine.register_helper(
            "shout",
            Box::new(|_e: &Engine, _c: &RenderContext, args: &[Value]| {
                Ok(Value::String(to_display(&args[0]).to_uppercase()))
            }),
        );
        let out = engine.render_to_string("user/list", &ctx(), bindings(json!({"word": "hi"}))).unwrap();
        assert_eq!(out, "HI");
    }

    #[test]
    fn translation_shorthand_reaches_the_registry() {
        let mut engine = engine_with(&[("/program/view/user/list.tpl", "{_('greeting')}")]);
        engine.register_function(
            "translate",
            Box::new(|_e: &Engine, _c: &RenderContext, args: &[Value]| {
                Ok(Value::String(format!("<{}>", to_display(&args[0]))))
            }),
        );
        let out = engine.render_to_string("user/list", &ctx(), Bindings::new()).unwrap();
        assert_eq!(out, "<greeting>");
    }

    #[test]
    fn recompile_all_clears_the_page_cache() {
        static CLEARED: AtomicBool = AtomicBool::new(false);
        struct StaticFlag;
        impl PageCache for StaticFlag {
            fn clear_all(&self) -> Result<()> {
                CLEARED.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let mut engine = engine_with(&[
            ("/program/view/home/index.tpl", "{$a}"),
            ("/program/module/admin/view/user/list.tpl", "{$b}"),
        ]);
        engine.set_page_cache(Box::new(StaticFlag));

        let report = engine.recompile_all().unwrap();
        assert_eq!(report.compiled(), 2);
        assert_eq!(report.failed(), 0);
        assert!(report.cleared_page_cache);
        assert!(CLEARED.load(Ordering::SeqCst));
    }

    #[test]
    fn replace_substitutes_literally() {
        let params = bindings(json!({"name": "Bo", "n": 3}));
        assert_eq!(replace("Hi {$name}, {$n} new, {$other}", &params), "Hi Bo, 3 new, {$other}");
    }

    #[test]
    fn assign_and_loops_compose() {
        let engine = engine_with(&[(
            "/program/view/user/list.tpl",
            "{assign($total = 0)}{foreach($prices as $p)}{assign($total = $total + $p)}{endforeach}{$total}",
        )]);
        let out = engine
            .render_to_string("user/list", &ctx(), bindings(json!({"prices": [1, 2, 3]})))
            .unwrap();
        assert_eq!(out, "6");
    }
}

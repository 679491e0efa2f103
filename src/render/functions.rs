//! Function and helper registries for view code.
//!
//! `name(args)` in an expression dispatches through the function registry,
//! `:name(args)` through the helper registry. Both hold boxed closures so an
//! application can register its own collaborators (`translate` backed by a
//! real catalog, `url` backed by a router) over the defaults.

use std::collections::HashMap;

use serde_json::Value;

use crate::api::{Engine, RenderContext};
use crate::error::{Result, TemplateError};
use crate::render::eval::to_display;

/// A native function callable from view code.
pub type NativeFn = Box<dyn Fn(&Engine, &RenderContext, &[Value]) -> Result<Value> + Send + Sync>;

pub(crate) type Registry = HashMap<String, NativeFn>;

pub(crate) fn default_functions() -> Registry {
    let mut reg = Registry::new();

    // Identity translation; applications override this with a catalog.
    // Both spellings dispatch here because the shorthand directive rewrites
    // to `translate(...)` while hand-written islands may call `_(...)`.
    reg.insert("translate".to_string(), Box::new(translate) as NativeFn);
    reg.insert("_".to_string(), Box::new(translate) as NativeFn);

    reg.insert("url".to_string(), Box::new(url) as NativeFn);
    reg.insert("count".to_string(), Box::new(count) as NativeFn);

    reg.insert(
        "js".to_string(),
        Box::new(|engine: &Engine, ctx: &RenderContext, args: &[Value]| {
            engine.include_scripts(&display_all(args), ctx).map(Value::String)
        }) as NativeFn,
    );
    reg.insert(
        "css".to_string(),
        Box::new(|engine: &Engine, ctx: &RenderContext, args: &[Value]| {
            engine.include_styles(&display_all(args), ctx).map(Value::String)
        }) as NativeFn,
    );

    reg
}

pub(crate) fn default_helpers() -> Registry {
    let mut reg = Registry::new();

    reg.insert(
        "pathRoot".to_string(),
        Box::new(|engine: &Engine, _ctx: &RenderContext, _args: &[Value]| {
            Ok(Value::String(format!("{}/", engine.config().url_root())))
        }) as NativeFn,
    );
    reg.insert("pathStatic".to_string(), static_path(None));
    reg.insert("pathCss".to_string(), static_path(Some("css")));
    reg.insert("pathJs".to_string(), static_path(Some("js")));
    reg.insert("pathImg".to_string(), static_path(Some("images")));

    reg.insert(
        "ver".to_string(),
        Box::new(|engine: &Engine, _ctx: &RenderContext, _args: &[Value]| {
            Ok(Value::String(engine.config().version.clone()))
        }) as NativeFn,
    );

    reg
}

fn static_path(subdir: Option<&'static str>) -> NativeFn {
    Box::new(move |engine: &Engine, ctx: &RenderContext, _args: &[Value]| {
        let mut path = format!("{}/static/", engine.config().url_root());
        if !ctx.module.is_empty() {
            path.push_str(&ctx.module);
            path.push('/');
        }
        if let Some(sub) = subdir {
            path.push_str(sub);
            path.push('/');
        }
        Ok(Value::String(path))
    })
}

fn translate(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value> {
    let Some(key) = args.first() else {
        return Err(TemplateError::Eval("translate() needs a key".to_string()));
    };
    Ok(Value::String(to_display(key)))
}

/// `url()` → current `/module/controller/action`; `url('path')` →
/// base-relative path; an optional second map argument becomes the query
/// string, keys in binding order.
fn url(engine: &Engine, ctx: &RenderContext, args: &[Value]) -> Result<Value> {
    let path = args.first().map(to_display).unwrap_or_default();
    let mut out = if path.is_empty() {
        format!("{}/{}/{}/{}", engine.config().url_root(), ctx.module, ctx.controller, ctx.action)
    } else if path.starts_with('/') {
        format!("{}{}", engine.config().url_root(), path)
    } else {
        format!("{}/{}", engine.config().url_root(), path)
    };

    if let Some(params) = args.get(1) {
        let Value::Object(map) = params else {
            return Err(TemplateError::Eval("url() params must have string keys".to_string()));
        };
        for (i, (k, v)) in map.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(k);
            out.push('=');
            out.push_str(&to_display(v));
        }
    }
    Ok(Value::String(out))
}

fn count(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value> {
    let n = match args.first() {
        Some(Value::Array(a)) => a.len(),
        Some(Value::Object(o)) => o.len(),
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Null) | None => 0,
        Some(_) => 1,
    };
    Ok(Value::from(n as u64))
}

fn display_all(args: &[Value]) -> Vec<String> {
    args.iter().map(to_display).collect()
}

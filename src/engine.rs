//! Compilation and resolution engine.
//!
//! This module owns the path from a logical view name to a current compiled
//! artifact, plus the asset bundler that shares its resolution and caching
//! machinery.
//!
//! ## How the parts work together
//!
//! ```text
//! logical name ── resolve::resolve ──► (source path, compiled path)
//!                    (resolve.rs)              │
//!                                              ▼
//!                                   cache::compile_if_stale
//!                                       (cache.rs)
//!                             mtime check ── stale? ──┐
//!                                  │ fresh            ▼
//!                                  │        rewrite::transpile
//!                                  │            (rewrite.rs)
//!                                  │        ordered rule table,
//!                                  │        span-consuming passes
//!                                  │                  │
//!                                  ▼                  ▼
//!                            compiled path ◄── atomic write
//! ```
//!
//! During artifact execution (see `crate::render`), `{js(...)}`/`{css(...)}`
//! directives call into `bundle.rs`, which reuses the same module-then-global
//! fallback and presence-based caching.
//!
//! The filesystem is the only cache. Nothing here holds artifact validity in
//! memory between calls; mtimes are re-read every time so a separate deploy
//! process editing sources stays correct.

#[path = "engine/bundle.rs"]
pub(crate) mod bundle;
#[path = "engine/cache.rs"]
pub(crate) mod cache;
#[path = "engine/resolve.rs"]
pub(crate) mod resolve;
#[path = "engine/rewrite.rs"]
pub(crate) mod rewrite;

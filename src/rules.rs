//! The directive grammar, declared as an ordered table of rewrite rules.
//!
//! Each rule is an independent matcher/rewriter pair; the table as a whole
//! *is* the grammar. Evaluation order is load-bearing (see
//! `rules/directives.rs` for the ordering constraints) and the table is
//! process-wide immutable, built once on first use.

use once_cell::sync::Lazy;

use crate::Rule;

#[path = "rules/directives.rs"]
pub(crate) mod directives;


/// The one directive table. Rewrites consult a per-compile `CompileEnv`
/// for baked-in constants, so the table itself never changes after startup.
pub(crate) static TABLE: Lazy<Vec<Rule>> = Lazy::new(directives::get);

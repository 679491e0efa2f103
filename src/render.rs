//! Execution of compiled artifacts.
//!
//! A compiled artifact is plain output text interleaved with code islands:
//! `<?=expr?>` prints a value, `<?stmts?>` runs statements. Executing one is
//! a pipeline:
//!
//! ```text
//! compiled text ── lexer::lex ──► islands (Text / Echo / Stmt)
//!                                    │
//!                                    ▼
//!                             parse::parse
//!                       block assembly + expr parsing
//!                           (expr.rs does clauses)
//!                                    │
//!                                    ▼
//!                          eval::Evaluator::exec_block
//!                    scope of bindings, registries, output
//! ```
//!
//! The tree is rebuilt from the artifact text on every render; validity of
//! the artifact itself is the staleness cache's concern, not ours.

#[path = "render/eval.rs"]
pub(crate) mod eval;
#[path = "render/expr.rs"]
pub(crate) mod expr;
#[path = "render/functions.rs"]
pub(crate) mod functions;
#[path = "render/lexer.rs"]
pub(crate) mod lexer;
#[path = "render/parse.rs"]
pub(crate) mod parse;

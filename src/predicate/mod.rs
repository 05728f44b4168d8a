//! Predicate trees: construction, compilation, and evaluation.
//!
//! - [`tree`]: the immutable AST and its combinators (`&`, `|`, `!`,
//!   [`all_of`], [`any_of`], [`predicate`])
//! - `compile`: the N-ary flattening pass lowering trees to programs
//! - `runner`: iterative fast/audit evaluation
//! - [`trace`]: audit-mode execution traces

pub(crate) mod compile;
pub(crate) mod runner;
pub mod trace;
pub mod tree;

pub use runner::EvalOptions;
pub use trace::{Trace, TraceOp};
pub use tree::{all_of, any_of, predicate, Predicate};

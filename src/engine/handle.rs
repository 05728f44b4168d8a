//! Stable predicate handles with atomically hot-swappable runners.
//!
//! A [`PredicateHandle`] is the identity callers hold across manifest
//! updates: the engine swaps the inner compiled program under its write
//! lock, while readers dereference it with a single lock-free atomic load.
//! A handle with no installed program is a *tombstone* — created eagerly by
//! [`crate::engine::RuleEngine::get_predicate_handle`] or by a `ref` to a
//! rule no manifest has supplied yet — and fails evaluation with
//! [`EvalError::UnresolvedRule`] until an update installs a program.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::error::{EvalError, EvalResult};
use crate::predicate::compile::Program;
use crate::predicate::runner::{eval_audit, eval_fast, EvalOptions};
use crate::predicate::{Predicate, Trace};

struct HandleShared<C> {
    registry: String,
    rule_id: String,
    /// The currently installed program; `None` is the tombstone state.
    /// Mutated only by the engine under its write lock; read lock-free.
    slot: ArcSwapOption<Program<C>>,
}

/// Stable, shareable indirection to the live compiled runner of one rule.
///
/// Clones share identity ([`ptr_eq`](Self::ptr_eq)); the engine returns the
/// same handle for the same `(registry, rule_id)` for its whole lifetime.
pub struct PredicateHandle<C> {
    shared: Arc<HandleShared<C>>,
}

impl<C> Clone for PredicateHandle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> PredicateHandle<C> {
    pub(crate) fn tombstone(registry: impl Into<String>, rule_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                registry: registry.into(),
                rule_id: rule_id.into(),
                slot: ArcSwapOption::const_empty(),
            }),
        }
    }

    pub fn registry(&self) -> &str {
        &self.shared.registry
    }

    pub fn rule_id(&self) -> &str {
        &self.shared.rule_id
    }

    /// Whether a program is currently installed.
    pub fn is_resolved(&self) -> bool {
        self.shared.slot.load().is_some()
    }

    /// Identity comparison: do two handles share the same slot?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Install a new program. Engine-only; callers observe the swap on
    /// their next dereference, and in-flight evaluations finish against
    /// the program `Arc` they already loaded.
    pub(crate) fn install(&self, program: Arc<Program<C>>) {
        self.shared.slot.store(Some(program));
    }

    fn load(&self) -> EvalResult<Arc<Program<C>>> {
        self.shared.slot.load_full().ok_or_else(|| {
            EvalError::UnresolvedRule {
                registry: self.shared.registry.clone(),
                rule_id: self.shared.rule_id.clone(),
            }
        })
    }

    pub(crate) fn invoke_fast(&self, ctx: &C, short_circuit: bool) -> EvalResult<bool> {
        eval_fast(&*self.load()?, ctx, short_circuit)
    }

    pub(crate) fn invoke_audit(&self, ctx: &C, short_circuit: bool) -> EvalResult<Trace> {
        let mut trace = eval_audit(&*self.load()?, ctx, short_circuit)?;
        trace.label = Some(self.shared.rule_id.clone());
        Ok(trace)
    }

    /// Evaluate the installed runner with short-circuiting.
    pub fn eval(&self, ctx: &C) -> EvalResult<bool> {
        self.invoke_fast(ctx, true)
    }

    pub fn eval_with(&self, ctx: &C, options: &EvalOptions) -> EvalResult<bool> {
        self.invoke_fast(ctx, options.short_circuit)
    }

    /// Evaluate with an execution trace, labelled with the rule id.
    pub fn trace(&self, ctx: &C) -> EvalResult<Trace> {
        self.invoke_audit(ctx, true)
    }

    pub fn trace_with(&self, ctx: &C, options: &EvalOptions) -> EvalResult<Trace> {
        self.invoke_audit(ctx, options.short_circuit)
    }

    /// Wrap the handle as a composable predicate node.
    pub fn as_predicate(&self) -> Predicate<C> {
        Predicate::from_handle(self.clone())
    }
}

impl<C> fmt::Debug for PredicateHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateHandle")
            .field("registry", &self.shared.registry)
            .field("rule_id", &self.shared.rule_id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

//! The predicate AST and its combinators.
//!
//! A [`Predicate`] is an immutable, cheaply-clonable tree of logic nodes.
//! Combinators (`&`, `|`, `!`, [`all_of`], [`any_of`]) build new trees in
//! O(1) per operation without copying children; the tree is lowered to an
//! executable form lazily, on first evaluation, and the compiled program is
//! cached on the tree itself.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::{Arc, OnceLock};

use crate::engine::PredicateHandle;
use crate::error::EvalResult;
use crate::params::BoundParams;
use crate::predicate::compile::{compile, Program};
use crate::predicate::runner::{eval_audit, eval_fast, EvalOptions};
use crate::predicate::trace::Trace;
use crate::registry::RuleDef;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A node in the predicate tree.
///
/// `And`/`Or` hold two children when built by the binary combinators and N
/// children when built by [`all_of`]/[`any_of`]; the compiler flattens nested
/// same-operator chains either way.
pub(crate) enum Node<C> {
    Leaf {
        def: Arc<RuleDef<C>>,
        params: BoundParams,
    },
    And(Vec<Predicate<C>>),
    Or(Vec<Predicate<C>>),
    Not(Predicate<C>),
    Handle(PredicateHandle<C>),
}

impl<C> Node<C> {
    pub(crate) fn op_name(&self) -> &'static str {
        match self {
            Self::Leaf { .. } => "leaf",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Not(_) => "not",
            Self::Handle(_) => "ref",
        }
    }
}

struct Shared<C> {
    node: Node<C>,
    /// Compiled program, filled on first evaluation. One program serves both
    /// fast and audit mode, so fast and audit results cannot diverge.
    program: OnceLock<Arc<Program<C>>>,
}

/// An immutable predicate tree over contexts of type `C`.
///
/// Cloning is an `Arc` bump; clones share identity and the compiled-program
/// cache. Trees compose with `&`, `|` and `!` (or the equivalent named
/// methods) and evaluate with [`eval`](Self::eval) / [`trace`](Self::trace).
pub struct Predicate<C>(Arc<Shared<C>>);

impl<C> Clone for Predicate<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C> Predicate<C> {
    pub(crate) fn from_node(node: Node<C>) -> Self {
        Self(Arc::new(Shared {
            node,
            program: OnceLock::new(),
        }))
    }

    pub(crate) fn leaf(def: Arc<RuleDef<C>>, params: BoundParams) -> Self {
        Self::from_node(Node::Leaf { def, params })
    }

    /// Wrap an engine handle so it composes like any other predicate.
    pub fn from_handle(handle: PredicateHandle<C>) -> Self {
        Self::from_node(Node::Handle(handle))
    }

    pub(crate) fn node(&self) -> &Node<C> {
        &self.0.node
    }

    /// Binary conjunction. O(1); flattening happens at compile time.
    pub fn and(&self, other: &Predicate<C>) -> Predicate<C> {
        Self::from_node(Node::And(vec![self.clone(), other.clone()]))
    }

    /// Binary disjunction. O(1); flattening happens at compile time.
    pub fn or(&self, other: &Predicate<C>) -> Predicate<C> {
        Self::from_node(Node::Or(vec![self.clone(), other.clone()]))
    }

    /// Logical negation. `!!p` wraps twice here and cancels at compile time.
    pub fn negate(&self) -> Predicate<C> {
        Self::from_node(Node::Not(self.clone()))
    }

    fn program(&self) -> &Arc<Program<C>> {
        self.0.program.get_or_init(|| Arc::new(compile(&self.0.node)))
    }

    /// The cached compiled program, shared with every clone of this tree.
    pub(crate) fn compiled(&self) -> Arc<Program<C>> {
        Arc::clone(self.program())
    }

    /// Evaluate with short-circuiting, no tracing.
    pub fn eval(&self, ctx: &C) -> EvalResult<bool> {
        eval_fast(self.program(), ctx, true)
    }

    /// Evaluate without tracing, honoring the given options.
    pub fn eval_with(&self, ctx: &C, options: &EvalOptions) -> EvalResult<bool> {
        eval_fast(self.program(), ctx, options.short_circuit)
    }

    /// Evaluate with short-circuiting, producing an execution trace.
    pub fn trace(&self, ctx: &C) -> EvalResult<Trace> {
        eval_audit(self.program(), ctx, true)
    }

    /// Evaluate with a trace, honoring the given options.
    pub fn trace_with(&self, ctx: &C, options: &EvalOptions) -> EvalResult<Trace> {
        eval_audit(self.program(), ctx, options.short_circuit)
    }
}

impl<C> fmt::Debug for Predicate<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("node_type", &self.0.node.op_name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build a standalone leaf predicate from a bare closure.
///
/// The closure becomes an anonymous rule definition with an empty parameter
/// schema; `name` labels it in traces. Standalone predicates compose with
/// registry-produced leaves freely.
pub fn predicate<C, F>(name: impl Into<String>, func: F) -> Predicate<C>
where
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    let def = RuleDef::new(name, move |ctx: &C, _: &BoundParams| func(ctx));
    Predicate::leaf(Arc::new(def), BoundParams::empty())
}

/// N-ary conjunction over an ordered child list.
///
/// Builds the wide node directly, bypassing the binary-tree construction
/// cost for long chains. Children evaluate left to right.
pub fn all_of<C>(children: impl IntoIterator<Item = Predicate<C>>) -> Predicate<C> {
    Predicate::from_node(Node::And(children.into_iter().collect()))
}

/// N-ary disjunction over an ordered child list. See [`all_of`].
pub fn any_of<C>(children: impl IntoIterator<Item = Predicate<C>>) -> Predicate<C> {
    Predicate::from_node(Node::Or(children.into_iter().collect()))
}

// ---------------------------------------------------------------------------
// Operator overloads
// ---------------------------------------------------------------------------

impl<C> BitAnd for Predicate<C> {
    type Output = Predicate<C>;

    fn bitand(self, rhs: Predicate<C>) -> Predicate<C> {
        self.and(&rhs)
    }
}

impl<C> BitAnd for &Predicate<C> {
    type Output = Predicate<C>;

    fn bitand(self, rhs: &Predicate<C>) -> Predicate<C> {
        self.and(rhs)
    }
}

impl<C> BitOr for Predicate<C> {
    type Output = Predicate<C>;

    fn bitor(self, rhs: Predicate<C>) -> Predicate<C> {
        self.or(&rhs)
    }
}

impl<C> BitOr for &Predicate<C> {
    type Output = Predicate<C>;

    fn bitor(self, rhs: &Predicate<C>) -> Predicate<C> {
        self.or(rhs)
    }
}

impl<C> Not for Predicate<C> {
    type Output = Predicate<C>;

    fn not(self) -> Predicate<C> {
        self.negate()
    }
}

impl<C> Not for &Predicate<C> {
    type Output = Predicate<C>;

    fn not(self) -> Predicate<C> {
        self.negate()
    }
}

//! Iterative evaluation of compiled programs.
//!
//! Both evaluators walk the flattened tree with an explicit frame stack
//! sized at compile time, so evaluation never recurses on tree depth.
//! The fast path returns a bare `bool` and allocates nothing per node; the
//! audit path builds a [`Trace`] per node, including `skipped` markers for
//! siblings a short-circuit left unevaluated.

use std::time::{Duration, Instant};

use crate::error::EvalResult;
use crate::predicate::compile::{Compiled, Program};
use crate::predicate::trace::{Trace, TraceOp};

/// Options controlling an evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    /// Stop evaluating an N-ary node's children once its result is decided.
    /// Defaults to `true`.
    pub short_circuit: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            short_circuit: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Fast path
// ---------------------------------------------------------------------------

enum Frame<'a, C> {
    Nary {
        and: bool,
        children: &'a [Compiled<C>],
        idx: usize,
        acc: bool,
    },
    Not,
}

/// Evaluate to a bare boolean. Children run left to right; short-circuit
/// applies per N-ary node.
pub(crate) fn eval_fast<C>(program: &Program<C>, ctx: &C, short_circuit: bool) -> EvalResult<bool> {
    let mut stack: Vec<Frame<'_, C>> = Vec::with_capacity(program.depth);
    let mut current: &Compiled<C> = &program.root;

    'next: loop {
        // Descend until `current` yields a value.
        let mut value = loop {
            match current {
                Compiled::Leaf(leaf) => break leaf.def.invoke(ctx, &leaf.params),
                Compiled::Handle(handle) => break handle.invoke_fast(ctx, short_circuit)?,
                Compiled::Not(child) => {
                    stack.push(Frame::Not);
                    current = &**child;
                }
                Compiled::And(children) | Compiled::Or(children) => {
                    let and = matches!(current, Compiled::And(_));
                    if children.is_empty() {
                        // Operator identity: vacuous AND is true, vacuous OR false.
                        break and;
                    }
                    stack.push(Frame::Nary {
                        and,
                        children: &children[..],
                        idx: 0,
                        acc: and,
                    });
                    current = &children[0];
                }
            }
        };

        // Ascend, folding the value into enclosing frames.
        loop {
            match stack.last_mut() {
                None => return Ok(value),
                Some(Frame::Not) => {
                    stack.pop();
                    value = !value;
                }
                Some(Frame::Nary {
                    and,
                    children,
                    idx,
                    acc,
                }) => {
                    let and = *and;
                    // Copy the slice reference out so `current` outlives the
                    // frame borrow.
                    let children = *children;
                    *acc = if and { *acc && value } else { *acc || value };
                    *idx += 1;
                    let decided = short_circuit && (*acc != and);
                    if decided || *idx == children.len() {
                        value = *acc;
                        stack.pop();
                    } else {
                        current = &children[*idx];
                        continue 'next;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Audit path
// ---------------------------------------------------------------------------

enum AuditFrame<'a, C> {
    Nary {
        and: bool,
        children: &'a [Compiled<C>],
        idx: usize,
        acc: bool,
        traces: Vec<Trace>,
    },
    Not,
}

/// A trace marker for a node short-circuiting left unevaluated.
fn skip_marker<C>(node: &Compiled<C>) -> Trace {
    match node {
        Compiled::Leaf(leaf) => Trace::skipped(Some(leaf.label.clone()), TraceOp::Leaf),
        Compiled::Handle(handle) => {
            Trace::skipped(Some(handle.rule_id().to_string()), TraceOp::Leaf)
        }
        Compiled::And(_) => Trace::skipped(None, TraceOp::And),
        Compiled::Or(_) => Trace::skipped(None, TraceOp::Or),
        Compiled::Not(_) => Trace::skipped(None, TraceOp::Not),
    }
}

fn nary_trace(and: bool, acc: bool, traces: Vec<Trace>) -> Trace {
    let elapsed: Duration = traces.iter().map(|t| t.elapsed).sum();
    let op = if and { TraceOp::And } else { TraceOp::Or };
    Trace::evaluated(None, op, acc, traces, elapsed)
}

/// Evaluate producing a full execution trace.
pub(crate) fn eval_audit<C>(
    program: &Program<C>,
    ctx: &C,
    short_circuit: bool,
) -> EvalResult<Trace> {
    let mut stack: Vec<AuditFrame<'_, C>> = Vec::with_capacity(program.depth);
    let mut current: &Compiled<C> = &program.root;

    'next: loop {
        let mut trace = loop {
            match current {
                Compiled::Leaf(leaf) => {
                    let start = Instant::now();
                    let value = leaf.def.invoke(ctx, &leaf.params);
                    break Trace::evaluated(
                        Some(leaf.label.clone()),
                        TraceOp::Leaf,
                        value,
                        Vec::new(),
                        start.elapsed(),
                    );
                }
                Compiled::Handle(handle) => break handle.invoke_audit(ctx, short_circuit)?,
                Compiled::Not(child) => {
                    stack.push(AuditFrame::Not);
                    current = &**child;
                }
                Compiled::And(children) | Compiled::Or(children) => {
                    let and = matches!(current, Compiled::And(_));
                    if children.is_empty() {
                        break nary_trace(and, and, Vec::new());
                    }
                    stack.push(AuditFrame::Nary {
                        and,
                        children: &children[..],
                        idx: 0,
                        acc: and,
                        traces: Vec::with_capacity(children.len()),
                    });
                    current = &children[0];
                }
            }
        };

        loop {
            match stack.last_mut() {
                None => return Ok(trace),
                Some(AuditFrame::Not) => {
                    stack.pop();
                    let success = !trace.passed();
                    let elapsed = trace.elapsed;
                    trace = Trace::evaluated(None, TraceOp::Not, success, vec![trace], elapsed);
                }
                Some(AuditFrame::Nary {
                    and,
                    children,
                    idx,
                    acc,
                    traces,
                }) => {
                    let and = *and;
                    let children = *children;
                    let value = trace.passed();
                    *acc = if and { *acc && value } else { *acc || value };
                    traces.push(trace);
                    *idx += 1;
                    let decided = short_circuit && (*acc != and);
                    if decided {
                        // Unevaluated siblings appear as explicit skip markers.
                        for rest in &children[*idx..] {
                            traces.push(skip_marker(rest));
                        }
                        trace = nary_trace(and, *acc, std::mem::take(traces));
                        stack.pop();
                    } else if *idx == children.len() {
                        trace = nary_trace(and, *acc, std::mem::take(traces));
                        stack.pop();
                    } else {
                        current = &children[*idx];
                        continue 'next;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::tree::{all_of, predicate, Predicate};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct User {
        age: i64,
        role: &'static str,
    }

    fn is_adult(min_age: i64) -> Predicate<User> {
        predicate("is_adult", move |u: &User| u.age >= min_age)
    }

    fn has_role(role: &'static str) -> Predicate<User> {
        predicate("has_role", move |u: &User| u.role == role)
    }

    #[test]
    fn trace_marks_short_circuited_sibling_as_skipped() {
        let access = is_adult(18) & has_role("admin");
        let minor = User { age: 16, role: "admin" };

        let trace = access.trace(&minor).unwrap();
        assert_eq!(trace.success, Some(false));
        assert_eq!(trace.operator, TraceOp::And);
        assert_eq!(trace.children.len(), 2);

        let first = &trace.children[0];
        assert_eq!(first.success, Some(false));
        assert!(!first.skipped);

        let second = &trace.children[1];
        assert!(second.skipped);
        assert_eq!(second.success, None);
        assert_eq!(second.label.as_deref(), Some("has_role()"));
    }

    #[test]
    fn non_short_circuit_evaluates_every_sibling() {
        let calls: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let probes: Vec<Predicate<()>> = (0..4)
            .map(|i| {
                let calls = Arc::clone(&calls);
                predicate(format!("p{i}"), move |_: &()| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    i != 0
                })
            })
            .collect();
        let tree = all_of(probes);
        let opts = EvalOptions {
            short_circuit: false,
        };

        assert!(!tree.eval_with(&(), &opts).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        calls.store(0, Ordering::SeqCst);
        let trace = tree.trace_with(&(), &opts).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(trace.success, Some(false));
        assert!(trace.children.iter().all(|c| !c.skipped));
    }

    #[test]
    fn or_short_circuits_on_first_true() {
        let hit = predicate("hit", |_: &()| true);
        let never = predicate("never", |_: &()| panic!("must not be evaluated"));
        let tree = hit | never;
        assert!(tree.eval(&()).unwrap());

        let trace = tree.trace(&()).unwrap();
        assert_eq!(trace.success, Some(true));
        assert!(trace.children[1].skipped);
    }

    #[test]
    fn not_trace_wraps_child() {
        let tree = !is_adult(18);
        let adult = User { age: 30, role: "user" };
        let trace = tree.trace(&adult).unwrap();
        assert_eq!(trace.operator, TraceOp::Not);
        assert_eq!(trace.success, Some(false));
        assert_eq!(trace.children.len(), 1);
        assert_eq!(trace.children[0].success, Some(true));
    }

    #[test]
    fn short_circuit_and_evaluates_minimal_prefix() {
        let calls: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let probes: Vec<Predicate<()>> = (0..2000)
            .map(|i| {
                let calls = Arc::clone(&calls);
                predicate(format!("p{i}"), move |_: &()| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    i != 999
                })
            })
            .collect();
        let tree = all_of(probes);
        assert!(!tree.eval(&()).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn wide_all_of_true_when_all_children_true() {
        let probes: Vec<Predicate<()>> = (0..2000)
            .map(|i| predicate(format!("p{i}"), |_: &()| true))
            .collect();
        assert!(all_of(probes).eval(&()).unwrap());
    }
}

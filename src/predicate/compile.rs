//! Lowering predicate trees into executable programs.
//!
//! The single compilation pass flattens homogeneous AND/OR chains into wide
//! N-ary nodes, cancels double negation, collapses unary AND/OR wrappers,
//! and precomputes leaf labels so audit mode never formats on the hot path.
//! Both the pass itself and the resulting program's evaluation are iterative:
//! nothing in this module recurses, so tree depth is unbounded.

use std::sync::Arc;

use crate::engine::PredicateHandle;
use crate::params::BoundParams;
use crate::predicate::tree::{Node, Predicate};
use crate::registry::RuleDef;

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// A leaf ready to invoke: resolved definition, bound parameters, and the
/// `name(params)` label audit mode attaches to its trace node.
pub(crate) struct CompiledLeaf<C> {
    pub def: Arc<RuleDef<C>>,
    pub params: BoundParams,
    pub label: String,
}

/// A node of the flattened executable tree.
pub(crate) enum Compiled<C> {
    Leaf(CompiledLeaf<C>),
    And(Box<[Compiled<C>]>),
    Or(Box<[Compiled<C>]>),
    Not(Box<Compiled<C>>),
    Handle(PredicateHandle<C>),
}

/// The compiled, executable form of a predicate tree.
///
/// `depth` is the operator-nesting depth after flattening — the exact frame
/// capacity the evaluator needs, computed once here so evaluation performs a
/// single sized allocation at most.
pub(crate) struct Program<C> {
    pub root: Compiled<C>,
    pub depth: usize,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

enum Task<'a, C> {
    Node(&'a Node<C>),
    BuildNary { and: bool, count: usize },
    BuildNot,
}

/// Collect the maximal same-operator chain rooted at an N-ary node's child
/// list, expanding nested same-operator nodes in place so leaf order is
/// preserved left to right. Stops at operator changes, `Not`, `Leaf`, and
/// handle references.
fn collect_chain<'a, C>(children: &'a [Predicate<C>], and: bool) -> Vec<&'a Node<C>> {
    let mut chain = Vec::new();
    let mut stack: Vec<&'a Predicate<C>> = children.iter().rev().collect();
    while let Some(child) = stack.pop() {
        match child.node() {
            Node::And(inner) if and => stack.extend(inner.iter().rev()),
            Node::Or(inner) if !and => stack.extend(inner.iter().rev()),
            other => chain.push(other),
        }
    }
    chain
}

fn leaf_label<C>(def: &RuleDef<C>, params: &BoundParams) -> String {
    format!("{}({})", def.name(), params)
}

/// Lower a predicate tree into a [`Program`]. O(n) in tree nodes.
pub(crate) fn compile<C>(root: &Node<C>) -> Program<C> {
    let mut tasks: Vec<Task<'_, C>> = vec![Task::Node(root)];
    // Built subtrees and their depths, kept in lockstep.
    let mut built: Vec<Compiled<C>> = Vec::new();
    let mut depths: Vec<usize> = Vec::new();

    while let Some(task) = tasks.pop() {
        match task {
            Task::Node(node) => match node {
                Node::Leaf { def, params } => {
                    built.push(Compiled::Leaf(CompiledLeaf {
                        def: Arc::clone(def),
                        params: params.clone(),
                        label: leaf_label(def, params),
                    }));
                    depths.push(0);
                }
                Node::Handle(handle) => {
                    built.push(Compiled::Handle(handle.clone()));
                    depths.push(0);
                }
                Node::Not(child) => {
                    tasks.push(Task::BuildNot);
                    tasks.push(Task::Node(child.node()));
                }
                Node::And(children) | Node::Or(children) => {
                    let and = matches!(node, Node::And(_));
                    let chain = collect_chain(children, and);
                    tasks.push(Task::BuildNary {
                        and,
                        count: chain.len(),
                    });
                    for member in chain.into_iter().rev() {
                        tasks.push(Task::Node(member));
                    }
                }
            },
            Task::BuildNot => {
                let child = built.pop().expect("child built before BuildNot");
                let depth = depths.pop().expect("depth tracked per built node");
                match child {
                    // Double negation cancels here, never at construction.
                    Compiled::Not(inner) => {
                        built.push(*inner);
                        depths.push(depth - 1);
                    }
                    other => {
                        built.push(Compiled::Not(Box::new(other)));
                        depths.push(depth + 1);
                    }
                }
            }
            Task::BuildNary { and, count } => {
                let mut children = built.split_off(built.len() - count);
                let child_depths = depths.split_off(depths.len() - count);
                if count == 1 {
                    // Unary wrapper left by trivial inputs: collapse to the child.
                    built.push(children.remove(0));
                    depths.push(child_depths[0]);
                } else {
                    let max_child = child_depths.iter().copied().max().unwrap_or(0);
                    let boxed = children.into_boxed_slice();
                    built.push(if and {
                        Compiled::And(boxed)
                    } else {
                        Compiled::Or(boxed)
                    });
                    depths.push(max_child + 1);
                }
            }
        }
    }

    let root = built.pop().expect("compilation yields exactly one root");
    let depth = depths.pop().expect("depth tracked for root");
    Program { root, depth }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::tree::{all_of, any_of, predicate};

    fn t() -> Predicate<()> {
        predicate("t", |_: &()| true)
    }

    fn children_of(c: &Compiled<()>) -> &[Compiled<()>] {
        match c {
            Compiled::And(cs) | Compiled::Or(cs) => cs,
            _ => panic!("expected an n-ary node"),
        }
    }

    #[test]
    fn binary_and_chain_flattens_to_one_wide_node() {
        let p = ((t() & t()) & t()) & (t() & t());
        let program = compile(p.node());
        assert!(matches!(program.root, Compiled::And(_)));
        assert_eq!(children_of(&program.root).len(), 5);
        assert_eq!(program.depth, 1);
    }

    #[test]
    fn flattening_stops_at_operator_change() {
        let p = t() & (t() | t()) & t();
        let program = compile(p.node());
        let top = children_of(&program.root);
        assert_eq!(top.len(), 3);
        assert!(matches!(top[1], Compiled::Or(_)));
        assert_eq!(program.depth, 2);
    }

    #[test]
    fn flattening_stops_at_not() {
        let p = t() & !(t() & t());
        let program = compile(p.node());
        let top = children_of(&program.root);
        assert_eq!(top.len(), 2);
        assert!(matches!(top[1], Compiled::Not(_)));
    }

    #[test]
    fn double_negation_cancels() {
        let p = !!t();
        let program = compile(p.node());
        assert!(matches!(program.root, Compiled::Leaf(_)));
        assert_eq!(program.depth, 0);

        let q = !!!t();
        let program = compile(q.node());
        assert!(matches!(program.root, Compiled::Not(_)));
        assert_eq!(program.depth, 1);
    }

    #[test]
    fn unary_nary_collapses_to_child() {
        let p = all_of([t()]);
        let program = compile(p.node());
        assert!(matches!(program.root, Compiled::Leaf(_)));
    }

    #[test]
    fn nary_constructors_flatten_with_nested_binary() {
        let p = any_of([t() | t(), t(), t()]);
        let program = compile(p.node());
        assert_eq!(children_of(&program.root).len(), 4);
    }

    #[test]
    fn deep_chain_compiles_iteratively_to_linear_width() {
        let mut p = t();
        for _ in 0..4000 {
            p = p & t();
        }
        let program = compile(p.node());
        assert_eq!(children_of(&program.root).len(), 4001);
        assert_eq!(program.depth, 1);
    }

    #[test]
    fn leaf_labels_include_bound_params() {
        let user_pred = predicate("always", |_: &()| true);
        let program = compile(user_pred.node());
        match &program.root {
            Compiled::Leaf(leaf) => assert_eq!(leaf.label, "always()"),
            _ => panic!("expected leaf"),
        }
    }
}

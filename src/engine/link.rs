//! Linking manifests into runtime predicate trees.
//!
//! Translation resolves every `leaf` against the registry (validating bound
//! parameters), turns every `ref` into a handle owned by the engine, and
//! preserves N-ary structure for the compiler. Cycle detection runs over the
//! registry's *cumulative* dependency view so rings assembled across
//! successive updates are rejected, not just intra-manifest ones.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::engine::handle::PredicateHandle;
use crate::error::{LinkError, PredyResult};
use crate::manifest::{LogicNode, Manifest, RuleConfig};
use crate::params::bind_params;
use crate::predicate::tree::Node;
use crate::predicate::Predicate;
use crate::registry::Registry;

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

enum Task<'a> {
    Node(&'a LogicNode),
    BuildNary { and: bool, count: usize },
    BuildNot,
}

fn link_leaf<C>(registry: &Registry<C>, rule: &RuleConfig) -> PredyResult<Predicate<C>> {
    let def = registry.get(&rule.rule_def_name)?;
    let bound = bind_params(&rule.rule_def_name, def.params(), &rule.params)?;
    Ok(Predicate::leaf(def, bound))
}

/// Translate one manifest tree bottom-up, iteratively.
fn translate<C>(
    registry_name: &str,
    registry: &Registry<C>,
    root: &LogicNode,
    handle_for: &mut impl FnMut(&str) -> PredicateHandle<C>,
) -> PredyResult<Predicate<C>> {
    let mut tasks: Vec<Task<'_>> = vec![Task::Node(root)];
    let mut built: Vec<Predicate<C>> = Vec::new();

    while let Some(task) = tasks.pop() {
        match task {
            Task::Node(node) => match node {
                LogicNode::Leaf { rule } => built.push(link_leaf(registry, rule)?),
                LogicNode::Ref { ref_id } => {
                    built.push(Predicate::from_handle(handle_for(ref_id)));
                }
                LogicNode::Not { rule } => {
                    tasks.push(Task::BuildNot);
                    tasks.push(Task::Node(rule));
                }
                LogicNode::And { rules } | LogicNode::Or { rules } => {
                    let and = matches!(node, LogicNode::And { .. });
                    if rules.len() < 2 {
                        return Err(LinkError::ManifestValidation {
                            registry: registry_name.to_string(),
                            message: format!(
                                "`{}` node requires at least 2 children, got {}",
                                if and { "and" } else { "or" },
                                rules.len()
                            ),
                        }
                        .into());
                    }
                    tasks.push(Task::BuildNary {
                        and,
                        count: rules.len(),
                    });
                    for child in rules.iter().rev() {
                        tasks.push(Task::Node(child));
                    }
                }
            },
            Task::BuildNary { and, count } => {
                let children = built.split_off(built.len() - count);
                built.push(Predicate::from_node(if and {
                    Node::And(children)
                } else {
                    Node::Or(children)
                }));
            }
            Task::BuildNot => {
                let child = built.pop().expect("child linked before BuildNot");
                built.push(child.negate());
            }
        }
    }

    Ok(built.pop().expect("translation yields exactly one root"))
}

/// Link every rule of a manifest, producing `rule_id → predicate tree`.
///
/// `handle_for` resolves a ref id to the engine-owned handle for
/// `(manifest.registry, ref_id)`, creating a tombstone if none exists yet.
pub(crate) fn link_manifest<C>(
    manifest: &Manifest,
    registry: &Registry<C>,
    mut handle_for: impl FnMut(&str) -> PredicateHandle<C>,
) -> PredyResult<BTreeMap<String, Predicate<C>>> {
    let mut linked = BTreeMap::new();
    for (rule_id, node) in &manifest.rules {
        let tree = translate(&manifest.registry, registry, node, &mut handle_for)?;
        linked.insert(rule_id.clone(), tree);
    }
    Ok(linked)
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Reject reference cycles in one registry's merged dependency view.
///
/// `deps` maps rule id → referenced rule ids. Targets never defined anywhere
/// appear as sink nodes and cannot participate in a cycle (they stay
/// tombstoned until a later update supplies them).
pub(crate) fn detect_cycle(deps: &BTreeMap<String, Vec<String>>) -> Result<(), LinkError> {
    fn node_of<'a>(
        graph: &mut DiGraph<&'a str, ()>,
        index: &mut HashMap<&'a str, NodeIndex>,
        id: &'a str,
    ) -> NodeIndex {
        *index.entry(id).or_insert_with(|| graph.add_node(id))
    }

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for (rule_id, targets) in deps {
        let from = node_of(&mut graph, &mut index, rule_id);
        for target in targets {
            let to = node_of(&mut graph, &mut index, target);
            graph.add_edge(from, to, ());
        }
    }

    for scc in tarjan_scc(&graph) {
        if scc.len() > 1 {
            return Err(LinkError::RuleCycle {
                path: ring_path(&graph, &scc),
            });
        }
        if graph.find_edge(scc[0], scc[0]).is_some() {
            let label = graph[scc[0]].to_string();
            return Err(LinkError::RuleCycle {
                path: vec![label.clone(), label],
            });
        }
    }
    Ok(())
}

/// Recover a concrete ring `a -> … -> a` inside a strongly connected
/// component, via iterative DFS restricted to the component's members.
fn ring_path(graph: &DiGraph<&str, ()>, scc: &[NodeIndex]) -> Vec<String> {
    let members: HashSet<NodeIndex> = scc.iter().copied().collect();
    let start = scc[0];

    let mut path = vec![start];
    let mut iters = vec![graph.neighbors(start)];
    let mut visited: HashSet<NodeIndex> = HashSet::from([start]);

    while let Some(neighbors) = iters.last_mut() {
        match neighbors.next() {
            Some(next) if next == start => {
                let mut ring: Vec<String> =
                    path.iter().map(|&idx| graph[idx].to_string()).collect();
                ring.push(graph[start].to_string());
                return ring;
            }
            Some(next) if members.contains(&next) && visited.insert(next) => {
                path.push(next);
                iters.push(graph.neighbors(next));
            }
            Some(_) => {}
            None => {
                iters.pop();
                path.pop();
            }
        }
    }

    // Unreachable for a strongly connected component, but never panic here.
    vec![graph[start].to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParamError, PredyError, RegistryError};
    use crate::manifest::Manifest;
    use crate::params::{BoundParams, ParamSpec};
    use crate::registry::RuleDef;
    use serde_json::json;

    struct User {
        age: i64,
    }

    fn registry() -> Registry<User> {
        let registry = Registry::new("users").unwrap();
        registry
            .register(
                RuleDef::new("is_adult", |u: &User, p: &BoundParams| {
                    u.age >= p.int("min_age")
                })
                .with_param(ParamSpec::int("min_age").with_default(18)),
            )
            .unwrap();
        registry
    }

    fn deps(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| {
                (
                    from.to_string(),
                    to.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn direct_cycle_detected_with_path() {
        let err = detect_cycle(&deps(&[("x", &["y"]), ("y", &["x"])])).unwrap_err();
        let LinkError::RuleCycle { path } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(path.len(), 3);
        assert_eq!(path.first(), path.last());
        assert!(path.contains(&"x".to_string()) && path.contains(&"y".to_string()));
    }

    #[test]
    fn transitive_cycle_detected() {
        let err =
            detect_cycle(&deps(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])])).unwrap_err();
        let LinkError::RuleCycle { path } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn self_reference_detected() {
        let err = detect_cycle(&deps(&[("a", &["a"])])).unwrap_err();
        let LinkError::RuleCycle { path } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(path, vec!["a".to_string(), "a".to_string()]);
    }

    #[test]
    fn dag_and_dangling_refs_pass() {
        detect_cycle(&deps(&[
            ("a", &["b", "c"]),
            ("b", &["c"]),
            ("c", &["never_defined"]),
        ]))
        .unwrap();
    }

    #[test]
    fn links_leaf_and_validates_params() {
        let registry = registry();
        let manifest = Manifest::new("users")
            .with_rule("adult", LogicNode::leaf("is_adult", json!({"min_age": 21})));
        let linked =
            link_manifest(&manifest, &registry, |id| PredicateHandle::tombstone("users", id))
                .unwrap();
        let tree = &linked["adult"];
        assert!(tree.eval(&User { age: 22 }).unwrap());
        assert!(!tree.eval(&User { age: 20 }).unwrap());
    }

    #[test]
    fn unknown_rule_def_fails_link() {
        let registry = registry();
        let manifest =
            Manifest::new("users").with_rule("x", LogicNode::leaf("no_such_rule", json!(null)));
        let err = link_manifest(&manifest, &registry, |id| {
            PredicateHandle::tombstone("users", id)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            PredyError::Registry(RegistryError::UnknownRule { .. })
        ));
    }

    #[test]
    fn bad_params_fail_link() {
        let registry = registry();
        let manifest = Manifest::new("users")
            .with_rule("x", LogicNode::leaf("is_adult", json!({"min_age": "old"})));
        let err = link_manifest(&manifest, &registry, |id| {
            PredicateHandle::tombstone("users", id)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            PredyError::Param(ParamError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn undersized_nary_fails_link() {
        let registry = registry();
        let manifest = Manifest::new("users").with_rule(
            "x",
            LogicNode::and([LogicNode::leaf("is_adult", json!(null))]),
        );
        let err = link_manifest(&manifest, &registry, |id| {
            PredicateHandle::tombstone("users", id)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            PredyError::Link(LinkError::ManifestValidation { .. })
        ));
    }

    #[test]
    fn refs_link_through_supplied_handles() {
        let registry = registry();
        let manifest = Manifest::new("users").with_rule(
            "either",
            LogicNode::or([LogicNode::reference("a"), LogicNode::reference("b")]),
        );
        let mut requested = Vec::new();
        link_manifest(&manifest, &registry, |id| {
            requested.push(id.to_string());
            PredicateHandle::tombstone("users", id)
        })
        .unwrap();
        assert_eq!(requested, vec!["a".to_string(), "b".to_string()]);
    }
}

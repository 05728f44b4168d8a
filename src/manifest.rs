//! Declarative rule manifests and their JSON wire format.
//!
//! A manifest is plain data: a named registry plus a mapping from rule id
//! to a [`LogicNode`] tree. Manifests can be deserialized from JSON
//! (validated through [`crate::schema::SchemaGenerator`]) or built
//! programmatically with the constructors below, then submitted to
//! [`crate::engine::RuleEngine::update_manifests`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Logic nodes
// ---------------------------------------------------------------------------

/// Parameters for one leaf: the rule definition name plus its bound values.
///
/// On the wire the parameters sit beside `rule_def_name` in the same object;
/// unknown names are rejected during schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub rule_def_name: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

/// One node of a declarative rule tree, discriminated by `node_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "lowercase")]
pub enum LogicNode {
    /// Atomic node: evaluate one rule definition with bound parameters.
    Leaf { rule: RuleConfig },
    /// All rules must pass. N-ary; at least two children.
    And { rules: Vec<LogicNode> },
    /// Any rule must pass. N-ary; at least two children.
    Or { rules: Vec<LogicNode> },
    /// The rule must fail.
    Not { rule: Box<LogicNode> },
    /// Reference another rule id in the same registry.
    Ref { ref_id: String },
}

impl LogicNode {
    /// A leaf node. `params` must be a JSON object (or `null` for none);
    /// anything else is caught by schema validation.
    pub fn leaf(rule_def_name: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self::Leaf {
            rule: RuleConfig {
                rule_def_name: rule_def_name.into(),
                params,
            },
        }
    }

    pub fn and(rules: impl IntoIterator<Item = LogicNode>) -> Self {
        Self::And {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn or(rules: impl IntoIterator<Item = LogicNode>) -> Self {
        Self::Or {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn not(rule: LogicNode) -> Self {
        Self::Not {
            rule: Box::new(rule),
        }
    }

    pub fn reference(ref_id: impl Into<String>) -> Self {
        Self::Ref {
            ref_id: ref_id.into(),
        }
    }
}

/// Iteratively collect every `ref_id` a tree mentions, left to right.
pub(crate) fn collect_refs(node: &LogicNode) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        match current {
            LogicNode::Ref { ref_id } => refs.push(ref_id.as_str()),
            LogicNode::And { rules } | LogicNode::Or { rules } => {
                stack.extend(rules.iter().rev());
            }
            LogicNode::Not { rule } => stack.push(rule),
            LogicNode::Leaf { .. } => {}
        }
    }
    refs
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A declarative rule set for one registry: rule id → logic tree.
///
/// Rule ids sort deterministically (`BTreeMap`), which keeps linking and
/// handle installation order stable across updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Name of the registry the rule definitions resolve against.
    pub registry: String,
    /// The rule trees, keyed by rule id.
    #[serde(default)]
    pub rules: BTreeMap<String, LogicNode>,
}

impl Manifest {
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            rules: BTreeMap::new(),
        }
    }

    /// Add a rule tree under an id, replacing any previous entry.
    pub fn with_rule(mut self, rule_id: impl Into<String>, node: LogicNode) -> Self {
        self.rules.insert(rule_id.into(), node);
        self
    }
}

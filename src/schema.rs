//! Registry-derived manifest validation.
//!
//! A [`SchemaGenerator`] derives a validating parser from a registry's
//! declared rule definitions: the parser accepts exactly the manifests whose
//! leaves name registered definitions with well-typed parameters. The engine
//! assumes manifests passed this validation; programmatically constructed
//! manifests are re-checked at link time anyway.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{LinkError, PredyResult};
use crate::manifest::{LogicNode, Manifest};
use crate::params::bind_params;
use crate::registry::Registry;

/// Derives manifest validation from a registry.
pub struct SchemaGenerator<C> {
    registry: Arc<Registry<C>>,
}

impl<C> SchemaGenerator<C> {
    pub fn new(registry: Arc<Registry<C>>) -> Self {
        Self { registry }
    }

    /// A parser validating manifests against the registry's current
    /// definitions. Definitions registered later are visible to the same
    /// parser, since registries only accumulate.
    pub fn generate(&self) -> ManifestParser<C> {
        ManifestParser {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// A validated path from JSON text to a [`Manifest`].
pub struct ManifestParser<C> {
    registry: Arc<Registry<C>>,
}

impl<C> ManifestParser<C> {
    fn invalid(&self, message: impl Into<String>) -> LinkError {
        LinkError::ManifestValidation {
            registry: self.registry.name().to_string(),
            message: message.into(),
        }
    }

    /// Parse and validate a JSON document.
    pub fn parse_str(&self, json: &str) -> PredyResult<Manifest> {
        let manifest: Manifest =
            serde_json::from_str(json).map_err(|e| self.invalid(e.to_string()))?;
        self.validate(&manifest)?;
        Ok(manifest)
    }

    /// Parse and validate an in-memory JSON value.
    pub fn parse_value(&self, value: Value) -> PredyResult<Manifest> {
        let manifest: Manifest =
            serde_json::from_value(value).map_err(|e| self.invalid(e.to_string()))?;
        self.validate(&manifest)?;
        Ok(manifest)
    }

    /// Validate an already-parsed manifest:
    /// - `registry` must equal this parser's registry name;
    /// - every leaf's `rule_def_name` must be registered, with parameters
    ///   binding cleanly against its schema (defaults applied);
    /// - `and`/`or` nodes carry at least two children;
    /// - `ref` ids are non-empty.
    pub fn validate(&self, manifest: &Manifest) -> PredyResult<()> {
        if manifest.registry != self.registry.name() {
            return Err(self
                .invalid(format!(
                    "manifest names registry '{}', expected '{}'",
                    manifest.registry,
                    self.registry.name()
                ))
                .into());
        }

        for (rule_id, root) in &manifest.rules {
            if rule_id.is_empty() {
                return Err(self.invalid("rule id must be non-empty").into());
            }
            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                match node {
                    LogicNode::Leaf { rule } => {
                        let def = self.registry.get(&rule.rule_def_name)?;
                        bind_params(&rule.rule_def_name, def.params(), &rule.params)?;
                    }
                    LogicNode::And { rules } | LogicNode::Or { rules } => {
                        if rules.len() < 2 {
                            return Err(self
                                .invalid(format!(
                                    "rule '{rule_id}': n-ary node requires at least 2 \
                                     children, got {}",
                                    rules.len()
                                ))
                                .into());
                        }
                        stack.extend(rules.iter().rev());
                    }
                    LogicNode::Not { rule } => stack.push(rule),
                    LogicNode::Ref { ref_id } => {
                        if ref_id.is_empty() {
                            return Err(self
                                .invalid(format!("rule '{rule_id}': ref_id must be non-empty"))
                                .into());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

//! Rule definitions, named registries, and the registry manager.
//!
//! A [`RuleDef`] pairs an atomic predicate callable with its declared
//! parameter schema. A [`Registry`] collects definitions for one context
//! type under stable names; registering returns a [`RuleProducer`] that
//! binds concrete parameters into leaf predicates. The [`RegistryManager`]
//! is the sole resolution surface the engine uses at link time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{ParamError, PredyResult, RegistryError};
use crate::params::{bind_params, json_type_name, BoundParams, ParamSpec};
use crate::predicate::Predicate;

// ---------------------------------------------------------------------------
// Rule definitions
// ---------------------------------------------------------------------------

/// A registered atomic predicate: callable, parameter schema, name, docs.
///
/// Immutable once registered. The callable's first input is the context;
/// its second is the validated parameter map bound at leaf construction.
pub struct RuleDef<C> {
    name: String,
    doc: Option<String>,
    params: Vec<ParamSpec>,
    func: Arc<dyn Fn(&C, &BoundParams) -> bool + Send + Sync>,
}

impl<C> RuleDef<C> {
    /// Create a definition with an empty parameter schema.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&C, &BoundParams) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: None,
            params: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Attach documentation, surfaced through [`RuleDef::doc`].
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declare a parameter. Order of declaration is preserved.
    pub fn with_param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn invoke(&self, ctx: &C, params: &BoundParams) -> bool {
        (self.func)(ctx, params)
    }
}

impl<C> fmt::Debug for RuleDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDef")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Producers
// ---------------------------------------------------------------------------

/// Binds concrete parameters against a rule definition, producing leaves.
///
/// Returned by [`Registry::register`] and [`Registry::producer`]; clones
/// share the underlying definition.
pub struct RuleProducer<C> {
    def: Arc<RuleDef<C>>,
}

impl<C> Clone for RuleProducer<C> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
        }
    }
}

impl<C> fmt::Debug for RuleProducer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleProducer")
            .field("name", &self.def.name)
            .finish()
    }
}

impl<C> RuleProducer<C> {
    pub(crate) fn new(def: Arc<RuleDef<C>>) -> Self {
        Self { def }
    }

    /// Bind parameters (a JSON object, e.g. via `serde_json::json!`) into a
    /// leaf predicate. Validates against the declared schema: missing
    /// required, unknown, or ill-typed parameters are rejected.
    pub fn bind(&self, params: Value) -> PredyResult<Predicate<C>> {
        let supplied = match params {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(ParamError::NotAnObject {
                    rule: self.def.name.clone(),
                    actual: json_type_name(&other),
                }
                .into());
            }
        };
        let bound = bind_params(&self.def.name, &self.def.params, &supplied)?;
        Ok(Predicate::leaf(Arc::clone(&self.def), bound))
    }

    pub fn def(&self) -> &Arc<RuleDef<C>> {
        &self.def
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".into(),
        });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "name contains whitespace".into(),
        });
    }
    Ok(())
}

/// A named collection of rule definitions for one context type.
///
/// Definitions accumulate monotonically; there is no removal once the
/// engine is live. Iteration order is stable (sorted by name).
pub struct Registry<C> {
    name: String,
    defs: RwLock<BTreeMap<String, Arc<RuleDef<C>>>>,
}

impl<C> Registry<C> {
    pub fn new(name: impl Into<String>) -> PredyResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            defs: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a definition. Errors on duplicate or invalid names.
    pub fn register(&self, def: RuleDef<C>) -> PredyResult<RuleProducer<C>> {
        validate_name(&def.name)?;
        let mut defs = self.defs.write().expect("registry lock poisoned");
        if defs.contains_key(&def.name) {
            return Err(RegistryError::DuplicateRule {
                registry: self.name.clone(),
                rule: def.name.clone(),
            }
            .into());
        }
        let def = Arc::new(def);
        defs.insert(def.name.clone(), Arc::clone(&def));
        Ok(RuleProducer::new(def))
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> PredyResult<Arc<RuleDef<C>>> {
        self.defs
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| {
                RegistryError::UnknownRule {
                    registry: self.name.clone(),
                    rule: name.to_string(),
                }
                .into()
            })
    }

    /// A producer for an already-registered definition.
    pub fn producer(&self, name: &str) -> PredyResult<RuleProducer<C>> {
        Ok(RuleProducer::new(self.get(name)?))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    /// Snapshot of `(name, def)` pairs in stable (sorted) order.
    pub fn entries(&self) -> Vec<(String, Arc<RuleDef<C>>)> {
        self.defs
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.defs.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("count", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry manager
// ---------------------------------------------------------------------------

/// Maps registry name → registry. The engine's sole resolution surface.
pub struct RegistryManager<C> {
    registries: DashMap<String, Arc<Registry<C>>>,
}

impl<C> RegistryManager<C> {
    pub fn new() -> Self {
        Self {
            registries: DashMap::new(),
        }
    }

    /// Add a registry. Errors if the name is already managed.
    pub fn add(&self, registry: Arc<Registry<C>>) -> PredyResult<()> {
        match self.registries.entry(registry.name().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RegistryError::DuplicateRegistry {
                name: registry.name().to_string(),
            }
            .into()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(registry);
                Ok(())
            }
        }
    }

    /// Resolve a registry by name.
    pub fn get(&self, name: &str) -> PredyResult<Arc<Registry<C>>> {
        self.registries
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| {
                RegistryError::UnknownRegistry {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

impl<C> Default for RegistryManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RegistryManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryManager")
            .field("count", &self.registries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredyError;
    use serde_json::json;

    struct User {
        age: i64,
        active: bool,
    }

    fn user_registry() -> Registry<User> {
        let registry = Registry::new("user_registry").unwrap();
        registry
            .register(
                RuleDef::new("is_adult", |u: &User, p: &BoundParams| {
                    u.age >= p.int("min_age")
                })
                .with_doc("Check if the user is at least `min_age` years old.")
                .with_param(ParamSpec::int("min_age").with_default(18)),
            )
            .unwrap();
        registry
            .register(RuleDef::new("is_active", |u: &User, _: &BoundParams| {
                u.active
            }))
            .unwrap();
        registry
    }

    #[test]
    fn register_and_bind() {
        let registry = user_registry();
        let is_adult = registry.producer("is_adult").unwrap();

        let default_age = is_adult.bind(json!({})).unwrap();
        assert!(default_age.eval(&User { age: 18, active: true }).unwrap());

        let strict = is_adult.bind(json!({"min_age": 21})).unwrap();
        assert!(!strict.eval(&User { age: 18, active: true }).unwrap());
    }

    #[test]
    fn duplicate_rule_rejected() {
        let registry = user_registry();
        let err = registry
            .register(RuleDef::new("is_adult", |_: &User, _: &BoundParams| true))
            .unwrap_err();
        assert!(matches!(
            err,
            PredyError::Registry(RegistryError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let registry = user_registry();
        for bad in ["", "has space", "tab\tname"] {
            let err = registry
                .register(RuleDef::new(bad, |_: &User, _: &BoundParams| true))
                .unwrap_err();
            assert!(matches!(
                err,
                PredyError::Registry(RegistryError::InvalidName { .. })
            ));
        }
        assert!(Registry::<User>::new("").is_err());
    }

    #[test]
    fn unknown_rule_lookup() {
        let registry = user_registry();
        assert!(registry.contains("is_adult"));
        assert!(!registry.contains("missing"));
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(
            err,
            PredyError::Registry(RegistryError::UnknownRule { .. })
        ));
    }

    #[test]
    fn iteration_is_stable_and_sorted() {
        let registry = user_registry();
        let names: Vec<String> = registry.entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["is_active", "is_adult"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn bind_rejects_non_object_params() {
        let registry = user_registry();
        let is_adult = registry.producer("is_adult").unwrap();
        let err = is_adult.bind(json!([1, 2])).unwrap_err();
        assert!(matches!(
            err,
            PredyError::Param(ParamError::NotAnObject { .. })
        ));
    }

    #[test]
    fn manager_add_and_get() {
        let manager = RegistryManager::new();
        manager.add(Arc::new(user_registry())).unwrap();
        assert_eq!(manager.get("user_registry").unwrap().name(), "user_registry");

        let err = manager.add(Arc::new(user_registry())).unwrap_err();
        assert!(matches!(
            err,
            PredyError::Registry(RegistryError::DuplicateRegistry { .. })
        ));

        let err = manager.get("missing").unwrap_err();
        assert!(matches!(
            err,
            PredyError::Registry(RegistryError::UnknownRegistry { .. })
        ));
    }
}

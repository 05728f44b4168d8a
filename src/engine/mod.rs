//! The rule engine: manifest updates, the handle table, and hot reload.
//!
//! The engine owns one [`PredicateHandle`] per `(registry, rule_id)` for its
//! whole lifetime and the live linked trees behind them. Manifest updates
//! are staged completely — link, cycle-check, compile — before any handle
//! is touched, then committed by swapping each handle's inner program in
//! deterministic order under the engine's write lock. Readers never take
//! that lock: dereferencing a handle is a single atomic load.

pub(crate) mod handle;
pub(crate) mod link;

pub use handle::PredicateHandle;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::PredyResult;
use crate::manifest::{collect_refs, Manifest};
use crate::predicate::compile::Program;
use crate::predicate::Predicate;
use crate::registry::RegistryManager;

/// Writer-side state, guarded by the engine lock.
struct EngineState<C> {
    /// Per registry: rule id → referenced rule ids. The cumulative view
    /// cycle detection runs against, persisted across updates.
    deps: HashMap<String, BTreeMap<String, Vec<String>>>,
    /// Per registry: rule id → the live linked tree.
    linked: HashMap<String, BTreeMap<String, Predicate<C>>>,
}

/// One staged registry update, fully linked and compiled but not committed.
struct Staged<C> {
    registry: String,
    rules: BTreeMap<String, (Predicate<C>, Arc<Program<C>>)>,
    deps: BTreeMap<String, Vec<String>>,
}

/// Embedded rule engine over contexts of type `C`.
pub struct RuleEngine<C> {
    registries: Arc<RegistryManager<C>>,
    handles: DashMap<(String, String), PredicateHandle<C>>,
    state: Mutex<EngineState<C>>,
}

impl<C> RuleEngine<C> {
    pub fn new(registries: Arc<RegistryManager<C>>) -> Self {
        Self {
            registries,
            handles: DashMap::new(),
            state: Mutex::new(EngineState {
                deps: HashMap::new(),
                linked: HashMap::new(),
            }),
        }
    }

    pub fn registry_manager(&self) -> &Arc<RegistryManager<C>> {
        &self.registries
    }

    /// The handle for `(registry, rule_id)`, created as a tombstone if this
    /// is the first request. Repeated calls return the same handle object
    /// for the life of the engine; concurrent first requests race through
    /// the map's entry lock and exactly one tombstone wins.
    pub fn get_predicate_handle(&self, registry: &str, rule_id: &str) -> PredicateHandle<C> {
        self.handles
            .entry((registry.to_string(), rule_id.to_string()))
            .or_insert_with(|| PredicateHandle::tombstone(registry, rule_id))
            .clone()
    }

    /// Install one or more manifests, atomically per registry.
    ///
    /// Every manifest is linked against its registry, cycle-checked against
    /// that registry's cumulative reference graph, and compiled *before* any
    /// handle is swapped; an error anywhere leaves the engine unchanged.
    /// Registries not named by any manifest are untouched.
    pub fn update_manifests(&self, manifests: &[Manifest]) -> PredyResult<()> {
        let mut state = self.state.lock().expect("engine lock poisoned");

        // Stage phase: no observable effect on handles.
        let mut staged: Vec<Staged<C>> = Vec::new();
        let mut pending_deps: HashMap<String, BTreeMap<String, Vec<String>>> = HashMap::new();

        for manifest in manifests {
            let registry = self.registries.get(&manifest.registry)?;
            let linked = link::link_manifest(manifest, &registry, |rule_id| {
                self.get_predicate_handle(&manifest.registry, rule_id)
            })?;

            // Merge this manifest's edges over the committed view plus any
            // earlier manifest staged in this same call.
            let mut merged = state
                .deps
                .get(&manifest.registry)
                .cloned()
                .unwrap_or_default();
            if let Some(earlier) = pending_deps.get(&manifest.registry) {
                merged.extend(earlier.clone());
            }
            let mut new_deps = BTreeMap::new();
            for (rule_id, node) in &manifest.rules {
                let targets: Vec<String> =
                    collect_refs(node).into_iter().map(String::from).collect();
                merged.insert(rule_id.clone(), targets.clone());
                new_deps.insert(rule_id.clone(), targets);
            }
            link::detect_cycle(&merged)?;
            pending_deps
                .entry(manifest.registry.clone())
                .or_default()
                .extend(new_deps.clone());

            let rules = linked
                .into_iter()
                .map(|(rule_id, tree)| {
                    let program = tree.compiled();
                    tracing::debug!(
                        registry = %manifest.registry,
                        rule_id = %rule_id,
                        "compiled rule"
                    );
                    (rule_id, (tree, program))
                })
                .collect();

            staged.push(Staged {
                registry: manifest.registry.clone(),
                rules,
                deps: new_deps,
            });
        }

        // Commit phase: swap handles in deterministic (sorted) order.
        for stage in staged {
            let count = stage.rules.len();
            for (rule_id, (tree, program)) in stage.rules {
                let handle = self.get_predicate_handle(&stage.registry, &rule_id);
                handle.install(program);
                state
                    .linked
                    .entry(stage.registry.clone())
                    .or_default()
                    .insert(rule_id, tree);
            }
            state
                .deps
                .entry(stage.registry.clone())
                .or_default()
                .extend(stage.deps);
            tracing::info!(registry = %stage.registry, rules = count, "installed rule manifest");
        }

        Ok(())
    }

    /// Rule ids currently linked in a registry, in sorted order.
    pub fn rule_ids(&self, registry: &str) -> Vec<String> {
        self.state
            .lock()
            .expect("engine lock poisoned")
            .linked
            .get(registry)
            .map(|rules| rules.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl<C> fmt::Debug for RuleEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("handles", &self.handles.len())
            .finish()
    }
}

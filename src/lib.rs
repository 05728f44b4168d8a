//! # predylogic
//!
//! An embedded, schema-driven predicate logic engine. Atomic predicates are
//! registered against a typed context, composed into boolean trees with
//! `&`/`|`/`!` or declarative JSON manifests, compiled through an N-ary
//! flattening pass, and evaluated with optional execution traces. Live rules
//! hot-reload atomically behind stable handles.
//!
//! ## Architecture
//!
//! - **Predicate AST** (`predicate`): immutable trees, O(1) combinators,
//!   iterative compile and evaluation with no depth limit
//! - **Registry** (`registry`): named rule definitions with parameter schemas
//! - **Manifests** (`manifest`, `schema`): declarative rule sets, validated
//!   against a registry before linking
//! - **Engine** (`engine`): the manifest linker, cycle detection, and the
//!   handle table giving lock-free readers and atomic hot reload
//!
//! ## Library usage
//!
//! ```
//! use std::sync::Arc;
//! use predylogic::engine::RuleEngine;
//! use predylogic::manifest::{LogicNode, Manifest};
//! use predylogic::params::{BoundParams, ParamSpec};
//! use predylogic::registry::{Registry, RegistryManager, RuleDef};
//! use serde_json::json;
//!
//! struct User { age: i64 }
//!
//! let registry = Registry::new("users").unwrap();
//! registry
//!     .register(
//!         RuleDef::new("is_adult", |u: &User, p: &BoundParams| u.age >= p.int("min_age"))
//!             .with_param(ParamSpec::int("min_age").with_default(18)),
//!     )
//!     .unwrap();
//!
//! let manager = Arc::new(RegistryManager::new());
//! manager.add(Arc::new(registry)).unwrap();
//!
//! let engine = RuleEngine::new(manager);
//! engine
//!     .update_manifests(&[Manifest::new("users")
//!         .with_rule("adult_check", LogicNode::leaf("is_adult", json!({"min_age": 21})))])
//!     .unwrap();
//!
//! let handle = engine.get_predicate_handle("users", "adult_check");
//! assert!(handle.eval(&User { age: 30 }).unwrap());
//! assert!(!handle.eval(&User { age: 20 }).unwrap());
//! ```

pub mod engine;
pub mod error;
pub mod manifest;
pub mod params;
pub mod predicate;
pub mod registry;
pub mod schema;

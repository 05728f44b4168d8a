//! Rich diagnostic error types for the predylogic engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know exactly what went wrong and
//! how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the predylogic engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum PredyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),
}

/// Result type for predylogic operations.
pub type PredyResult<T> = std::result::Result<T, PredyError>;

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

/// Errors from registry construction and lookup.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("rule '{rule}' is already registered in registry '{registry}'")]
    #[diagnostic(
        code(predylogic::registry::duplicate_rule),
        help(
            "Rule definition names are unique within a registry and cannot be \
             replaced once registered. Pick a different name, or redefine the \
             rule's behavior through a manifest update instead."
        )
    )]
    DuplicateRule { registry: String, rule: String },

    #[error("registry '{name}' is already managed")]
    #[diagnostic(
        code(predylogic::registry::duplicate_registry),
        help("Each registry name may be added to a RegistryManager exactly once.")
    )]
    DuplicateRegistry { name: String },

    #[error("invalid name '{name}': {reason}")]
    #[diagnostic(
        code(predylogic::registry::invalid_name),
        help("Registry and rule names must be non-empty and contain no whitespace.")
    )]
    InvalidName { name: String, reason: String },

    #[error("registry '{name}' not found")]
    #[diagnostic(
        code(predylogic::registry::unknown_registry),
        help(
            "The registry must be added to the RegistryManager before it can be \
             resolved. Check the manifest's `registry` field for typos."
        )
    )]
    UnknownRegistry { name: String },

    #[error("rule definition '{rule}' not found in registry '{registry}'")]
    #[diagnostic(
        code(predylogic::registry::unknown_rule),
        help(
            "The `rule_def_name` must match a definition registered in the \
             manifest's registry. List the registry to see available names."
        )
    )]
    UnknownRule { registry: String, rule: String },
}

// ---------------------------------------------------------------------------
// Parameter errors
// ---------------------------------------------------------------------------

/// Errors from binding concrete parameters to a rule definition's schema.
#[derive(Debug, Error, Diagnostic)]
pub enum ParamError {
    #[error("rule '{rule}' requires parameter '{param}'")]
    #[diagnostic(
        code(predylogic::params::missing),
        help("Supply the parameter, or declare a default for it in the rule definition.")
    )]
    Missing { rule: String, param: String },

    #[error("rule '{rule}' has no parameter '{param}'")]
    #[diagnostic(
        code(predylogic::params::unknown),
        help("Unknown parameters are rejected. Check the rule definition's declared schema.")
    )]
    Unknown { rule: String, param: String },

    #[error("parameter '{param}' of rule '{rule}' expects {expected}, got {actual}")]
    #[diagnostic(
        code(predylogic::params::type_mismatch),
        help("The supplied value's JSON type must match the declared parameter kind.")
    )]
    TypeMismatch {
        rule: String,
        param: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("parameters for rule '{rule}' must be a JSON object, got {actual}")]
    #[diagnostic(
        code(predylogic::params::not_an_object),
        help("Pass a JSON object mapping parameter names to values, e.g. json!({{\"min_age\": 21}}).")
    )]
    NotAnObject { rule: String, actual: &'static str },
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// Errors from linking a manifest against a registry.
#[derive(Debug, Error, Diagnostic)]
pub enum LinkError {
    #[error("rule reference cycle: {}", path.join(" -> "))]
    #[diagnostic(
        code(predylogic::link::rule_cycle),
        help(
            "Evaluation is strict, so a cycle of `ref` nodes would loop forever. \
             Break the cycle by removing one of the references. Note that the \
             cycle may span multiple manifest updates of the same registry."
        )
    )]
    RuleCycle { path: Vec<String> },

    #[error("manifest for registry '{registry}' is invalid: {message}")]
    #[diagnostic(
        code(predylogic::link::manifest_validation),
        help("Validate manifests with SchemaGenerator::generate() before submitting them.")
    )]
    ManifestValidation { registry: String, message: String },
}

// ---------------------------------------------------------------------------
// Evaluation errors
// ---------------------------------------------------------------------------

/// Errors raised while evaluating a predicate.
#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    #[error("rule '{rule_id}' in registry '{registry}' is not resolved")]
    #[diagnostic(
        code(predylogic::eval::unresolved_rule),
        help(
            "The handle is a tombstone: no manifest update has supplied this rule \
             yet. Submit a manifest defining it, then invoke the same handle again."
        )
    )]
    UnresolvedRule { registry: String, rule_id: String },
}

/// Result type for predicate evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_path_renders_with_arrows() {
        let err = LinkError::RuleCycle {
            path: vec!["x".into(), "y".into(), "x".into()],
        };
        assert_eq!(format!("{err}"), "rule reference cycle: x -> y -> x");
    }

    #[test]
    fn top_level_wraps_transparently() {
        let err: PredyError = RegistryError::UnknownRegistry {
            name: "orders".into(),
        }
        .into();
        assert_eq!(format!("{err}"), "registry 'orders' not found");
    }
}

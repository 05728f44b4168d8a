//! Parameter schemas for rule definitions and bind-time validation.
//!
//! A rule definition declares an ordered list of [`ParamSpec`]s. Binding
//! concrete values against that schema produces a [`BoundParams`] map after
//! rejecting missing required parameters, unknown parameters, and type
//! mismatches, and filling in declared defaults.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::ParamError;

// ---------------------------------------------------------------------------
// Parameter kinds
// ---------------------------------------------------------------------------

/// The declared type of a rule parameter.
///
/// `Json` accepts any value and is the escape hatch for structured
/// parameters; the other kinds are checked against the supplied JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    Json,
}

impl ParamKind {
    /// Human-readable name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Json => "json",
        }
    }

    /// Whether a JSON value is acceptable for this kind.
    ///
    /// Integers are accepted where a float is declared; the reverse is not.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Str => value.is_string(),
            Self::Json => true,
        }
    }
}

/// Describe the JSON type of a value, used in diagnostics.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Parameter specs
// ---------------------------------------------------------------------------

/// One declared parameter of a rule definition: name, kind, optional default.
///
/// A parameter is required exactly when it has no default.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl ParamSpec {
    /// Create a required parameter of the given kind.
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Str)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Json)
    }

    /// Attach a default value, making the parameter optional.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether the parameter must be supplied at bind time.
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

// ---------------------------------------------------------------------------
// Bound parameters
// ---------------------------------------------------------------------------

/// Validated name → value map attached to a leaf node.
///
/// Produced only by [`bind_params`], so every declared parameter is present
/// and well-typed by the time a rule body sees it. The typed accessors rely
/// on that invariant and panic on undeclared names or kinds, which is a
/// programming error in the rule body, not a runtime condition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoundParams(BTreeMap<String, Value>);

impl BoundParams {
    /// Empty parameter set, used by standalone predicates.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Typed accessor for a declared `bool` parameter.
    ///
    /// # Panics
    /// If the parameter was not declared as `bool` in the rule's schema.
    pub fn bool(&self, name: &str) -> bool {
        match self.0.get(name) {
            Some(Value::Bool(b)) => *b,
            other => panic!("parameter '{name}' is not a bound bool (got {other:?})"),
        }
    }

    /// Typed accessor for a declared `int` parameter.
    ///
    /// # Panics
    /// If the parameter was not declared as `int` in the rule's schema.
    pub fn int(&self, name: &str) -> i64 {
        match self.0.get(name).and_then(Value::as_i64) {
            Some(i) => i,
            None => panic!("parameter '{name}' is not a bound int"),
        }
    }

    /// Typed accessor for a declared `float` parameter.
    ///
    /// # Panics
    /// If the parameter was not declared as `float` in the rule's schema.
    pub fn float(&self, name: &str) -> f64 {
        match self.0.get(name).and_then(Value::as_f64) {
            Some(f) => f,
            None => panic!("parameter '{name}' is not a bound float"),
        }
    }

    /// Typed accessor for a declared `string` parameter.
    ///
    /// # Panics
    /// If the parameter was not declared as `string` in the rule's schema.
    pub fn str(&self, name: &str) -> &str {
        match self.0.get(name).and_then(Value::as_str) {
            Some(s) => s,
            None => panic!("parameter '{name}' is not a bound string"),
        }
    }
}

impl fmt::Display for BoundParams {
    /// Renders `key=value` pairs in declaration-independent sorted order,
    /// e.g. `min_age=21, role="admin"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Validate `supplied` against `schema` and produce the bound map.
///
/// Unknown names are rejected, missing required names are rejected, declared
/// defaults fill in absent optional names, and each value is checked against
/// the declared kind.
pub fn bind_params(
    rule: &str,
    schema: &[ParamSpec],
    supplied: &serde_json::Map<String, Value>,
) -> Result<BoundParams, ParamError> {
    for name in supplied.keys() {
        if !schema.iter().any(|spec| spec.name == *name) {
            return Err(ParamError::Unknown {
                rule: rule.to_string(),
                param: name.clone(),
            });
        }
    }

    let mut bound = BTreeMap::new();
    for spec in schema {
        let value = match supplied.get(&spec.name) {
            Some(v) => v.clone(),
            None => match &spec.default {
                Some(d) => d.clone(),
                None => {
                    return Err(ParamError::Missing {
                        rule: rule.to_string(),
                        param: spec.name.clone(),
                    });
                }
            },
        };
        if !spec.kind.accepts(&value) {
            return Err(ParamError::TypeMismatch {
                rule: rule.to_string(),
                param: spec.name.clone(),
                expected: spec.kind.name(),
                actual: json_type_name(&value),
            });
        }
        bound.insert(spec.name.clone(), value);
    }

    Ok(BoundParams(bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("min_age").with_default(18),
            ParamSpec::string("role"),
        ]
    }

    fn supplied(v: Value) -> serde_json::Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn binds_with_defaults() {
        let bound = bind_params("r", &schema(), &supplied(json!({"role": "admin"}))).unwrap();
        assert_eq!(bound.int("min_age"), 18);
        assert_eq!(bound.str("role"), "admin");
    }

    #[test]
    fn explicit_value_overrides_default() {
        let bound = bind_params(
            "r",
            &schema(),
            &supplied(json!({"min_age": 21, "role": "admin"})),
        )
        .unwrap();
        assert_eq!(bound.int("min_age"), 21);
    }

    #[test]
    fn missing_required_rejected() {
        let err = bind_params("r", &schema(), &supplied(json!({}))).unwrap_err();
        assert!(matches!(err, ParamError::Missing { param, .. } if param == "role"));
    }

    #[test]
    fn unknown_param_rejected() {
        let err = bind_params(
            "r",
            &schema(),
            &supplied(json!({"role": "admin", "extra": 1})),
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::Unknown { param, .. } if param == "extra"));
    }

    #[test]
    fn type_mismatch_rejected() {
        let err = bind_params("r", &schema(), &supplied(json!({"role": 5}))).unwrap_err();
        assert!(matches!(
            err,
            ParamError::TypeMismatch {
                expected: "string",
                actual: "number",
                ..
            }
        ));
    }

    #[test]
    fn int_accepted_for_float_kind() {
        let schema = vec![ParamSpec::float("threshold")];
        let bound = bind_params("r", &schema, &supplied(json!({"threshold": 3}))).unwrap();
        assert_eq!(bound.float("threshold"), 3.0);
    }

    #[test]
    fn display_is_sorted_key_value() {
        let bound = bind_params(
            "r",
            &schema(),
            &supplied(json!({"min_age": 21, "role": "admin"})),
        )
        .unwrap();
        assert_eq!(format!("{bound}"), r#"min_age=21, role="admin""#);
    }
}

//! Bound statements and parameter-binding descriptors.

use crate::types::SqlType;
use crate::value::Value;
use std::collections::HashMap;

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterMode {
    /// Plain input value (the default)
    #[default]
    In,
    /// Stored-procedure output slot
    Out,
    /// Stored-procedure in/out slot
    InOut,
}

impl ParameterMode {
    /// Does this binding carry a value into the statement?
    pub const fn is_input(&self) -> bool {
        matches!(self, ParameterMode::In | ParameterMode::InOut)
    }

    /// Does this binding receive a value back from the statement?
    pub const fn is_output(&self) -> bool {
        matches!(self, ParameterMode::Out | ParameterMode::InOut)
    }
}

/// One positional binding left behind by placeholder substitution.
///
/// Bindings appear in the order of the positional markers in the final SQL
/// text, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    /// Property path resolved against the parameter object (or the
    /// additional-bindings side table, which is checked first)
    property: String,
    /// Binding direction
    mode: ParameterMode,
    /// Declared wire type, if any
    sql_type: Option<SqlType>,
}

impl ParameterBinding {
    /// Create a plain input binding.
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mode: ParameterMode::In,
            sql_type: None,
        }
    }

    /// Set the binding direction.
    #[must_use]
    pub fn mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the declared wire type.
    #[must_use]
    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// The property path this binding resolves.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The binding direction.
    pub fn parameter_mode(&self) -> ParameterMode {
        self.mode
    }

    /// The declared wire type, if any.
    pub fn declared_type(&self) -> Option<SqlType> {
        self.sql_type
    }
}

/// A fully resolved statement: final SQL text with positional markers plus
/// the ordered bindings matching them.
///
/// Immutable once built, except for the additional-bindings side table,
/// which dynamic evaluation (loop-generated entries, `bind` nodes) appends
/// to before first use.
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    bindings: Vec<ParameterBinding>,
    additional: HashMap<String, Value>,
}

impl BoundSql {
    /// Create a bound statement from final text and ordered bindings.
    pub fn new(sql: impl Into<String>, bindings: Vec<ParameterBinding>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            additional: HashMap::new(),
        }
    }

    /// The final SQL text with positional markers.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The ordered parameter bindings.
    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    /// Record a binding produced during dynamic evaluation.
    pub fn set_additional(&mut self, name: impl Into<String>, value: Value) {
        self.additional.insert(name.into(), value);
    }

    /// Is there an additional binding whose name is the root of this path?
    ///
    /// Loop-generated entries are stored under synthetic root names; a
    /// property such as `item_0.name` resolves through the `item_0` entry.
    pub fn has_additional(&self, property: &str) -> bool {
        let (root, _) = crate::property::split_root(property);
        self.additional.contains_key(root)
    }

    /// Look up an additional binding by its exact name.
    pub fn additional(&self, name: &str) -> Option<&Value> {
        self.additional.get(name)
    }

    /// Resolve a binding's property path to its runtime value.
    ///
    /// The additional-bindings side table is checked first; otherwise a
    /// scalar parameter object is used whole, and a property bag is
    /// resolved by path. Missing properties bind as null.
    pub fn resolve_binding(&self, parameter: &Value, property: &str) -> Value {
        let (root, rest) = crate::property::split_root(property);
        if let Some(base) = self.additional.get(root) {
            if rest.is_empty() {
                return base.clone();
            }
            return crate::property::get_path(base, rest).unwrap_or(Value::Null);
        }
        if parameter.is_null() {
            Value::Null
        } else if parameter.is_scalar() {
            parameter.clone()
        } else {
            crate::property::get_path(parameter, property).unwrap_or(Value::Null)
        }
    }

    /// Does any binding declare an output direction?
    pub fn has_output_bindings(&self) -> bool {
        self.bindings.iter().any(|b| b.parameter_mode().is_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_mode_directions() {
        assert!(ParameterMode::In.is_input());
        assert!(!ParameterMode::In.is_output());
        assert!(ParameterMode::Out.is_output());
        assert!(!ParameterMode::Out.is_input());
        assert!(ParameterMode::InOut.is_input());
        assert!(ParameterMode::InOut.is_output());
    }

    #[test]
    fn binding_builder() {
        let binding = ParameterBinding::new("user.id")
            .mode(ParameterMode::InOut)
            .sql_type(SqlType::BigInt);
        assert_eq!(binding.property(), "user.id");
        assert_eq!(binding.parameter_mode(), ParameterMode::InOut);
        assert_eq!(binding.declared_type(), Some(SqlType::BigInt));
    }

    #[test]
    fn additional_bindings_side_table() {
        let mut bound = BoundSql::new("SELECT 1", vec![]);
        assert!(!bound.has_additional("item_0"));
        bound.set_additional("item_0", Value::Int(9));
        assert!(bound.has_additional("item_0"));
        assert_eq!(bound.additional("item_0"), Some(&Value::Int(9)));
    }

    #[test]
    fn resolve_binding_prefers_additional_entries() {
        use crate::value::map;

        let mut bound = BoundSql::new("SELECT 1", vec![]);
        bound.set_additional("item_1", map([("id", Value::Int(3))]));

        let parameter = map([("id", Value::Int(99)), ("name", Value::from("Ada"))]);
        assert_eq!(
            bound.resolve_binding(&parameter, "item_1.id"),
            Value::Int(3)
        );
        assert_eq!(bound.resolve_binding(&parameter, "name"), Value::from("Ada"));
        assert_eq!(bound.resolve_binding(&parameter, "missing"), Value::Null);
        assert!(bound.has_additional("item_1.id"));
    }

    #[test]
    fn resolve_binding_uses_scalar_parameter_whole() {
        let bound = BoundSql::new("SELECT 1", vec![ParameterBinding::new("id")]);
        assert_eq!(
            bound.resolve_binding(&Value::BigInt(42), "id"),
            Value::BigInt(42)
        );
        assert_eq!(bound.resolve_binding(&Value::Null, "id"), Value::Null);
    }

    #[test]
    fn output_binding_detection() {
        let bound = BoundSql::new(
            "CALL count_rows(?, ?)",
            vec![
                ParameterBinding::new("table"),
                ParameterBinding::new("count").mode(ParameterMode::Out),
            ],
        );
        assert!(bound.has_output_bindings());

        let plain = BoundSql::new("SELECT 1", vec![ParameterBinding::new("id")]);
        assert!(!plain.has_output_bindings());
    }
}

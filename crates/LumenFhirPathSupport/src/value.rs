//! The runtime value model.
//!
//! Evaluation operates on ordered collections of [`BoxedValue`]s. A boxed
//! value is a raw [`Value`] paired with optional [`TypeInfo`] (attached by
//! the model provider or by literal construction) and an optional
//! primitive-element sidecar (the FHIR `_name` companion object), so that
//! navigating from a primitive to `.extension` still works.
//!
//! Raw values mirror the JSON document tree they were built from, widened
//! with the value kinds the language itself produces: precision dates and
//! times, arbitrary-precision decimals, and quantities.
//!
//! # Equality
//!
//! `PartialEq`/`Hash` here are *structural*: cross-variant comparisons are
//! `false`, decimals are normalized (`1.0 == 1.00`), object key order is
//! irrelevant, and collections compare in order. The language's `=`
//! operator, which additionally coerces across numeric variants, lives in
//! the interpreter; structural equality is what union and `distinct()`
//! deduplicate with.

use crate::date_time::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::type_info::TypeInfo;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A raw value in the document tree or produced by evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    /// JSON `null`. Filtered out at navigation boundaries; only observable
    /// inside raw arrays that carry primitive-element sidecars.
    Null,
    Boolean(bool),
    /// Whole number. JSON integers land here.
    Integer(i64),
    /// Explicit 64-bit integer, distinct from `Integer` for the type
    /// system's `Long` primitive.
    Long(i64),
    /// Arbitrary-precision decimal. JSON non-integer numbers land here.
    Decimal(Decimal),
    String(String),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
    /// A measured value with a UCUM or calendar unit.
    Quantity { value: Decimal, unit: String },
    /// A raw JSON array. Spread into individual items at navigation
    /// boundaries; never observed by operators.
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Convert a JSON document into a raw value tree.
    ///
    /// Integers stay integral; every other number becomes a [`Decimal`]
    /// parsed from its source text, so no precision is lost to `f64`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Decimal::from_str(&n.to_string())
                    .map(Value::Decimal)
                    .unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON. Dates, times, and datetimes render as their
    /// literal text; quantities become `{value, unit}` objects.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) | Value::Long(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => {
                let normalized = d.normalize();
                match serde_json::Number::from_str(&normalized.to_string()) {
                    Ok(n) => serde_json::Value::Number(n),
                    Err(_) => serde_json::Value::String(normalized.to_string()),
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.as_str().to_string()),
            Value::DateTime(dt) => serde_json::Value::String(dt.as_str().to_string()),
            Value::Time(t) => serde_json::Value::String(t.as_str().to_string()),
            Value::Quantity { value, unit } => serde_json::json!({
                "value": value.normalize().to_string(),
                "unit": unit,
            }),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                for key in keys {
                    out.insert(key.clone(), map[key].to_json());
                }
                serde_json::Value::Object(out)
            }
        }
    }

    /// Name of the variant, for error messages and `type()` fallbacks.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Long(_) => "Long",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Time(_) => "Time",
            Value::Quantity { .. } => "Quantity",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// The `resourceType` of an object value, if present.
    pub fn resource_type(&self) -> Option<&str> {
        match self {
            Value::Object(map) => match map.get("resourceType") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) | Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers and longs widen to decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) | Value::Long(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// The display string used by `toString()` and string coercion.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) | Value::Long(i) => i.to_string(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.as_str().to_string(),
            Value::DateTime(dt) => dt.as_str().to_string(),
            Value::Time(t) => t.as_str().to_string(),
            Value::Quantity { value, unit } => {
                format!("{} '{}'", value.normalize(), unit)
            }
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(_) => "[object]".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a.normalize() == b.normalize(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (
                Value::Quantity { value: av, unit: au },
                Value::Quantity { value: bv, unit: bu },
            ) => av.normalize() == bv.normalize() && au == bu,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) | Value::Long(i) => i.hash(state),
            Value::Decimal(d) => d.normalize().hash(state),
            Value::String(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Quantity { value, unit } => {
                value.normalize().hash(state);
                unit.hash(state);
            }
            Value::Array(items) => {
                items.len().hash(state);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Object(map) => {
                // Sorted keys so logically equal objects collide.
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                keys.len().hash(state);
                for key in keys {
                    key.hash(state);
                    map[key].hash(state);
                }
            }
        }
    }
}

/// A raw value with its runtime metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxedValue {
    pub value: Value,
    /// Type annotation, when the model provider or a literal supplied one.
    pub type_info: Option<TypeInfo>,
    /// The `_name` companion object of a FHIR primitive, carried alongside
    /// the primitive so `.extension` and `.id` remain reachable.
    pub primitive_element: Option<Value>,
}

impl BoxedValue {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            type_info: None,
            primitive_element: None,
        }
    }

    pub fn with_type(mut self, type_info: TypeInfo) -> Self {
        self.type_info = Some(type_info);
        self
    }

    pub fn with_primitive_element(mut self, sidecar: Value) -> Self {
        self.primitive_element = Some(sidecar);
        self
    }

    /// Unbox, discarding metadata.
    pub fn into_value(self) -> Value {
        self.value
    }
}

/// An ordered sequence of boxed values — the unit every evaluation step
/// consumes and produces.
pub type Collection = Vec<BoxedValue>;

/// Box a raw value into a collection, spreading arrays into their items
/// and dropping nulls.
pub fn to_collection(value: Value) -> Collection {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().flat_map(to_collection).collect(),
        other => vec![BoxedValue::new(other)],
    }
}

/// Unbox every item, discarding metadata.
pub fn unboxed(collection: &Collection) -> Vec<Value> {
    collection.iter().map(|b| b.value.clone()).collect()
}

/// Concatenate per-item result collections in order.
pub fn flatten(collections: Vec<Collection>) -> Collection {
    collections.into_iter().flatten().collect()
}

/// The single item of a one-element collection, or `None`.
pub fn singleton(collection: &Collection) -> Option<&BoxedValue> {
    match collection.as_slice() {
        [only] => Some(only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_integer_and_decimal() {
        let v = Value::from_json(&json!({ "a": 3, "b": 3.25 }));
        let Value::Object(map) = &v else {
            panic!("expected object")
        };
        assert_eq!(map["a"], Value::Integer(3));
        assert_eq!(map["b"], Value::Decimal("3.25".parse().unwrap()));
    }

    #[test]
    fn test_structural_equality_normalizes_decimals() {
        let a = Value::Decimal("1.0".parse().unwrap());
        let b = Value::Decimal("1.00".parse().unwrap());
        assert_eq!(a, b);
        // Cross-variant comparisons stay false at this layer.
        assert_ne!(Value::Integer(1), a);
    }

    #[test]
    fn test_object_equality_ignores_key_order() {
        let a = Value::from_json(&json!({ "x": 1, "y": 2 }));
        let b = Value::from_json(&json!({ "y": 2, "x": 1 }));
        assert_eq!(a, b);
    }

    #[test]
    fn test_to_collection_spreads_arrays_and_drops_nulls() {
        let value = Value::from_json(&json!([1, null, [2, 3]]));
        let collection = to_collection(value);
        assert_eq!(
            unboxed(&collection),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }

    #[test]
    fn test_display_string_for_quantity() {
        let q = Value::Quantity {
            value: "5.40".parse().unwrap(),
            unit: "mg".to_string(),
        };
        assert_eq!(q.to_display_string(), "5.4 'mg'");
    }
}

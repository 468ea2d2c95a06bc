//! Comparison and equality operators: `= != ~ !~ < <= > >=`.
//!
//! Equality is three-valued: empty operands answer empty, and a pairwise
//! comparison that is indeterminate (date precisions differ, quantity
//! dimensions mismatch) answers empty rather than false. Ordering
//! operators require singleton operands and answer empty for empty
//! operands or incomparable types.
//!
//! The `values_equal`/`compare_values` helpers here are also what union
//! deduplication, `in`/`contains`, and the subset functions build on, so
//! every membership decision in the engine shares one notion of equality.

use crate::context::EvaluationContext;
use crate::interpreter::{singleton_item, tri_boolean};
use lumen_fhirpath_support::{
    Collection, EngineError, PrecisionDate, PrecisionDateTime, PrecisionTime, Value,
};
use std::cmp::Ordering;

/// Language-level equality of two raw values, with numeric widening and
/// string-to-temporal coercion. `None` means indeterminate.
pub fn values_equal(a: &Value, b: &Value, context: &EvaluationContext) -> Option<bool> {
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Some(x == y),
        (Value::String(x), Value::String(y)) => Some(x == y),
        (Value::Date(x), Value::Date(y)) => temporal_eq(x.compare(y)),
        (Value::DateTime(x), Value::DateTime(y)) => temporal_eq(x.compare(y)),
        (Value::Time(x), Value::Time(y)) => temporal_eq(x.compare(y)),
        // A string meeting a temporal value (the common shape for raw JSON
        // input) is parsed and compared as a temporal.
        (Value::String(s), Value::Date(d)) | (Value::Date(d), Value::String(s)) => {
            temporal_eq(PrecisionDate::parse(s)?.compare(d))
        }
        (Value::String(s), Value::DateTime(dt)) | (Value::DateTime(dt), Value::String(s)) => {
            temporal_eq(PrecisionDateTime::parse(s)?.compare(dt))
        }
        (Value::String(s), Value::Time(t)) | (Value::Time(t), Value::String(s)) => {
            temporal_eq(PrecisionTime::parse(s)?.compare(t))
        }
        (
            Value::Quantity { value: xv, unit: xu },
            Value::Quantity { value: yv, unit: yu },
        ) => {
            if xu == yu {
                Some(xv.normalize() == yv.normalize())
            } else {
                match context.quantity.compare((*xv, xu), (*yv, yu)) {
                    Some(ordering) => Some(ordering == Ordering::Equal),
                    None => None,
                }
            }
        }
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => Some(a == b),
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => Some(dx.normalize() == dy.normalize()),
            _ => Some(false),
        },
    }
}

/// Equivalence (`~`): never indeterminate, case-insensitive for strings,
/// and treating indeterminate temporal/quantity comparisons as `false`.
pub fn values_equivalent(a: &Value, b: &Value, context: &EvaluationContext) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            normalize_for_equivalence(x) == normalize_for_equivalence(y)
        }
        _ => values_equal(a, b, context).unwrap_or(false),
    }
}

fn normalize_for_equivalence(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Ordering of two raw values; `None` for indeterminate or incomparable.
pub fn compare_values(a: &Value, b: &Value, context: &EvaluationContext) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => x.compare(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.compare(y),
        (Value::Time(x), Value::Time(y)) => x.compare(y),
        (Value::String(s), Value::Date(d)) => PrecisionDate::parse(s)?.compare(d),
        (Value::Date(d), Value::String(s)) => {
            d.compare(&PrecisionDate::parse(s)?)
        }
        (Value::String(s), Value::DateTime(dt)) => PrecisionDateTime::parse(s)?.compare(dt),
        (Value::DateTime(dt), Value::String(s)) => dt.compare(&PrecisionDateTime::parse(s)?),
        (Value::String(s), Value::Time(t)) => PrecisionTime::parse(s)?.compare(t),
        (Value::Time(t), Value::String(s)) => t.compare(&PrecisionTime::parse(s)?),
        (
            Value::Quantity { value: xv, unit: xu },
            Value::Quantity { value: yv, unit: yu },
        ) => context.quantity.compare((*xv, xu), (*yv, yu)),
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => None,
        },
    }
}

fn temporal_eq(ordering: Option<Ordering>) -> Option<bool> {
    ordering.map(|o| o == Ordering::Equal)
}

/// Collection equality for `=`: empty propagates, length mismatch is
/// false, and any indeterminate pair makes the whole answer empty.
fn collections_equal(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Option<bool> {
    if left.len() != right.len() {
        return Some(false);
    }
    let mut all = true;
    for (a, b) in left.iter().zip(right) {
        match values_equal(&a.value, &b.value, context)? {
            true => {}
            false => all = false,
        }
    }
    Some(all)
}

pub fn equals_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    if left.is_empty() || right.is_empty() {
        return Ok(Vec::new());
    }
    Ok(tri_boolean(collections_equal(left, right, context)))
}

pub fn not_equals_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    if left.is_empty() || right.is_empty() {
        return Ok(Vec::new());
    }
    Ok(tri_boolean(
        collections_equal(left, right, context).map(|b| !b),
    ))
}

pub fn equivalent_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    Ok(tri_boolean(Some(collections_equivalent(
        left, right, context,
    ))))
}

pub fn not_equivalent_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    Ok(tri_boolean(Some(!collections_equivalent(
        left, right, context,
    ))))
}

/// `~` over collections ignores order: every item must have an equivalent
/// partner on the other side, one-to-one.
fn collections_equivalent(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    for a in left {
        let mut matched = false;
        for (index, b) in right.iter().enumerate() {
            if !used[index] && values_equivalent(&a.value, &b.value, context) {
                used[index] = true;
                matched = true;
                break;
            }
        }
        if !matched {
            return false;
        }
    }
    true
}

fn relational(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
    what: &str,
    accept: fn(Ordering) -> bool,
) -> Result<Collection, EngineError> {
    if left.is_empty() || right.is_empty() {
        return Ok(Vec::new());
    }
    let a = singleton_item(left, what)?;
    let b = singleton_item(right, what)?;
    Ok(tri_boolean(
        compare_values(&a.value, &b.value, context).map(accept),
    ))
}

pub fn less_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    relational(left, right, context, "'<'", |o| o == Ordering::Less)
}

pub fn less_equal_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    relational(left, right, context, "'<='", |o| o != Ordering::Greater)
}

pub fn greater_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    relational(left, right, context, "'>'", |o| o == Ordering::Greater)
}

pub fn greater_equal_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    relational(left, right, context, "'>='", |o| o != Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucum::UcumBackend;
    use lumen_fhirpath_support::BoxedValue;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ctx() -> EvaluationContext {
        EvaluationContext::create(
            Vec::new(),
            std::collections::HashMap::new(),
            None,
            Arc::new(UcumBackend::new()),
        )
    }

    fn one(value: Value) -> Collection {
        vec![BoxedValue::new(value)]
    }

    #[test]
    fn test_integer_equals_decimal() {
        assert_eq!(
            values_equal(&Value::Integer(1), &Value::Decimal(dec!(1.0)), &ctx()),
            Some(true)
        );
    }

    #[test]
    fn test_empty_equality_is_empty() {
        let out = equals_op(&Vec::new(), &one(Value::Integer(1)), &ctx()).unwrap();
        assert!(out.is_empty());
        let out = equals_op(&Vec::new(), &Vec::new(), &ctx()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_indeterminate_date_precision_is_empty() {
        let a = one(Value::Date(PrecisionDate::parse("2015").unwrap()));
        let b = one(Value::Date(PrecisionDate::parse("2015-02").unwrap()));
        assert!(equals_op(&a, &b, &ctx()).unwrap().is_empty());
        assert!(less_op(&a, &b, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_equivalence_is_case_insensitive_and_total() {
        let a = one(Value::String("Hello  World".into()));
        let b = one(Value::String("hello world".into()));
        let out = equivalent_op(&a, &b, &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
        // {} ~ {} is true, unlike =.
        let out = equivalent_op(&Vec::new(), &Vec::new(), &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
    }

    #[test]
    fn test_string_compares_against_date_literal() {
        let a = one(Value::String("1990-01-01".into()));
        let b = one(Value::Date(PrecisionDate::parse("1980-06-15").unwrap()));
        let out = greater_equal_op(&a, &b, &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
    }
}

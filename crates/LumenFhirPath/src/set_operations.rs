//! Collection set semantics: union, combine, intersect, exclude, and the
//! membership operators `in` / `contains`.
//!
//! Union (both the `|` operator and the `union()` function) deduplicates
//! by structural deep equality, preserving left-then-right first-occurrence
//! order; `combine()` is the non-deduplicating variant. Membership uses
//! language equality (numeric widening included), so `1 in (1.0 | 2)`
//! holds.

use crate::comparison::values_equal;
use crate::context::EvaluationContext;
use crate::interpreter::{singleton_item, tri_boolean, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{Collection, EngineError, Value};
use std::collections::HashSet;

/// Concatenate and deduplicate by structural equality, keeping the first
/// occurrence of each value in left-then-right order.
pub fn union_collections(left: Collection, right: Collection) -> Collection {
    let mut seen: HashSet<Value> = HashSet::new();
    let mut out = Collection::new();
    for item in left.into_iter().chain(right) {
        if seen.insert(item.value.clone()) {
            out.push(item);
        }
    }
    out
}

/// The `|` operator evaluator (the interpreter routes through here after
/// evaluating both sides against the original context).
pub fn union_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    Ok(union_collections(left.clone(), right.clone()))
}

/// `union(other)` — same semantics as `|`.
pub fn union_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let other = invocation.eval_argument(0)?;
    Ok(invocation.unchanged(union_collections(invocation.input.clone(), other)))
}

/// `combine(other)` — concatenation without deduplication.
pub fn combine_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut out = invocation.input.clone();
    out.extend(invocation.eval_argument(0)?);
    Ok(invocation.unchanged(out))
}

/// `intersect(other)` — items present on both sides, deduplicated, input
/// order preserved.
pub fn intersect_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let other = invocation.eval_argument(0)?;
    let mut seen: HashSet<Value> = HashSet::new();
    let mut out = Collection::new();
    for item in invocation.input {
        if other
            .iter()
            .any(|b| values_equal(&item.value, &b.value, invocation.context) == Some(true))
            && seen.insert(item.value.clone())
        {
            out.push(item.clone());
        }
    }
    Ok(invocation.unchanged(out))
}

/// `exclude(other)` — items not present in `other`; keeps duplicates and
/// input order.
pub fn exclude_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let other = invocation.eval_argument(0)?;
    let out = invocation
        .input
        .iter()
        .filter(|item| {
            !other
                .iter()
                .any(|b| values_equal(&item.value, &b.value, invocation.context) == Some(true))
        })
        .cloned()
        .collect();
    Ok(invocation.unchanged(out))
}

/// `left in right`: is the singleton left an element of the right
/// collection? Empty left answers empty.
pub fn in_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    if left.is_empty() {
        return Ok(Vec::new());
    }
    let needle = singleton_item(left, "'in'")?;
    let found = right
        .iter()
        .any(|item| values_equal(&needle.value, &item.value, context) == Some(true));
    Ok(tri_boolean(Some(found)))
}

/// `left contains right`: mirror image of `in`.
pub fn contains_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    in_op(right, left, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_fhirpath_support::BoxedValue;

    fn ints(values: &[i64]) -> Collection {
        values
            .iter()
            .map(|i| BoxedValue::new(Value::Integer(*i)))
            .collect()
    }

    #[test]
    fn test_union_deduplicates_in_order() {
        let out = union_collections(ints(&[5, 5]), ints(&[6, 5]));
        let values: Vec<_> = out.into_iter().map(|b| b.value).collect();
        assert_eq!(values, vec![Value::Integer(5), Value::Integer(6)]);
    }

    #[test]
    fn test_union_keeps_structurally_distinct_numerics() {
        // 1 and 1.0 are equal under language equality but structurally
        // distinct; union keeps both.
        let decimals = vec![BoxedValue::new(Value::Decimal("1.0".parse().unwrap()))];
        let out = union_collections(ints(&[1]), decimals);
        assert_eq!(out.len(), 2);
    }
}

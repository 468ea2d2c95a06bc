//! Boolean operators with three-valued logic.
//!
//! Operands are tri-state: `true`, `false`, or empty. `and`/`or` answer
//! their short-circuit truth value when it is determinable even with an
//! empty operand (`false and {}` is `false`, `true or {}` is `true`);
//! everything else involving an empty operand stays empty. The tri-state
//! is represented as `Option<bool>` internally and projected back to a
//! collection at the boundary.

use crate::context::EvaluationContext;
use crate::interpreter::{singleton_boolean, tri_boolean};
use lumen_fhirpath_support::{Collection, EngineError};

pub fn and_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let a = singleton_boolean(left, "'and'")?;
    let b = singleton_boolean(right, "'and'")?;
    let value = match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    };
    Ok(tri_boolean(value))
}

pub fn or_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let a = singleton_boolean(left, "'or'")?;
    let b = singleton_boolean(right, "'or'")?;
    let value = match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    };
    Ok(tri_boolean(value))
}

pub fn xor_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let a = singleton_boolean(left, "'xor'")?;
    let b = singleton_boolean(right, "'xor'")?;
    let value = match (a, b) {
        (Some(x), Some(y)) => Some(x != y),
        _ => None,
    };
    Ok(tri_boolean(value))
}

pub fn implies_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let a = singleton_boolean(left, "'implies'")?;
    let b = singleton_boolean(right, "'implies'")?;
    let value = match (a, b) {
        (Some(false), _) => Some(true),
        (Some(true), other) => other,
        // {} implies true is still true; otherwise indeterminate.
        (None, Some(true)) => Some(true),
        (None, _) => None,
    };
    Ok(tri_boolean(value))
}

/// Unary `not`: `not({})` is `{}`.
pub fn unary_not(
    operand: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let value = singleton_boolean(operand, "'not'")?;
    Ok(tri_boolean(value.map(|b| !b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::boolean_collection;
    use crate::ucum::UcumBackend;
    use lumen_fhirpath_support::Value;
    use std::sync::Arc;

    fn ctx() -> EvaluationContext {
        EvaluationContext::create(
            Vec::new(),
            std::collections::HashMap::new(),
            None,
            Arc::new(UcumBackend::new()),
        )
    }

    #[test]
    fn test_short_circuit_truth_values() {
        let empty = Collection::new();
        // false and {} = false
        let out = and_op(&boolean_collection(false), &empty, &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(false));
        // true and {} = {}
        assert!(and_op(&boolean_collection(true), &empty, &ctx()).unwrap().is_empty());
        // true or {} = true
        let out = or_op(&boolean_collection(true), &empty, &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
        // false or {} = {}
        assert!(or_op(&boolean_collection(false), &empty, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_xor_needs_both_operands() {
        let empty = Collection::new();
        assert!(xor_op(&boolean_collection(true), &empty, &ctx()).unwrap().is_empty());
        let out = xor_op(&boolean_collection(true), &boolean_collection(false), &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
    }

    #[test]
    fn test_implies_truth_table_edges() {
        let empty = Collection::new();
        let out = implies_op(&boolean_collection(false), &empty, &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
        let out = implies_op(&empty, &boolean_collection(true), &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Boolean(true));
        assert!(implies_op(&empty, &boolean_collection(false), &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_not_of_empty_is_empty() {
        assert!(unary_not(&Collection::new(), &ctx()).unwrap().is_empty());
    }
}

//! `distinct()` and `isDistinct()`.
//!
//! Deduplication uses the same structural deep equality as union, via the
//! value model's `Hash`/`PartialEq`, keeping the first occurrence of each
//! value in input order.

use crate::interpreter::{boolean_collection, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{Collection, EngineError, Value};
use std::collections::HashSet;

/// `distinct()`.
pub fn distinct_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut seen: HashSet<Value> = HashSet::new();
    let mut out = Collection::new();
    for item in invocation.input {
        if seen.insert(item.value.clone()) {
            out.push(item.clone());
        }
    }
    Ok(invocation.unchanged(out))
}

/// `isDistinct()`: true when the input has no structural duplicates
/// (vacuously true for the empty input).
pub fn is_distinct_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut seen: HashSet<Value> = HashSet::new();
    for item in invocation.input {
        if !seen.insert(item.value.clone()) {
            return Ok(invocation.unchanged(boolean_collection(false)));
        }
    }
    Ok(invocation.unchanged(boolean_collection(true)))
}

//! `subsetOf()` and `supersetOf()`.
//!
//! Membership is decided with language equality (the same notion the
//! `in` operator uses), so numeric widening applies.

use crate::comparison::values_equal;
use crate::interpreter::{boolean_collection, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{Collection, EngineError};

fn is_subset(
    smaller: &Collection,
    larger: &Collection,
    invocation: &FunctionInvocation,
) -> bool {
    smaller.iter().all(|item| {
        larger
            .iter()
            .any(|other| values_equal(&item.value, &other.value, invocation.context) == Some(true))
    })
}

/// `subsetOf(other)`: every input item occurs in `other`. The empty
/// collection is a subset of everything.
pub fn subset_of_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let other = invocation.eval_argument(0)?;
    let verdict = is_subset(invocation.input, &other, invocation);
    Ok(invocation.unchanged(boolean_collection(verdict)))
}

/// `supersetOf(other)`: every item of `other` occurs in the input.
pub fn superset_of_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let other = invocation.eval_argument(0)?;
    let verdict = is_subset(&other, invocation.input, invocation);
    Ok(invocation.unchanged(boolean_collection(verdict)))
}

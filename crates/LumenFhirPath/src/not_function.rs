//! The `not()` function.
//!
//! Same tri-state semantics as the unary `not` operator: `{}.not()` is
//! `{}`, a singleton boolean negates, anything else is a type error.

use crate::interpreter::{singleton_boolean, tri_boolean, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::EngineError;

pub fn not_evaluator(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let value = singleton_boolean(invocation.input, "not()")
        .map_err(|e| e.or_range(invocation.range))?;
    Ok(invocation.unchanged(tri_boolean(value.map(|b| !b))))
}

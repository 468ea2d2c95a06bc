//! Boolean aggregate functions and `iif`.
//!
//! `allTrue`/`anyTrue`/`allFalse`/`anyFalse` fold a collection of
//! booleans; a non-boolean item is a type error. `iif` evaluates lazily:
//! only the selected branch runs, so the other branch can safely contain
//! an expression that would error.

use crate::interpreter::{
    boolean_collection, singleton_boolean, EvalOutput, FunctionInvocation,
};
use lumen_fhirpath_support::{EngineError, ErrorCode, Value};

fn fold_booleans(
    invocation: &FunctionInvocation,
    name: &str,
    mut accept: impl FnMut(bool) -> Option<bool>,
    exhausted: bool,
) -> Result<EvalOutput, EngineError> {
    for item in invocation.input {
        let Value::Boolean(b) = &item.value else {
            return Err(invocation.error(
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "{}() requires booleans, found {}",
                    name,
                    item.value.type_name()
                ),
            ));
        };
        if let Some(short) = accept(*b) {
            return Ok(invocation.unchanged(boolean_collection(short)));
        }
    }
    Ok(invocation.unchanged(boolean_collection(exhausted)))
}

/// `allTrue()`; true for the empty input.
pub fn all_true_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    fold_booleans(invocation, "allTrue", |b| (!b).then_some(false), true)
}

/// `anyTrue()`; false for the empty input.
pub fn any_true_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    fold_booleans(invocation, "anyTrue", |b| b.then_some(true), false)
}

/// `allFalse()`; true for the empty input.
pub fn all_false_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    fold_booleans(invocation, "allFalse", |b| b.then_some(false), true)
}

/// `anyFalse()`; false for the empty input.
pub fn any_false_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    fold_booleans(invocation, "anyFalse", |b| (!b).then_some(true), false)
}

/// `iif(criterion, true-result [, otherwise])`.
///
/// The criterion is evaluated against the function's input; the selected
/// branch is then evaluated lazily. A missing `otherwise` answers empty.
pub fn iif_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let criterion = invocation.eval_argument(0)?;
    let verdict = singleton_boolean(&criterion, "iif criterion")
        .map_err(|e| e.or_range(invocation.range))?;
    match verdict {
        Some(true) => {
            let value = invocation.eval_argument(1)?;
            Ok(invocation.unchanged(value))
        }
        _ => match invocation.argument(2) {
            Some(_) => {
                let value = invocation.eval_argument(2)?;
                Ok(invocation.unchanged(value))
            }
            None => Ok(invocation.unchanged(Vec::new())),
        },
    }
}

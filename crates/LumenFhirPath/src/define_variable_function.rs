//! `defineVariable(name [, value])`.
//!
//! Binds a user variable in a child scope and passes the input through
//! unchanged, so the binding is visible to the rest of the pipeline but
//! never to enclosing or sibling expressions. With one argument the
//! variable is bound to the input itself.
//!
//! Redefining an existing variable, or naming a system variable, is a
//! silent no-op: the expression keeps evaluating with the original
//! binding.

use crate::interpreter::{singleton_string, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{EngineError, ErrorCode};

pub fn define_variable_evaluator(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let name_collection = invocation.eval_argument(0)?;
    let Some(name) = singleton_string(&name_collection, "defineVariable() name")
        .map_err(|e| e.or_range(invocation.range))?
    else {
        return Err(invocation.error(
            ErrorCode::EMPTY_NOT_ALLOWED,
            "defineVariable() requires a name",
        ));
    };

    let value = match invocation.argument(1) {
        Some(_) => invocation.eval_argument(1)?,
        None => invocation.input.clone(),
    };

    let context = match invocation.context.set_variable(&name, value, false) {
        Some(updated) => updated,
        // Redefinition and system names: keep the existing binding.
        None => invocation.context.clone(),
    };
    Ok(EvalOutput {
        value: invocation.input.clone(),
        context,
    })
}

//! `trace(name [, projection])`.
//!
//! Records the input (or the projection of it) on the context's trace
//! collector and passes the input through unchanged. `inspect` surfaces
//! the collected entries; a `tracing` debug event is emitted as well so
//! library embedders see traces in their subscriber.

use crate::interpreter::{singleton_string, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{unboxed, EngineError, ErrorCode};

pub fn trace_evaluator(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let name_collection = invocation.eval_argument(0)?;
    let Some(name) = singleton_string(&name_collection, "trace() name")
        .map_err(|e| e.or_range(invocation.range))?
    else {
        return Err(invocation.error(ErrorCode::EMPTY_NOT_ALLOWED, "trace() requires a name"));
    };

    let observed = match invocation.argument(1) {
        Some(_) => {
            let mut projected = Vec::new();
            for (index, item) in invocation.input.iter().enumerate() {
                projected.extend(invocation.eval_for_item(1, item, index)?);
            }
            projected
        }
        None => invocation.input.clone(),
    };

    let raw = unboxed(&observed);
    tracing::debug!(target: "fhirpath::trace", name = %name, count = raw.len(), "trace");
    invocation.context.push_trace(&name, raw);
    Ok(invocation.unchanged(invocation.input.clone()))
}

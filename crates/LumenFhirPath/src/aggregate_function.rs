//! `aggregate(aggregator [, init])`.
//!
//! Folds the input left to right. Each step evaluates the aggregator in an
//! iterator frame where `$this` is the current item, `$index` its
//! position, and `$total` the running accumulator; the step's result
//! becomes the next `$total`. Without an init the accumulator starts
//! empty.

use crate::interpreter::{evaluate, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{Collection, EngineError};

pub fn aggregate_evaluator(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut total: Collection = match invocation.argument(1) {
        Some(_) => invocation.eval_argument(1)?,
        None => Vec::new(),
    };
    for (index, item) in invocation.input.iter().enumerate() {
        let frame = invocation
            .context
            .with_iterator(item, index)
            .with_total(total);
        let item_input = vec![item.clone()];
        total = evaluate(&invocation.arguments[0], &item_input, &frame)?.value;
    }
    Ok(invocation.unchanged(total))
}

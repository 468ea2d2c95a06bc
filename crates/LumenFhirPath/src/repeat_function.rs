//! `repeat(projection)`: transitive closure.
//!
//! Applies the projection to the input, then to each round's new results,
//! until a round produces nothing unseen. Visited values are tracked by
//! structural equality, which makes cyclic structures terminate instead
//! of looping.

use crate::interpreter::{EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{Collection, EngineError, Value};
use std::collections::HashSet;

pub fn repeat_evaluator(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut seen: HashSet<Value> = HashSet::new();
    let mut out = Collection::new();
    let mut frontier = invocation.input.clone();
    while !frontier.is_empty() {
        let mut next = Collection::new();
        for (index, item) in frontier.iter().enumerate() {
            for produced in invocation.eval_for_item(0, item, index)? {
                if seen.insert(produced.value.clone()) {
                    next.push(produced);
                }
            }
        }
        out.extend(next.iter().cloned());
        frontier = next;
    }
    Ok(invocation.unchanged(out))
}

//! Core collection functions: existence, filtering, projection,
//! subsetting, and tree navigation.
//!
//! The iterator functions (`where`, `select`, `exists(criteria)`, `all`)
//! evaluate their argument once per input item inside an iterator frame:
//! `$this` is the item and `$index` its position. Frames are child scopes,
//! so nothing an iteration defines survives the call.

use crate::interpreter::{
    boolean_collection, integer_collection, singleton_boolean, singleton_integer, EvalOutput,
    FunctionInvocation,
};
use lumen_fhirpath_support::{BoxedValue, Collection, EngineError, ErrorCode, Value};

/// `empty()`.
pub fn empty_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    Ok(invocation.unchanged(boolean_collection(invocation.input.is_empty())))
}

/// `count()`.
pub fn count_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    Ok(invocation.unchanged(integer_collection(invocation.input.len() as i64)))
}

/// `exists()` / `exists(criteria)`.
pub fn exists_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    if invocation.arguments.is_empty() {
        return Ok(invocation.unchanged(boolean_collection(!invocation.input.is_empty())));
    }
    for (index, item) in invocation.input.iter().enumerate() {
        let out = invocation.eval_for_item(0, item, index)?;
        if singleton_boolean(&out, "exists criteria")? == Some(true) {
            return Ok(invocation.unchanged(boolean_collection(true)));
        }
    }
    Ok(invocation.unchanged(boolean_collection(false)))
}

/// `all(criteria)`; true for the empty input.
pub fn all_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    for (index, item) in invocation.input.iter().enumerate() {
        let out = invocation.eval_for_item(0, item, index)?;
        if singleton_boolean(&out, "all criteria")? != Some(true) {
            return Ok(invocation.unchanged(boolean_collection(false)));
        }
    }
    Ok(invocation.unchanged(boolean_collection(true)))
}

/// `where(criteria)`: keep items whose criteria answers `true`; empty and
/// `false` both exclude.
pub fn where_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut out = Collection::new();
    for (index, item) in invocation.input.iter().enumerate() {
        let verdict = invocation.eval_for_item(0, item, index)?;
        if singleton_boolean(&verdict, "where criteria")? == Some(true) {
            out.push(item.clone());
        }
    }
    Ok(invocation.unchanged(out))
}

/// `select(projection)`: evaluate the projection per item and concatenate
/// results in input order.
pub fn select_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut out = Collection::new();
    for (index, item) in invocation.input.iter().enumerate() {
        out.extend(invocation.eval_for_item(0, item, index)?);
    }
    Ok(invocation.unchanged(out))
}

/// `single()`: the only item; empty stays empty, more than one is an
/// error.
pub fn single_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    match invocation.input.as_slice() {
        [] => Ok(invocation.unchanged(Vec::new())),
        [only] => Ok(invocation.unchanged(vec![only.clone()])),
        items => Err(invocation.error(
            ErrorCode::SINGLETON_REQUIRED,
            format!("single() requires at most one item, found {}", items.len()),
        )),
    }
}

/// `first()`.
pub fn first_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    Ok(invocation.unchanged(
        invocation
            .input
            .first()
            .map(|item| vec![item.clone()])
            .unwrap_or_default(),
    ))
}

/// `last()`.
pub fn last_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    Ok(invocation.unchanged(
        invocation
            .input
            .last()
            .map(|item| vec![item.clone()])
            .unwrap_or_default(),
    ))
}

/// `tail()`: everything but the first item.
pub fn tail_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let out = invocation.input.iter().skip(1).cloned().collect();
    Ok(invocation.unchanged(out))
}

/// `skip(count)`.
pub fn skip_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let count = argument_integer(invocation, "skip")?;
    let Some(count) = count else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let out = invocation
        .input
        .iter()
        .skip(count.max(0) as usize)
        .cloned()
        .collect();
    Ok(invocation.unchanged(out))
}

/// `take(count)`.
pub fn take_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let count = argument_integer(invocation, "take")?;
    let Some(count) = count else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let out = invocation
        .input
        .iter()
        .take(count.max(0) as usize)
        .cloned()
        .collect();
    Ok(invocation.unchanged(out))
}

/// `children()`: the immediate child values of every object item, in
/// property order by key for determinism.
pub fn children_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    Ok(invocation.unchanged(children_of(invocation.input)))
}

/// `descendants()`: transitive closure of `children()`, excluding the
/// input items themselves.
pub fn descendants_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let mut out = Collection::new();
    let mut frontier = children_of(invocation.input);
    while !frontier.is_empty() {
        let next = children_of(&frontier);
        out.extend(frontier);
        frontier = next;
    }
    Ok(invocation.unchanged(out))
}

fn children_of(input: &Collection) -> Collection {
    let mut out = Collection::new();
    for item in input {
        if let Value::Object(map) = &item.value {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            for key in keys {
                // Sidecar objects surface through their primitives, not
                // as children of the parent.
                if key.starts_with('_') || key == "resourceType" {
                    continue;
                }
                push_spread(&mut out, &map[key]);
            }
        }
    }
    out
}

fn push_spread(out: &mut Collection, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for element in items {
                push_spread(out, element);
            }
        }
        other => out.push(BoxedValue::new(other.clone())),
    }
}

/// Shared singleton-integer argument handling for `skip`/`take`.
fn argument_integer(
    invocation: &FunctionInvocation,
    name: &str,
) -> Result<Option<i64>, EngineError> {
    let collection = invocation.eval_argument(0)?;
    singleton_integer(&collection, &format!("{}()", name)).map_err(|e| e.or_range(invocation.range))
}

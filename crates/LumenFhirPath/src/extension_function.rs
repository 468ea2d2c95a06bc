//! `extension(url)`.
//!
//! Shorthand for `extension.where(url = ...)` that also reaches the
//! extensions carried on a primitive's `_name` sidecar, which plain
//! navigation from the primitive value would miss.

use crate::interpreter::{singleton_string, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{BoxedValue, Collection, EngineError, Value};

pub fn extension_evaluator(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let url_collection = invocation.eval_argument(0)?;
    let Some(url) = singleton_string(&url_collection, "extension() url")
        .map_err(|e| e.or_range(invocation.range))?
    else {
        return Ok(invocation.unchanged(Vec::new()));
    };

    let mut out = Collection::new();
    for item in invocation.input {
        let container = match &item.value {
            Value::Object(map) => Some(map),
            _ => match &item.primitive_element {
                Some(Value::Object(side)) => Some(side),
                _ => None,
            },
        };
        let Some(container) = container else { continue };
        let Some(Value::Array(extensions)) = container.get("extension") else {
            continue;
        };
        for extension in extensions {
            if let Value::Object(fields) = extension {
                if fields.get("url").and_then(Value::as_str) == Some(url.as_str()) {
                    out.push(BoxedValue::new(extension.clone()));
                }
            }
        }
    }
    Ok(invocation.unchanged(out))
}

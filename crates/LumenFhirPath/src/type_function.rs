//! Type operations: the `is`/`as` operator semantics, `ofType()`, and
//! `type()` reflection.
//!
//! With a model provider and a choice-type annotation, a target that is
//! not among the union's choices tests `false` (and filters to empty)
//! without looking at the value. Without a provider, testing falls back
//! to the value's primitive kind, and to `resourceType` equality for
//! objects — never a pass-through.

use crate::context::EvaluationContext;
use crate::interpreter::{EvalOutput, FunctionInvocation};
use crate::parser::{Expression, ExpressionKind};
use lumen_fhirpath_support::{BoxedValue, Collection, EngineError, ErrorCode, Value};
use std::collections::HashMap;

/// Split a possibly qualified type name into `(namespace, name)`.
fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((ns, rest)) => (Some(ns), rest),
        None => (None, name),
    }
}

/// Does this item's concrete type match the (possibly qualified) target?
pub fn item_is_type(item: &BoxedValue, target: &str, context: &EvaluationContext) -> bool {
    let (namespace, bare) = split_qualified(target);

    // A choice-type annotation rules targets out before any value check.
    if let Some(type_info) = &item.type_info {
        if let Some(model_context) = &type_info.model_context {
            if !model_context.admits(bare) {
                return false;
            }
        }
    }

    let primitive = match &item.value {
        Value::Boolean(_) => Some("Boolean"),
        Value::Integer(_) => Some("Integer"),
        Value::Long(_) => Some("Long"),
        Value::Decimal(_) => Some("Decimal"),
        Value::String(_) => Some("String"),
        Value::Date(_) => Some("Date"),
        Value::DateTime(_) => Some("DateTime"),
        Value::Time(_) => Some("Time"),
        Value::Quantity { .. } => Some("Quantity"),
        Value::Null | Value::Array(_) => None,
        Value::Object(_) => None,
    };
    if let Some(primitive) = primitive {
        // FHIR primitive spellings (`boolean`, `dateTime`, ...) match
        // their System counterparts.
        let matches_name = primitive.eq_ignore_ascii_case(bare)
            || (primitive == "DateTime" && bare == "dateTime");
        return matches_name && namespace.is_none_or(|ns| ns == "System" || ns == "FHIR");
    }

    if let Value::Object(_) = &item.value {
        if item.value.resource_type() == Some(bare) {
            return true;
        }
        if let (Some(model), Some(type_info)) = (&context.model, &item.type_info) {
            return model.of_type(type_info, bare).is_some();
        }
    }
    false
}

/// Keep the items whose concrete type matches `target`, narrowing their
/// annotation through the model provider when one is present.
pub fn filter_by_type(
    input: &Collection,
    target: &str,
    context: &EvaluationContext,
) -> Collection {
    let (_, bare) = split_qualified(target);
    input
        .iter()
        .filter(|item| item_is_type(item, target, context))
        .map(|item| {
            let narrowed = context
                .model
                .as_ref()
                .zip(item.type_info.as_ref())
                .and_then(|(model, type_info)| model.of_type(type_info, bare));
            match narrowed {
                Some(type_info) => {
                    let mut item = item.clone();
                    item.type_info = Some(type_info);
                    item
                }
                None => item.clone(),
            }
        })
        .collect()
}

/// Extract a type name from an argument expression: `Quantity`,
/// `System.Boolean`, or a lowercase primitive spelling.
pub fn type_name_from_expression(expr: &Expression) -> Option<String> {
    match &expr.kind {
        ExpressionKind::Identifier(name) | ExpressionKind::TypeOrIdentifier(name) => {
            Some(name.clone())
        }
        ExpressionKind::Binary {
            operator,
            left,
            right,
        } if operator == "." => {
            let namespace = type_name_from_expression(left)?;
            let name = type_name_from_expression(right)?;
            Some(format!("{}.{}", namespace, name))
        }
        _ => None,
    }
}

/// `ofType(Type)`.
pub fn of_type_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let target = type_name_from_expression(&invocation.arguments[0]).ok_or_else(|| {
        invocation.error(
            ErrorCode::INVALID_OPERAND,
            "ofType() requires a type name argument",
        )
    })?;
    Ok(invocation.unchanged(filter_by_type(invocation.input, &target, invocation.context)))
}

/// `type()`: per-item `{namespace, name}` reflection objects.
pub fn type_reflection_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let out = invocation
        .input
        .iter()
        .map(|item| {
            let (namespace, name) = reflect(item);
            let mut map = HashMap::new();
            map.insert("namespace".to_string(), Value::String(namespace));
            map.insert("name".to_string(), Value::String(name));
            BoxedValue::new(Value::Object(map))
        })
        .collect();
    Ok(invocation.unchanged(out))
}

fn reflect(item: &BoxedValue) -> (String, String) {
    if let Some(type_info) = &item.type_info {
        if let (Some(namespace), Some(name)) = (&type_info.namespace, &type_info.name) {
            return (namespace.clone(), name.clone());
        }
    }
    match &item.value {
        Value::Object(_) => match item.value.resource_type() {
            Some(rt) => ("FHIR".to_string(), rt.to_string()),
            None => ("System".to_string(), "Object".to_string()),
        },
        other => ("System".to_string(), other.type_name().to_string()),
    }
}

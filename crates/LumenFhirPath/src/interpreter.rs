//! # Expression Interpreter
//!
//! Tree-walking evaluator. Every node kind evaluates to an [`EvalOutput`]:
//! the resulting collection plus the context to continue with, so that
//! `defineVariable` can thread new bindings through a pipeline while
//! keeping parent scopes immutable.
//!
//! ## Collection semantics
//!
//! Everything is a collection. Inputs are coerced to collections at the
//! entry point; navigation spreads arrays and drops nulls; operators
//! receive whole collections and apply their own singleton/empty rules.
//!
//! ## Context flow
//!
//! - `.` (pipeline): the left side's output becomes the right side's
//!   input, and the left side's context (with any variables it defined)
//!   flows into the right side.
//! - `|` (union): both sides see the *original* context; definitions made
//!   inside one side are invisible to the other and after the union.
//! - Other binary operators evaluate both sides against the same input
//!   and context, then hand the values to the registry evaluator.
//!
//! Function arguments are not evaluated before dispatch: evaluators
//! receive the raw argument nodes and evaluate them lazily, which is what
//! gives iterator functions their `$this`/`$index` scoping and `iif` its
//! short-circuit behavior.

use crate::context::EvaluationContext;
use crate::parser::{Expression, ExpressionKind, LiteralValue};
use crate::registry::Registry;
use crate::type_function;
use crate::ucum;
use lumen_fhirpath_support::{
    BoxedValue, Collection, EngineError, ErrorCode, Range, TypeInfo, TypeName, Value,
};

/// The result of evaluating one node: the value and the context the next
/// step should run in.
#[derive(Debug, Clone)]
pub struct EvalOutput {
    pub value: Collection,
    pub context: EvaluationContext,
}

/// Everything a registered function evaluator receives: the input
/// collection, the current context, the *unevaluated* argument nodes, and
/// the call's source range for error reporting.
pub struct FunctionInvocation<'a> {
    pub input: &'a Collection,
    pub context: &'a EvaluationContext,
    pub arguments: &'a [Expression],
    pub range: Range,
}

impl<'a> FunctionInvocation<'a> {
    /// Result that leaves the context unchanged.
    pub fn unchanged(&self, value: Collection) -> EvalOutput {
        EvalOutput {
            value,
            context: self.context.clone(),
        }
    }

    pub fn argument(&self, index: usize) -> Option<&Expression> {
        self.arguments.get(index)
    }

    /// Evaluate an argument against the function's own input and context
    /// (non-iterating arguments: `skip(n)`, `substring(start)`, ...).
    pub fn eval_argument(&self, index: usize) -> Result<Collection, EngineError> {
        let expr = &self.arguments[index];
        Ok(evaluate(expr, self.input, self.context)?.value)
    }

    /// Evaluate an argument for one input item inside an iterator frame:
    /// `$this` is the item, `$index` its position.
    pub fn eval_for_item(
        &self,
        argument_index: usize,
        item: &BoxedValue,
        item_index: usize,
    ) -> Result<Collection, EngineError> {
        let expr = &self.arguments[argument_index];
        let frame = self.context.with_iterator(item, item_index);
        let item_input = vec![item.clone()];
        Ok(evaluate(expr, &item_input, &frame)?.value)
    }

    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> EngineError {
        EngineError::new(code, message).with_range(self.range)
    }
}

/// Evaluate one AST node.
pub fn evaluate(
    expr: &Expression,
    input: &Collection,
    context: &EvaluationContext,
) -> Result<EvalOutput, EngineError> {
    match &expr.kind {
        ExpressionKind::Literal(literal) => Ok(EvalOutput {
            value: literal_collection(literal),
            context: context.clone(),
        }),
        ExpressionKind::Identifier(name) => Ok(EvalOutput {
            value: navigate(input, name, context),
            context: context.clone(),
        }),
        ExpressionKind::TypeOrIdentifier(name) => {
            // A matching resourceType anywhere in the input makes this a
            // type filter; otherwise it is ordinary property navigation.
            let matches_type = input
                .iter()
                .any(|item| item.value.resource_type() == Some(name.as_str()));
            let value = if matches_type {
                input
                    .iter()
                    .filter(|item| item.value.resource_type() == Some(name.as_str()))
                    .cloned()
                    .map(|item| annotate_resource(item, name, context))
                    .collect()
            } else {
                navigate(input, name, context)
            };
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
        ExpressionKind::Variable(name) => match context.get_variable(name) {
            Some(value) => Ok(EvalOutput {
                value,
                context: context.clone(),
            }),
            None => Err(EngineError::new(
                ErrorCode::VARIABLE_NOT_DEFINED,
                format!("variable '{}' is not defined", name),
            )
            .with_range(expr.range)),
        },
        ExpressionKind::Binary {
            operator,
            left,
            right,
        } => evaluate_binary(expr, operator, left, right, input, context),
        ExpressionKind::Unary { operator, operand } => {
            let operand_out = evaluate(operand, input, context)?;
            let registry = Registry::global();
            let def = registry.unary_operator(operator).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::UNKNOWN_OPERATOR,
                    format!("unknown unary operator '{}'", operator),
                )
                .with_range(expr.range)
            })?;
            let value =
                (def.evaluator)(&operand_out.value, context).map_err(|e| e.or_range(expr.range))?;
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
        ExpressionKind::Function { callee, arguments } => {
            evaluate_function(expr, callee, arguments, input, context)
        }
        ExpressionKind::Index { expression, index } => {
            let base = evaluate(expression, input, context)?;
            let index_out = evaluate(index, input, context)?;
            let value = index_collection(&base.value, &index_out.value, expr.range)?;
            Ok(EvalOutput {
                value,
                context: base.context,
            })
        }
        ExpressionKind::Collection(elements) => {
            let mut value = Vec::new();
            for element in elements {
                value.extend(evaluate(element, input, context)?.value);
            }
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
        ExpressionKind::MembershipTest {
            expression,
            type_name,
        } => {
            let base = evaluate(expression, input, context)?;
            let value = base
                .value
                .iter()
                .map(|item| {
                    BoxedValue::new(Value::Boolean(type_function::item_is_type(
                        item, type_name, context,
                    )))
                    .with_type(TypeInfo::system(TypeName::Boolean))
                })
                .collect();
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
        ExpressionKind::TypeCast {
            expression,
            type_name,
        } => {
            let base = evaluate(expression, input, context)?;
            let value = type_function::filter_by_type(&base.value, type_name, context);
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
        ExpressionKind::Quantity {
            value,
            unit,
            calendar_unit,
        } => {
            let unit = if *calendar_unit {
                ucum::calendar_to_ucum_unit(unit)
            } else {
                unit.clone()
            };
            Ok(EvalOutput {
                value: vec![
                    BoxedValue::new(Value::Quantity { value: *value, unit })
                        .with_type(TypeInfo::system(TypeName::Quantity)),
                ],
                context: context.clone(),
            })
        }
        ExpressionKind::Error { message, .. } => Err(EngineError::new(
            ErrorCode::INVALID_SYNTAX,
            format!("cannot evaluate an expression with syntax errors: {}", message),
        )
        .with_range(expr.range)),
    }
}

fn evaluate_binary(
    expr: &Expression,
    operator: &str,
    left: &Expression,
    right: &Expression,
    input: &Collection,
    context: &EvaluationContext,
) -> Result<EvalOutput, EngineError> {
    match operator {
        "." => {
            // Pipeline: left's output feeds right, left's context flows on.
            let left_out = evaluate(left, input, context)?;
            let step_context = left_out.context.with_input(left_out.value.clone());
            evaluate(right, &left_out.value, &step_context)
        }
        "|" => {
            // Both sides see the original context; neither side's variable
            // definitions escape.
            let left_out = evaluate(left, input, context)?;
            let right_out = evaluate(right, input, context)?;
            let value = crate::set_operations::union_collections(left_out.value, right_out.value);
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
        _ => {
            let left_out = evaluate(left, input, context)?;
            let right_out = evaluate(right, input, context)?;
            let registry = Registry::global();
            let def = registry.binary_operator(operator).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::UNKNOWN_OPERATOR,
                    format!("unknown operator '{}'", operator),
                )
                .with_range(expr.range)
            })?;
            let Some(evaluator) = def.evaluator else {
                return Err(EngineError::new(
                    ErrorCode::UNKNOWN_OPERATOR,
                    format!("operator '{}' cannot be evaluated directly", operator),
                )
                .with_range(expr.range));
            };
            let value = evaluator(&left_out.value, &right_out.value, context)
                .map_err(|e| e.or_range(expr.range))?;
            Ok(EvalOutput {
                value,
                context: context.clone(),
            })
        }
    }
}

fn evaluate_function(
    expr: &Expression,
    callee: &Expression,
    arguments: &[Expression],
    input: &Collection,
    context: &EvaluationContext,
) -> Result<EvalOutput, EngineError> {
    let name = match &callee.kind {
        ExpressionKind::Identifier(name) | ExpressionKind::TypeOrIdentifier(name) => name,
        _ => {
            return Err(EngineError::new(
                ErrorCode::UNKNOWN_NODE_TYPE,
                "function callee must be an identifier",
            )
            .with_range(callee.range));
        }
    };
    let registry = Registry::global();
    let def = registry.function(name).ok_or_else(|| {
        EngineError::new(
            ErrorCode::UNKNOWN_FUNCTION,
            format!("unknown function '{}'", name),
        )
        .with_range(callee.range)
    })?;
    if arguments.len() < def.min_arity
        || def.max_arity.is_some_and(|max| arguments.len() > max)
    {
        return Err(EngineError::new(
            ErrorCode::WRONG_ARGUMENT_COUNT,
            format!(
                "function '{}' expects {} argument(s), got {}",
                name,
                def.arity_description(),
                arguments.len()
            ),
        )
        .with_range(expr.range));
    }
    let invocation = FunctionInvocation {
        input,
        context,
        arguments,
        range: expr.range,
    };
    (def.evaluator)(&invocation)
}

/// Property navigation over a collection: for each object item with the
/// named property, push its value(s), spreading arrays and dropping
/// nulls. The FHIR `_name` sidecar is paired with its value so primitives
/// keep their `extension`/`id` reachable, and the model provider (when
/// present) annotates results with the element type.
pub fn navigate(input: &Collection, name: &str, context: &EvaluationContext) -> Collection {
    let mut out = Collection::new();
    for item in input {
        match &item.value {
            Value::Object(map) => {
                let Some(value) = map.get(name) else {
                    continue;
                };
                let sidecar = map.get(&format!("_{}", name));
                let child_type = element_type(item, name, context);
                push_navigated(&mut out, value, sidecar, child_type.as_ref());
            }
            // Navigating into a primitive reads its sidecar object, so
            // `code.extension` works on a boxed primitive.
            _ => {
                if let Some(Value::Object(side)) = &item.primitive_element {
                    if let Some(value) = side.get(name) {
                        push_navigated(&mut out, value, None, None);
                    }
                }
            }
        }
    }
    out
}

fn push_navigated(
    out: &mut Collection,
    value: &Value,
    sidecar: Option<&Value>,
    child_type: Option<&TypeInfo>,
) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            let sidecars = match sidecar {
                Some(Value::Array(s)) => Some(s),
                _ => None,
            };
            for (index, element) in items.iter().enumerate() {
                if matches!(element, Value::Null) {
                    continue;
                }
                let mut boxed = BoxedValue::new(element.clone());
                if let Some(sidecars) = sidecars {
                    if let Some(side @ Value::Object(_)) = sidecars.get(index) {
                        boxed = boxed.with_primitive_element(side.clone());
                    }
                }
                if let Some(t) = child_type {
                    boxed = boxed.with_type(t.clone());
                }
                out.push(boxed);
            }
        }
        other => {
            let mut boxed = BoxedValue::new(other.clone());
            if let Some(side @ Value::Object(_)) = sidecar {
                boxed = boxed.with_primitive_element(side.clone());
            }
            if let Some(t) = child_type {
                boxed = boxed.with_type(t.clone());
            }
            out.push(boxed);
        }
    }
}

fn element_type(
    parent: &BoxedValue,
    property: &str,
    context: &EvaluationContext,
) -> Option<TypeInfo> {
    let model = context.model.as_ref()?;
    let parent_type = parent.type_info.as_ref()?;
    model.get_element_type(parent_type, property)
}

fn annotate_resource(item: BoxedValue, name: &str, context: &EvaluationContext) -> BoxedValue {
    if item.type_info.is_some() {
        return item;
    }
    match context.model.as_ref().and_then(|m| m.get_type(name)) {
        Some(type_info) => item.with_type(type_info),
        None => item,
    }
}

fn literal_collection(literal: &LiteralValue) -> Collection {
    let (value, type_name) = match literal {
        LiteralValue::Empty => return Vec::new(),
        LiteralValue::Boolean(b) => (Value::Boolean(*b), TypeName::Boolean),
        LiteralValue::Integer(i) => (Value::Integer(*i), TypeName::Integer),
        LiteralValue::Decimal(d) => (Value::Decimal(*d), TypeName::Decimal),
        LiteralValue::String(s) => (Value::String(s.clone()), TypeName::String),
        LiteralValue::Date(d) => (Value::Date(d.clone()), TypeName::Date),
        LiteralValue::DateTime(dt) => (Value::DateTime(dt.clone()), TypeName::DateTime),
        LiteralValue::Time(t) => (Value::Time(t.clone()), TypeName::Time),
    };
    vec![BoxedValue::new(value).with_type(TypeInfo::system(type_name))]
}

/// `base[index]`: the index must evaluate to a non-negative integer
/// singleton; out-of-range (including negative) answers empty.
fn index_collection(
    base: &Collection,
    index: &Collection,
    range: Range,
) -> Result<Collection, EngineError> {
    if index.is_empty() {
        return Ok(Vec::new());
    }
    let item = singleton_item(index, "indexer").map_err(|e| e.or_range(range))?;
    let position = match item.value.as_integer() {
        Some(i) => i,
        None => {
            return Err(EngineError::new(
                ErrorCode::TYPE_MISMATCH,
                format!("indexer must be an integer, found {}", item.value.type_name()),
            )
            .with_range(range));
        }
    };
    if position < 0 {
        return Ok(Vec::new());
    }
    Ok(base
        .get(position as usize)
        .map(|item| vec![item.clone()])
        .unwrap_or_default())
}

// === Singleton helpers shared by the operator and function modules ===

/// The single item of a non-empty collection; an error for more than one.
pub fn singleton_item<'c>(
    collection: &'c Collection,
    what: &str,
) -> Result<&'c BoxedValue, EngineError> {
    match collection.as_slice() {
        [only] => Ok(only),
        [] => Err(EngineError::new(
            ErrorCode::EMPTY_NOT_ALLOWED,
            format!("{} requires a value, found empty", what),
        )),
        items => Err(EngineError::new(
            ErrorCode::SINGLETON_REQUIRED,
            format!(
                "{} requires a single value, found a collection of {}",
                what,
                items.len()
            ),
        )),
    }
}

/// Three-valued boolean view of a collection: empty is `None`, a singleton
/// boolean is `Some`, anything else is an error.
pub fn singleton_boolean(
    collection: &Collection,
    what: &str,
) -> Result<Option<bool>, EngineError> {
    match collection.as_slice() {
        [] => Ok(None),
        [only] => match only.value.as_boolean() {
            Some(b) => Ok(Some(b)),
            None => Err(EngineError::new(
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "{} requires a Boolean, found {}",
                    what,
                    only.value.type_name()
                ),
            )),
        },
        items => Err(EngineError::new(
            ErrorCode::SINGLETON_REQUIRED,
            format!(
                "{} requires a single Boolean, found a collection of {}",
                what,
                items.len()
            ),
        )),
    }
}

/// Singleton string view: empty is `None`, non-strings are an error.
pub fn singleton_string(
    collection: &Collection,
    what: &str,
) -> Result<Option<String>, EngineError> {
    match collection.as_slice() {
        [] => Ok(None),
        [only] => match &only.value {
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(EngineError::new(
                ErrorCode::TYPE_MISMATCH,
                format!("{} requires a String, found {}", what, other.type_name()),
            )),
        },
        items => Err(EngineError::new(
            ErrorCode::SINGLETON_REQUIRED,
            format!(
                "{} requires a single String, found a collection of {}",
                what,
                items.len()
            ),
        )),
    }
}

/// Singleton integer view: empty is `None`, non-integers are an error.
pub fn singleton_integer(
    collection: &Collection,
    what: &str,
) -> Result<Option<i64>, EngineError> {
    match collection.as_slice() {
        [] => Ok(None),
        [only] => match only.value.as_integer() {
            Some(i) => Ok(Some(i)),
            None => Err(EngineError::new(
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "{} requires an Integer, found {}",
                    what,
                    only.value.type_name()
                ),
            )),
        },
        items => Err(EngineError::new(
            ErrorCode::SINGLETON_REQUIRED,
            format!(
                "{} requires a single Integer, found a collection of {}",
                what,
                items.len()
            ),
        )),
    }
}

/// A singleton boolean collection.
pub fn boolean_collection(value: bool) -> Collection {
    vec![BoxedValue::new(Value::Boolean(value)).with_type(TypeInfo::system(TypeName::Boolean))]
}

/// Project a tri-state boolean back to a collection: `None` is empty.
pub fn tri_boolean(value: Option<bool>) -> Collection {
    match value {
        Some(b) => boolean_collection(b),
        None => Vec::new(),
    }
}

/// A singleton integer collection.
pub fn integer_collection(value: i64) -> Collection {
    vec![BoxedValue::new(Value::Integer(value)).with_type(TypeInfo::system(TypeName::Integer))]
}

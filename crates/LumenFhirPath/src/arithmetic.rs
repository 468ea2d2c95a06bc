//! Arithmetic operators: `+ - * / div mod &` and unary polarity.
//!
//! All arithmetic is empty-propagating — any empty operand answers empty —
//! and division by zero answers empty rather than raising. Integer
//! arithmetic is checked; genuine overflow is reported as an error rather
//! than wrapping. Quantity arithmetic is delegated entirely to the
//! context's [`QuantityBackend`]; incommensurable units come back as
//! `None` and propagate as empty.

use crate::context::EvaluationContext;
use crate::date_operation;
use crate::interpreter::singleton_item;
use lumen_fhirpath_support::{BoxedValue, Collection, EngineError, ErrorCode, Value};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Both operands as singletons, or `None` when either side is empty.
fn singleton_pair<'c>(
    left: &'c Collection,
    right: &'c Collection,
    what: &str,
) -> Result<Option<(&'c BoxedValue, &'c BoxedValue)>, EngineError> {
    if left.is_empty() || right.is_empty() {
        return Ok(None);
    }
    let a = singleton_item(left, what)?;
    let b = singleton_item(right, what)?;
    Ok(Some((a, b)))
}

fn result(value: Value) -> Collection {
    vec![BoxedValue::new(value)]
}

fn type_error(op: &str, a: &Value, b: &Value) -> EngineError {
    EngineError::new(
        ErrorCode::TYPE_MISMATCH,
        format!(
            "cannot apply '{}' to {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ),
    )
}

fn overflow(op: &str) -> EngineError {
    EngineError::new(ErrorCode::INVALID_OPERAND, format!("'{}' overflowed", op))
}

/// Is either side a decimal, forcing decimal arithmetic?
fn wants_decimal(a: &Value, b: &Value) -> bool {
    matches!(a, Value::Decimal(_)) || matches!(b, Value::Decimal(_))
}

pub fn add_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let Some((a, b)) = singleton_pair(left, right, "'+'")? else {
        return Ok(Vec::new());
    };
    match (&a.value, &b.value) {
        (Value::String(x), Value::String(y)) => Ok(result(Value::String(format!("{}{}", x, y)))),
        // Mixed string/number coerces to string.
        (Value::String(x), y) if y.as_decimal().is_some() => {
            Ok(result(Value::String(format!("{}{}", x, y.to_display_string()))))
        }
        (x, Value::String(y)) if x.as_decimal().is_some() => {
            Ok(result(Value::String(format!("{}{}", x.to_display_string(), y))))
        }
        (Value::Integer(x), Value::Integer(y)) => x
            .checked_add(*y)
            .map(|v| result(Value::Integer(v)))
            .ok_or_else(|| overflow("+")),
        (
            Value::Quantity { value: xv, unit: xu },
            Value::Quantity { value: yv, unit: yu },
        ) => Ok(match context.quantity.add((*xv, xu), (*yv, yu)) {
            Some((value, unit)) => result(Value::Quantity { value, unit }),
            None => Vec::new(),
        }),
        (temporal @ (Value::Date(_) | Value::DateTime(_) | Value::Time(_)), Value::Quantity { value, unit }) => {
            Ok(match date_operation::add_quantity(temporal, *value, unit, 1) {
                Some(v) => result(v),
                None => Vec::new(),
            })
        }
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => {
                let sum = dx.checked_add(dy).ok_or_else(|| overflow("+"))?;
                if wants_decimal(x, y) {
                    Ok(result(Value::Decimal(sum)))
                } else {
                    Ok(result(Value::Integer(
                        sum.to_i64().ok_or_else(|| overflow("+"))?,
                    )))
                }
            }
            _ => Err(type_error("+", x, y)),
        },
    }
}

pub fn subtract_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let Some((a, b)) = singleton_pair(left, right, "'-'")? else {
        return Ok(Vec::new());
    };
    match (&a.value, &b.value) {
        (Value::Integer(x), Value::Integer(y)) => x
            .checked_sub(*y)
            .map(|v| result(Value::Integer(v)))
            .ok_or_else(|| overflow("-")),
        (
            Value::Quantity { value: xv, unit: xu },
            Value::Quantity { value: yv, unit: yu },
        ) => Ok(match context.quantity.subtract((*xv, xu), (*yv, yu)) {
            Some((value, unit)) => result(Value::Quantity { value, unit }),
            None => Vec::new(),
        }),
        (temporal @ (Value::Date(_) | Value::DateTime(_) | Value::Time(_)), Value::Quantity { value, unit }) => {
            Ok(match date_operation::add_quantity(temporal, *value, unit, -1) {
                Some(v) => result(v),
                None => Vec::new(),
            })
        }
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => {
                let diff = dx.checked_sub(dy).ok_or_else(|| overflow("-"))?;
                if wants_decimal(x, y) {
                    Ok(result(Value::Decimal(diff)))
                } else {
                    Ok(result(Value::Integer(
                        diff.to_i64().ok_or_else(|| overflow("-"))?,
                    )))
                }
            }
            _ => Err(type_error("-", x, y)),
        },
    }
}

pub fn multiply_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let Some((a, b)) = singleton_pair(left, right, "'*'")? else {
        return Ok(Vec::new());
    };
    match (&a.value, &b.value) {
        (Value::Integer(x), Value::Integer(y)) => x
            .checked_mul(*y)
            .map(|v| result(Value::Integer(v)))
            .ok_or_else(|| overflow("*")),
        (
            Value::Quantity { value: xv, unit: xu },
            Value::Quantity { value: yv, unit: yu },
        ) => Ok(match context.quantity.multiply((*xv, xu), (*yv, yu)) {
            Some((value, unit)) => result(Value::Quantity { value, unit }),
            None => Vec::new(),
        }),
        (Value::Quantity { value, unit }, scalar) | (scalar, Value::Quantity { value, unit })
            if scalar.as_decimal().is_some() =>
        {
            let factor = scalar.as_decimal().unwrap_or_default();
            let product = value.checked_mul(factor).ok_or_else(|| overflow("*"))?;
            Ok(result(Value::Quantity {
                value: product,
                unit: unit.clone(),
            }))
        }
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => {
                let product = dx.checked_mul(dy).ok_or_else(|| overflow("*"))?;
                if wants_decimal(x, y) {
                    Ok(result(Value::Decimal(product)))
                } else {
                    Ok(result(Value::Integer(
                        product.to_i64().ok_or_else(|| overflow("*"))?,
                    )))
                }
            }
            _ => Err(type_error("*", x, y)),
        },
    }
}

/// `/` always yields a decimal; dividing by zero yields empty.
pub fn divide_op(
    left: &Collection,
    right: &Collection,
    context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let Some((a, b)) = singleton_pair(left, right, "'/'")? else {
        return Ok(Vec::new());
    };
    match (&a.value, &b.value) {
        (
            Value::Quantity { value: xv, unit: xu },
            Value::Quantity { value: yv, unit: yu },
        ) => Ok(match context.quantity.divide((*xv, xu), (*yv, yu)) {
            Some((value, unit)) => result(Value::Quantity { value, unit }),
            None => Vec::new(),
        }),
        (Value::Quantity { value, unit }, scalar) if scalar.as_decimal().is_some() => {
            let divisor = scalar.as_decimal().unwrap_or_default();
            Ok(match value.checked_div(divisor) {
                Some(quotient) => result(Value::Quantity {
                    value: quotient,
                    unit: unit.clone(),
                }),
                None => Vec::new(),
            })
        }
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => Ok(match dx.checked_div(dy) {
                Some(quotient) => result(Value::Decimal(quotient)),
                None => Vec::new(),
            }),
            _ => Err(type_error("/", x, y)),
        },
    }
}

/// `div`: truncated integer division; zero divisor yields empty.
pub fn div_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let Some((a, b)) = singleton_pair(left, right, "'div'")? else {
        return Ok(Vec::new());
    };
    match (&a.value, &b.value) {
        (Value::Integer(x), Value::Integer(y)) => Ok(match x.checked_div(*y) {
            Some(quotient) => result(Value::Integer(quotient)),
            None => Vec::new(),
        }),
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => Ok(match dx.checked_div(dy) {
                Some(quotient) => {
                    let truncated = quotient.trunc();
                    result(Value::Integer(
                        truncated.to_i64().ok_or_else(|| overflow("div"))?,
                    ))
                }
                None => Vec::new(),
            }),
            _ => Err(type_error("div", x, y)),
        },
    }
}

/// `mod`: remainder; zero divisor yields empty.
pub fn mod_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let Some((a, b)) = singleton_pair(left, right, "'mod'")? else {
        return Ok(Vec::new());
    };
    match (&a.value, &b.value) {
        (Value::Integer(x), Value::Integer(y)) => Ok(match x.checked_rem(*y) {
            Some(remainder) => result(Value::Integer(remainder)),
            None => Vec::new(),
        }),
        (x, y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(dx), Some(dy)) => Ok(match dx.checked_rem(dy) {
                Some(remainder) => result(Value::Decimal(remainder)),
                None => Vec::new(),
            }),
            _ => Err(type_error("mod", x, y)),
        },
    }
}

/// `&`: string concatenation with empty treated as `''`.
pub fn concat_op(
    left: &Collection,
    right: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    let side = |collection: &Collection, what: &str| -> Result<String, EngineError> {
        if collection.is_empty() {
            return Ok(String::new());
        }
        let item = singleton_item(collection, what)?;
        match &item.value {
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_display_string()),
        }
    };
    let a = side(left, "'&'")?;
    let b = side(right, "'&'")?;
    Ok(result(Value::String(format!("{}{}", a, b))))
}

pub fn unary_plus(
    operand: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    if operand.is_empty() {
        return Ok(Vec::new());
    }
    let item = singleton_item(operand, "unary '+'")?;
    match &item.value {
        Value::Integer(_) | Value::Long(_) | Value::Decimal(_) | Value::Quantity { .. } => {
            Ok(vec![item.clone()])
        }
        other => Err(EngineError::new(
            ErrorCode::TYPE_MISMATCH,
            format!("unary '+' requires a number, found {}", other.type_name()),
        )),
    }
}

pub fn unary_minus(
    operand: &Collection,
    _context: &EvaluationContext,
) -> Result<Collection, EngineError> {
    if operand.is_empty() {
        return Ok(Vec::new());
    }
    let item = singleton_item(operand, "unary '-'")?;
    match &item.value {
        Value::Integer(i) => i
            .checked_neg()
            .map(|v| result(Value::Integer(v)))
            .ok_or_else(|| overflow("unary '-'")),
        Value::Long(i) => i
            .checked_neg()
            .map(|v| result(Value::Long(v)))
            .ok_or_else(|| overflow("unary '-'")),
        Value::Decimal(d) => Ok(result(Value::Decimal(-*d))),
        Value::Quantity { value, unit } => Ok(result(Value::Quantity {
            value: -*value,
            unit: unit.clone(),
        })),
        other => Err(EngineError::new(
            ErrorCode::TYPE_MISMATCH,
            format!("unary '-' requires a number, found {}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucum::UcumBackend;
    use lumen_fhirpath_support::BoxedValue;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ctx() -> EvaluationContext {
        EvaluationContext::create(
            Vec::new(),
            std::collections::HashMap::new(),
            None,
            Arc::new(UcumBackend::new()),
        )
    }

    fn ints(values: &[i64]) -> Collection {
        values
            .iter()
            .map(|i| BoxedValue::new(Value::Integer(*i)))
            .collect()
    }

    #[test]
    fn test_add_integers_stays_integer() {
        let out = add_op(&ints(&[2]), &ints(&[3]), &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Integer(5));
    }

    #[test]
    fn test_empty_operand_propagates() {
        assert!(add_op(&ints(&[1]), &Vec::new(), &ctx()).unwrap().is_empty());
        assert!(subtract_op(&Vec::new(), &ints(&[1]), &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_division_by_zero_is_empty() {
        assert!(divide_op(&ints(&[1]), &ints(&[0]), &ctx()).unwrap().is_empty());
        assert!(div_op(&ints(&[1]), &ints(&[0]), &ctx()).unwrap().is_empty());
        assert!(mod_op(&ints(&[1]), &ints(&[0]), &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_divide_always_yields_decimal() {
        let out = divide_op(&ints(&[7]), &ints(&[2]), &ctx()).unwrap();
        assert_eq!(out[0].value, Value::Decimal(dec!(3.5)));
    }

    #[test]
    fn test_mixed_string_number_coerces() {
        let left = vec![BoxedValue::new(Value::String("n=".into()))];
        let out = add_op(&left, &ints(&[4]), &ctx()).unwrap();
        assert_eq!(out[0].value, Value::String("n=4".into()));
    }
}

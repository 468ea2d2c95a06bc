//! Math functions over singleton numeric inputs.
//!
//! Results stay in `Decimal` wherever the operation is exact; the
//! transcendental functions (`exp`, `ln`, `log`, `power`, `sqrt`) route
//! through `f64` and convert back. Domain violations — square roots and
//! logarithms of negatives, fractional powers of negatives — answer empty.

use crate::interpreter::{integer_collection, singleton_item, EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{BoxedValue, Collection, EngineError, ErrorCode, Value};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

fn decimal_result(d: Decimal) -> Collection {
    vec![BoxedValue::new(Value::Decimal(d))]
}

/// Singleton numeric input as a decimal; empty propagates, non-numbers
/// are a type error.
fn input_decimal(
    invocation: &FunctionInvocation,
    name: &str,
) -> Result<Option<Decimal>, EngineError> {
    if invocation.input.is_empty() {
        return Ok(None);
    }
    let item =
        singleton_item(invocation.input, name).map_err(|e| e.or_range(invocation.range))?;
    match item.value.as_decimal() {
        Some(d) => Ok(Some(d)),
        None => Err(invocation.error(
            ErrorCode::TYPE_MISMATCH,
            format!("{} requires a number, found {}", name, item.value.type_name()),
        )),
    }
}

fn from_f64(value: f64) -> Collection {
    if !value.is_finite() {
        return Vec::new();
    }
    Decimal::from_f64(value).map(decimal_result).unwrap_or_default()
}

/// `abs()`: integers stay integers, quantities keep their unit.
pub fn abs_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    if invocation.input.is_empty() {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let item =
        singleton_item(invocation.input, "abs()").map_err(|e| e.or_range(invocation.range))?;
    let out = match &item.value {
        Value::Integer(i) => Value::Integer(i.abs()),
        Value::Long(i) => Value::Long(i.abs()),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        Value::Quantity { value, unit } => Value::Quantity {
            value: value.abs(),
            unit: unit.clone(),
        },
        other => {
            return Err(invocation.error(
                ErrorCode::TYPE_MISMATCH,
                format!("abs() requires a number, found {}", other.type_name()),
            ));
        }
    };
    Ok(invocation.unchanged(vec![BoxedValue::new(out)]))
}

pub fn ceiling_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "ceiling()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let value = d.ceil().to_i64().ok_or_else(|| {
        invocation.error(ErrorCode::INVALID_OPERAND, "ceiling() overflowed")
    })?;
    Ok(invocation.unchanged(integer_collection(value)))
}

pub fn floor_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "floor()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let value = d
        .floor()
        .to_i64()
        .ok_or_else(|| invocation.error(ErrorCode::INVALID_OPERAND, "floor() overflowed"))?;
    Ok(invocation.unchanged(integer_collection(value)))
}

/// `round([precision])`: half-away-from-zero at the given number of
/// decimal places.
pub fn round_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "round()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let precision = match invocation.argument(0) {
        Some(_) => {
            let collection = invocation.eval_argument(0)?;
            match crate::interpreter::singleton_integer(&collection, "round() precision")
                .map_err(|e| e.or_range(invocation.range))?
            {
                Some(p) if p >= 0 => p as u32,
                Some(p) => {
                    return Err(invocation.error(
                        ErrorCode::INVALID_PRECISION,
                        format!("round() precision must be non-negative, got {}", p),
                    ));
                }
                None => return Ok(invocation.unchanged(Vec::new())),
            }
        }
        None => 0,
    };
    let rounded = d.round_dp_with_strategy(
        precision,
        rust_decimal::RoundingStrategy::MidpointAwayFromZero,
    );
    Ok(invocation.unchanged(decimal_result(rounded)))
}

/// `sqrt()`: negative input answers empty.
pub fn sqrt_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "sqrt()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    if d.is_sign_negative() {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let value = d.to_f64().map(f64::sqrt).unwrap_or(f64::NAN);
    Ok(invocation.unchanged(from_f64(value)))
}

/// `truncate()`: drop the fractional part.
pub fn truncate_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "truncate()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let value = d
        .trunc()
        .to_i64()
        .ok_or_else(|| invocation.error(ErrorCode::INVALID_OPERAND, "truncate() overflowed"))?;
    Ok(invocation.unchanged(integer_collection(value)))
}

pub fn exp_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "exp()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let value = d.to_f64().map(f64::exp).unwrap_or(f64::NAN);
    Ok(invocation.unchanged(from_f64(value)))
}

/// `ln()`: non-positive input answers empty.
pub fn ln_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "ln()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    if d <= Decimal::ZERO {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let value = d.to_f64().map(f64::ln).unwrap_or(f64::NAN);
    Ok(invocation.unchanged(from_f64(value)))
}

/// `log(base)`.
pub fn log_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(d) = input_decimal(invocation, "log()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let base_collection = invocation.eval_argument(0)?;
    if base_collection.is_empty() {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let base = singleton_item(&base_collection, "log() base")
        .map_err(|e| e.or_range(invocation.range))?
        .value
        .as_decimal()
        .ok_or_else(|| invocation.error(ErrorCode::TYPE_MISMATCH, "log() base must be a number"))?;
    if d <= Decimal::ZERO || base <= Decimal::ZERO {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let value = match (d.to_f64(), base.to_f64()) {
        (Some(x), Some(b)) => x.log(b),
        _ => f64::NAN,
    };
    Ok(invocation.unchanged(from_f64(value)))
}

/// `power(exponent)`: integer results stay integers; a fractional power
/// of a negative number answers empty.
pub fn power_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    if invocation.input.is_empty() {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let base_item =
        singleton_item(invocation.input, "power()").map_err(|e| e.or_range(invocation.range))?;
    let exponent_collection = invocation.eval_argument(0)?;
    if exponent_collection.is_empty() {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let exponent_item = singleton_item(&exponent_collection, "power() exponent")
        .map_err(|e| e.or_range(invocation.range))?;

    if let (Value::Integer(base), Value::Integer(exponent)) = (&base_item.value, &exponent_item.value)
    {
        if *exponent >= 0 {
            if let Ok(exp) = u32::try_from(*exponent) {
                if let Some(result) = base.checked_pow(exp) {
                    return Ok(invocation.unchanged(integer_collection(result)));
                }
            }
            return Err(invocation.error(ErrorCode::INVALID_OPERAND, "power() overflowed"));
        }
    }

    let base = base_item.value.as_decimal().ok_or_else(|| {
        invocation.error(ErrorCode::TYPE_MISMATCH, "power() requires a number")
    })?;
    let exponent = exponent_item.value.as_decimal().ok_or_else(|| {
        invocation.error(ErrorCode::TYPE_MISMATCH, "power() exponent must be a number")
    })?;
    let value = match (base.to_f64(), exponent.to_f64()) {
        (Some(b), Some(e)) => b.powf(e),
        _ => f64::NAN,
    };
    Ok(invocation.unchanged(from_f64(value)))
}

//! Value conversion functions: `toX()` and their `convertsToX()` probes.
//!
//! Conversion is empty-propagating: an empty input answers empty, an
//! inconvertible singleton answers empty from `toX()` and `false` from
//! `convertsToX()`, and a collection input is a singleton error.

use crate::interpreter::{
    boolean_collection, singleton_item, EvalOutput, FunctionInvocation,
};
use crate::ucum;
use lumen_fhirpath_support::{
    BoxedValue, Collection, EngineError, PrecisionDate, PrecisionDateTime, PrecisionTime, Value,
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// The input as a singleton, or `None` for empty.
fn input_item<'a>(
    invocation: &'a FunctionInvocation,
    name: &str,
) -> Result<Option<&'a BoxedValue>, EngineError> {
    if invocation.input.is_empty() {
        return Ok(None);
    }
    singleton_item(invocation.input, name)
        .map(Some)
        .map_err(|e| e.or_range(invocation.range))
}

fn one(value: Value) -> Collection {
    vec![BoxedValue::new(value)]
}

// === Boolean ===

fn boolean_of(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(1) | Value::Long(1) => Some(true),
        Value::Integer(0) | Value::Long(0) => Some(false),
        Value::Decimal(d) => {
            if *d == Decimal::ONE {
                Some(true)
            } else if *d == Decimal::ZERO {
                Some(false)
            } else {
                None
            }
        }
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
            "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn to_boolean_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toBoolean()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match boolean_of(&item.value) {
        Some(b) => one(Value::Boolean(b)),
        None => Vec::new(),
    }))
}

pub fn converts_to_boolean_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToBoolean()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(boolean_of(&item.value).is_some())))
}

// === Integer ===

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) | Value::Long(i) => Some(*i),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn to_integer_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toInteger()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match integer_of(&item.value) {
        Some(i) => one(Value::Integer(i)),
        None => Vec::new(),
    }))
}

pub fn converts_to_integer_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToInteger()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(integer_of(&item.value).is_some())))
}

// === Decimal ===

fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(i) | Value::Long(i) => Some(Decimal::from(*i)),
        Value::Decimal(d) => Some(*d),
        Value::Boolean(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn to_decimal_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toDecimal()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match decimal_of(&item.value) {
        Some(d) => one(Value::Decimal(d)),
        None => Vec::new(),
    }))
}

pub fn converts_to_decimal_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToDecimal()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(decimal_of(&item.value).is_some())))
}

// === String ===

fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) | Value::Array(_) | Value::Null => None,
        other => Some(other.to_display_string()),
    }
}

pub fn to_string_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toString()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match string_of(&item.value) {
        Some(s) => one(Value::String(s)),
        None => Vec::new(),
    }))
}

pub fn converts_to_string_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToString()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(string_of(&item.value).is_some())))
}

// === Quantity ===

fn quantity_of(value: &Value) -> Option<(Decimal, String)> {
    match value {
        Value::Quantity { value, unit } => Some((*value, unit.clone())),
        Value::Integer(i) | Value::Long(i) => Some((Decimal::from(*i), "1".to_string())),
        Value::Decimal(d) => Some((*d, "1".to_string())),
        Value::String(s) => parse_quantity_string(s),
        _ => None,
    }
}

/// `"5.4 'mg'"`, `"10 days"`, or a bare number.
fn parse_quantity_string(s: &str) -> Option<(Decimal, String)> {
    let trimmed = s.trim();
    let (number, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((n, r)) => (n, r.trim()),
        None => (trimmed, ""),
    };
    let value = Decimal::from_str(number).ok()?;
    if rest.is_empty() {
        return Some((value, "1".to_string()));
    }
    let unit = rest.trim_matches('\'');
    if unit.is_empty() {
        return None;
    }
    if crate::parser::is_calendar_unit(unit) {
        return Some((value, ucum::calendar_to_ucum_unit(unit)));
    }
    Some((value, unit.to_string()))
}

/// `toQuantity([unit])`: with a unit argument the value is converted into
/// that unit; an impossible conversion answers empty.
pub fn to_quantity_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toQuantity()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let Some((value, unit)) = quantity_of(&item.value) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    match invocation.argument(0) {
        None => Ok(invocation.unchanged(one(Value::Quantity { value, unit }))),
        Some(_) => {
            let target_collection = invocation.eval_argument(0)?;
            let target = crate::interpreter::singleton_string(&target_collection, "toQuantity() unit")
                .map_err(|e| e.or_range(invocation.range))?;
            let Some(target) = target else {
                return Ok(invocation.unchanged(Vec::new()));
            };
            let converted = invocation.context.quantity.convert(value, &unit, &target);
            Ok(invocation.unchanged(match converted {
                Some(value) => one(Value::Quantity {
                    value,
                    unit: target,
                }),
                None => Vec::new(),
            }))
        }
    }
}

pub fn converts_to_quantity_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToQuantity()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(quantity_of(&item.value).is_some())))
}

// === Date / DateTime / Time ===

fn date_of(value: &Value) -> Option<PrecisionDate> {
    match value {
        Value::Date(d) => Some(d.clone()),
        Value::DateTime(dt) => Some(dt.date().clone()),
        Value::String(s) => {
            // A datetime string truncates to its date part.
            match s.split_once('T') {
                Some((date, _)) => PrecisionDate::parse(date),
                None => PrecisionDate::parse(s),
            }
        }
        _ => None,
    }
}

pub fn to_date_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toDate()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match date_of(&item.value) {
        Some(d) => one(Value::Date(d)),
        None => Vec::new(),
    }))
}

pub fn converts_to_date_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToDate()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(date_of(&item.value).is_some())))
}

fn date_time_of(value: &Value) -> Option<PrecisionDateTime> {
    match value {
        Value::DateTime(dt) => Some(dt.clone()),
        Value::Date(d) => PrecisionDateTime::parse(d.as_str()),
        Value::String(s) => PrecisionDateTime::parse(s),
        _ => None,
    }
}

pub fn to_date_time_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toDateTime()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match date_time_of(&item.value) {
        Some(dt) => one(Value::DateTime(dt)),
        None => Vec::new(),
    }))
}

pub fn converts_to_date_time_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToDateTime()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(date_time_of(&item.value).is_some())))
}

fn time_of(value: &Value) -> Option<PrecisionTime> {
    match value {
        Value::Time(t) => Some(t.clone()),
        Value::String(s) => PrecisionTime::parse(s.strip_prefix('T').unwrap_or(s)),
        _ => None,
    }
}

pub fn to_time_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "toTime()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(match time_of(&item.value) {
        Some(t) => one(Value::Time(t)),
        None => Vec::new(),
    }))
}

pub fn converts_to_time_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let Some(item) = input_item(invocation, "convertsToTime()")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(time_of(&item.value).is_some())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_string_forms() {
        assert_eq!(boolean_of(&Value::String("TRUE".into())), Some(true));
        assert_eq!(boolean_of(&Value::String("no".into())), Some(false));
        assert_eq!(boolean_of(&Value::String("maybe".into())), None);
        assert_eq!(boolean_of(&Value::Integer(1)), Some(true));
        assert_eq!(boolean_of(&Value::Integer(7)), None);
    }

    #[test]
    fn test_quantity_string_parsing() {
        assert_eq!(
            parse_quantity_string("5.4 'mg'"),
            Some(("5.4".parse().unwrap(), "mg".to_string()))
        );
        assert_eq!(
            parse_quantity_string("10 days"),
            Some((Decimal::from(10), "d".to_string()))
        );
        assert_eq!(parse_quantity_string("abc"), None);
    }

    #[test]
    fn test_datetime_string_truncates_to_date() {
        let date = date_of(&Value::String("2015-02-04T14:30:00Z".into())).unwrap();
        assert_eq!(date.as_str(), "2015-02-04");
    }
}

//! UCUM-backed implementation of the quantity backend.
//!
//! Wraps the octofhir-ucum crate behind [`QuantityBackend`] so the rest of
//! the engine never talks to UCUM directly. Calendar duration keywords
//! are normalized to their UCUM codes before every call, and any
//! conversion or dimension failure surfaces as `None`, which the owning
//! operator turns into an empty result.

use lumen_fhirpath_support::QuantityBackend;
use octofhir_ucum::fhir::{convert_quantity, FhirQuantity};
use octofhir_ucum::{is_comparable, unit_divide, unit_multiply, validate};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

/// Maps calendar duration units to their UCUM equivalents.
pub fn calendar_to_ucum_unit(unit: &str) -> String {
    match unit.to_lowercase().as_str() {
        "year" | "years" => "a".to_string(),
        "month" | "months" => "mo".to_string(),
        "week" | "weeks" => "wk".to_string(),
        "day" | "days" => "d".to_string(),
        "hour" | "hours" => "h".to_string(),
        "minute" | "minutes" => "min".to_string(),
        "second" | "seconds" => "s".to_string(),
        "millisecond" | "milliseconds" => "ms".to_string(),
        _ => unit.to_string(),
    }
}

/// Checks if a unit is a time duration unit (calendar keyword or UCUM
/// time code).
pub fn is_time_unit(unit: &str) -> bool {
    matches!(
        calendar_to_ucum_unit(unit).as_str(),
        "a" | "mo" | "wk" | "d" | "h" | "min" | "s" | "ms"
    )
}

/// The default quantity backend.
pub struct UcumBackend;

impl UcumBackend {
    pub fn new() -> Self {
        UcumBackend
    }

    /// Convert a value between commensurable units, rounding away the
    /// float noise the UCUM engine introduces.
    fn convert_value(value: Decimal, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            return Some(value);
        }
        let value_f64 = value.to_string().parse::<f64>().ok()?;
        let source = FhirQuantity::with_ucum_code(value_f64, from);
        let converted = convert_quantity(&source, to).ok()?;
        let rounded = (converted.value * 1e10).round() / 1e10;
        Decimal::try_from(rounded)
            .or_else(|_| Decimal::from_str(&format!("{:.10}", rounded)))
            .ok()
    }

    fn comparable(left: &str, right: &str) -> bool {
        is_comparable(left, right).unwrap_or(false)
    }

    /// Additive combination: convert `right` into `left`'s unit, then
    /// apply `combine`.
    fn additive(
        left: (Decimal, &str),
        right: (Decimal, &str),
        combine: fn(Decimal, Decimal) -> Option<Decimal>,
    ) -> Option<(Decimal, String)> {
        let left_unit = calendar_to_ucum_unit(left.1);
        let right_unit = calendar_to_ucum_unit(right.1);
        if !Self::comparable(&left_unit, &right_unit) {
            return None;
        }
        let right_value = Self::convert_value(right.0, &right_unit, &left_unit)?;
        let value = combine(left.0, right_value)?;
        Some((value, left_unit))
    }
}

impl Default for UcumBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantityBackend for UcumBackend {
    fn add(&self, left: (Decimal, &str), right: (Decimal, &str)) -> Option<(Decimal, String)> {
        Self::additive(left, right, Decimal::checked_add)
    }

    fn subtract(
        &self,
        left: (Decimal, &str),
        right: (Decimal, &str),
    ) -> Option<(Decimal, String)> {
        Self::additive(left, right, Decimal::checked_sub)
    }

    fn multiply(
        &self,
        left: (Decimal, &str),
        right: (Decimal, &str),
    ) -> Option<(Decimal, String)> {
        let left_unit = calendar_to_ucum_unit(left.1);
        let right_unit = calendar_to_ucum_unit(right.1);
        let value = left.0.checked_mul(right.0)?;
        let unit = unit_multiply(&left_unit, &right_unit).ok()?;
        Some((value, unit.expression))
    }

    fn divide(&self, left: (Decimal, &str), right: (Decimal, &str)) -> Option<(Decimal, String)> {
        let left_unit = calendar_to_ucum_unit(left.1);
        let right_unit = calendar_to_ucum_unit(right.1);
        let value = left.0.checked_div(right.0)?;
        let unit = unit_divide(&left_unit, &right_unit).ok()?;
        Some((value, unit.expression))
    }

    fn compare(&self, left: (Decimal, &str), right: (Decimal, &str)) -> Option<Ordering> {
        let left_unit = calendar_to_ucum_unit(left.1);
        let right_unit = calendar_to_ucum_unit(right.1);
        if !Self::comparable(&left_unit, &right_unit) {
            return None;
        }
        let right_value = Self::convert_value(right.0, &right_unit, &left_unit)?;
        Some(left.0.cmp(&right_value))
    }

    fn convert(&self, value: Decimal, from: &str, to: &str) -> Option<Decimal> {
        let from = calendar_to_ucum_unit(from);
        let to = calendar_to_ucum_unit(to);
        if !Self::comparable(&from, &to) {
            return None;
        }
        Self::convert_value(value, &from, &to)
    }

    fn validate_unit(&self, unit: &str) -> bool {
        is_time_unit(unit) || validate(unit).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_calendar_mapping() {
        assert_eq!(calendar_to_ucum_unit("years"), "a");
        assert_eq!(calendar_to_ucum_unit("millisecond"), "ms");
        assert_eq!(calendar_to_ucum_unit("mg"), "mg");
    }

    #[test]
    fn test_validate_unit() {
        let backend = UcumBackend::new();
        assert!(backend.validate_unit("mg"));
        assert!(backend.validate_unit("m/s"));
        assert!(backend.validate_unit("days"));
        assert!(!backend.validate_unit("invalid_unit"));
    }

    #[test]
    fn test_add_converts_into_left_unit() {
        let backend = UcumBackend::new();
        let (value, unit) = backend.add((dec!(1), "g"), (dec!(500), "mg")).unwrap();
        assert_eq!(unit, "g");
        assert_eq!(value, dec!(1.5));
    }

    #[test]
    fn test_dimension_mismatch_is_none() {
        let backend = UcumBackend::new();
        assert!(backend.add((dec!(1), "g"), (dec!(1), "m")).is_none());
        assert!(backend.compare((dec!(1), "s"), (dec!(1), "kg")).is_none());
    }

    #[test]
    fn test_same_unit_compare_skips_conversion() {
        let backend = UcumBackend::new();
        assert_eq!(
            backend.compare((dec!(2), "mg"), (dec!(1), "mg")),
            Some(Ordering::Greater)
        );
    }
}

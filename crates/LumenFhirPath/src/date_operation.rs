//! Temporal utilities: `now()`, `today()`, `timeOfDay()`, and the
//! date/time ± quantity arithmetic the `+`/`-` operators delegate here.
//!
//! Calendar arithmetic respects the operand's precision: adding a year to
//! `@2015` answers `@2016`, while adding hours to a date-precision value
//! is not meaningful and answers empty. Fractional quantity values are
//! truncated to whole units. Results are rebuilt as literal text and
//! re-parsed, so they stay precision-preserving values.

use crate::interpreter::{EvalOutput, FunctionInvocation};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use lumen_fhirpath_support::{
    BoxedValue, DatePrecision, EngineError, PrecisionDate, PrecisionDateTime, PrecisionTime,
    TimePrecision, Value,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// `now()`: the current instant with millisecond precision and local
/// offset.
pub fn now_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let text = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string();
    let value = PrecisionDateTime::parse(&text)
        .map(|dt| vec![BoxedValue::new(Value::DateTime(dt))])
        .unwrap_or_default();
    Ok(invocation.unchanged(value))
}

/// `today()`: the current date.
pub fn today_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let text = Local::now().format("%Y-%m-%d").to_string();
    let value = PrecisionDate::parse(&text)
        .map(|d| vec![BoxedValue::new(Value::Date(d))])
        .unwrap_or_default();
    Ok(invocation.unchanged(value))
}

/// `timeOfDay()`: the current time with millisecond precision.
pub fn time_of_day_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let text = Local::now().format("%H:%M:%S%.3f").to_string();
    let value = PrecisionTime::parse(&text)
        .map(|t| vec![BoxedValue::new(Value::Time(t))])
        .unwrap_or_default();
    Ok(invocation.unchanged(value))
}

/// `temporal ± quantity`. `sign` is `1` for addition, `-1` for
/// subtraction. `None` means the combination is not meaningful (wrong
/// unit for the precision, or a non-time unit) and propagates as empty.
pub fn add_quantity(temporal: &Value, amount: Decimal, unit: &str, sign: i64) -> Option<Value> {
    let steps = amount.trunc().to_i64()?.checked_mul(sign)?;
    match temporal {
        Value::Date(date) => add_to_date(date, steps, unit).map(Value::Date),
        Value::DateTime(datetime) => add_to_datetime(datetime, steps, unit).map(Value::DateTime),
        Value::Time(time) => add_to_time(time, steps, unit).map(Value::Time),
        _ => None,
    }
}

fn add_to_date(date: &PrecisionDate, steps: i64, unit: &str) -> Option<PrecisionDate> {
    match (unit, date.precision()) {
        ("a", _) => {
            let year = i64::from(date.year()).checked_add(steps)?;
            rebuild_date(i32::try_from(year).ok()?, date.month(), date.day())
        }
        ("mo", DatePrecision::Year) => {
            // Month arithmetic on a year-precision value moves whole years.
            add_to_date(date, steps / 12, "a")
        }
        ("mo", _) => {
            let months =
                i64::from(date.year()) * 12 + i64::from(date.month()? - 1) + steps;
            let year = i32::try_from(months.div_euclid(12)).ok()?;
            let month = (months.rem_euclid(12) + 1) as u32;
            rebuild_date(year, Some(month), date.day())
        }
        ("wk", DatePrecision::Day) => shift_full_date(date, steps.checked_mul(7)?),
        ("d", DatePrecision::Day) => shift_full_date(date, steps),
        _ => None,
    }
}

fn shift_full_date(date: &PrecisionDate, days: i64) -> Option<PrecisionDate> {
    let naive = date.to_naive_date()?;
    let shifted = naive.checked_add_signed(TimeDelta::days(days))?;
    PrecisionDate::parse(&shifted.format("%Y-%m-%d").to_string())
}

/// Rebuild a date at the same precision, clamping the day into the target
/// month (Jan 31 + 1 month is Feb 28/29).
fn rebuild_date(year: i32, month: Option<u32>, day: Option<u32>) -> Option<PrecisionDate> {
    let text = match (month, day) {
        (None, _) => format!("{:04}", year),
        (Some(m), None) => format!("{:04}-{:02}", year, m),
        (Some(m), Some(d)) => {
            let clamped = clamp_day(year, m, d);
            format!("{:04}-{:02}-{:02}", year, m, clamped)
        }
    };
    PrecisionDate::parse(&text)
}

fn clamp_day(year: i32, month: u32, day: u32) -> u32 {
    let last = last_day_of_month(year, month);
    day.min(last)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    for candidate in (28..=31).rev() {
        if NaiveDate::from_ymd_opt(year, month, candidate).is_some() {
            return candidate;
        }
    }
    28
}

fn add_to_datetime(
    datetime: &PrecisionDateTime,
    steps: i64,
    unit: &str,
) -> Option<PrecisionDateTime> {
    match unit {
        "a" | "mo" => {
            let date = add_to_date(datetime.date(), steps, unit)?;
            rebuild_datetime(&date, datetime.time(), datetime.offset_minutes())
        }
        "wk" | "d" => {
            let days = if unit == "wk" { steps.checked_mul(7)? } else { steps };
            let date = shift_full_date(datetime.date(), days)?;
            rebuild_datetime(&date, datetime.time(), datetime.offset_minutes())
        }
        "h" | "min" | "s" | "ms" => {
            let time = datetime.time()?;
            if datetime.date().precision() != DatePrecision::Day {
                return None;
            }
            let naive = NaiveDateTime::new(
                datetime.date().to_naive_date()?,
                time.to_naive_time()?,
            );
            let delta = sub_day_delta(steps, unit)?;
            let shifted = naive.checked_add_signed(delta)?;
            let date = PrecisionDate::parse(&shifted.date().format("%Y-%m-%d").to_string())?;
            let time = PrecisionTime::parse(&format_time(
                shifted.time(),
                time.precision(),
                has_millis(time),
            ))?;
            rebuild_datetime(&date, Some(&time), datetime.offset_minutes())
        }
        _ => None,
    }
}

fn add_to_time(time: &PrecisionTime, steps: i64, unit: &str) -> Option<PrecisionTime> {
    let delta = sub_day_delta(steps, unit)?;
    let naive = time.to_naive_time()?;
    // NaiveTime arithmetic wraps around midnight, which is what a
    // time-of-day value wants.
    let shifted = naive.overflowing_add_signed(delta).0;
    PrecisionTime::parse(&format_time(shifted, time.precision(), has_millis(time)))
}

fn sub_day_delta(steps: i64, unit: &str) -> Option<TimeDelta> {
    match unit {
        "h" => Some(TimeDelta::hours(steps)),
        "min" => Some(TimeDelta::minutes(steps)),
        "s" => Some(TimeDelta::seconds(steps)),
        "ms" => Some(TimeDelta::milliseconds(steps)),
        _ => None,
    }
}

fn has_millis(time: &PrecisionTime) -> bool {
    time.as_str().contains('.')
}

fn format_time(time: NaiveTime, precision: TimePrecision, millis: bool) -> String {
    match precision {
        TimePrecision::Hour => format!("{:02}", time.hour()),
        TimePrecision::Minute => format!("{:02}:{:02}", time.hour(), time.minute()),
        TimePrecision::Second if millis => format!(
            "{:02}:{:02}:{:02}.{:03}",
            time.hour(),
            time.minute(),
            time.second(),
            time.nanosecond() / 1_000_000
        ),
        TimePrecision::Second => {
            format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second())
        }
    }
}

fn rebuild_datetime(
    date: &PrecisionDate,
    time: Option<&PrecisionTime>,
    offset_minutes: Option<i32>,
) -> Option<PrecisionDateTime> {
    let mut text = date.as_str().to_string();
    if let Some(time) = time {
        text.push('T');
        text.push_str(time.as_str());
        match offset_minutes {
            Some(0) => text.push('Z'),
            Some(offset) => {
                let sign = if offset < 0 { '-' } else { '+' };
                let magnitude = offset.abs();
                text.push_str(&format!(
                    "{}{:02}:{:02}",
                    sign,
                    magnitude / 60,
                    magnitude % 60
                ));
            }
            None => {}
        }
    }
    PrecisionDateTime::parse(&text)
}

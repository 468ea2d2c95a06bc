//! Precision-preserving date and time values.
//!
//! FHIRPath temporal literals keep whatever precision they were written
//! with: `@2015`, `@2015-02`, and `@2015-02-04` are three different values,
//! and comparing values of different precision is indeterminate (the
//! comparison operators answer empty). The types here store the parsed
//! components, the precision level, and the original text, and implement
//! the precision-aware `compare` that the comparison operators build on.
//!
//! Timezone-qualified datetimes are normalized to a UTC instant before
//! comparison; chrono does the calendar arithmetic.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Precision of a [`PrecisionDate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// Precision of a [`PrecisionTime`].
///
/// Seconds and milliseconds count as a single precision level: the
/// language compares them as one decimal seconds value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
}

/// A date of year, year-month, or full precision.
#[derive(Debug, Clone)]
pub struct PrecisionDate {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
    text: Arc<str>,
}

impl PrecisionDate {
    /// Parse `YYYY`, `YYYY-MM`, or `YYYY-MM-DD`. Returns `None` for any
    /// other shape or out-of-range component.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '-');
        let year_str = parts.next()?;
        if year_str.len() != 4 {
            return None;
        }
        let year: i32 = year_str.parse().ok()?;
        let month = match parts.next() {
            None => None,
            Some(m) => {
                if m.len() != 2 {
                    return None;
                }
                let m: u32 = m.parse().ok()?;
                if !(1..=12).contains(&m) {
                    return None;
                }
                Some(m)
            }
        };
        let day = match parts.next() {
            None => None,
            Some(d) => {
                if d.len() != 2 {
                    return None;
                }
                let d: u32 = d.parse().ok()?;
                // Reject day components the calendar does not have.
                NaiveDate::from_ymd_opt(year, month?, d)?;
                Some(d)
            }
        };
        Some(Self {
            year,
            month,
            day,
            text: Arc::from(s),
        })
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month: Some(month),
            day: Some(day),
            text: Arc::from(format!("{:04}-{:02}-{:02}", year, month, day)),
        }
    }

    pub fn precision(&self) -> DatePrecision {
        match (self.month, self.day) {
            (None, _) => DatePrecision::Year,
            (Some(_), None) => DatePrecision::Month,
            (Some(_), Some(_)) => DatePrecision::Day,
        }
    }

    /// The text the value was written as.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    /// Lower bound of the interval this partial date denotes.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    /// Precision-aware comparison. `None` when the shared components are
    /// equal but the precisions differ (indeterminate).
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match self.year.cmp(&other.year) {
            Ordering::Equal => {}
            ord => return Some(ord),
        }
        match (self.month, other.month) {
            (None, None) => return Some(Ordering::Equal),
            (None, Some(_)) | (Some(_), None) => return None,
            (Some(a), Some(b)) => match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return Some(ord),
            },
        }
        match (self.day, other.day) {
            (None, None) => Some(Ordering::Equal),
            (None, Some(_)) | (Some(_), None) => None,
            (Some(a), Some(b)) => Some(a.cmp(&b)),
        }
    }
}

impl PartialEq for PrecisionDate {
    fn eq(&self, other: &Self) -> bool {
        self.year == other.year && self.month == other.month && self.day == other.day
    }
}

impl Eq for PrecisionDate {}

impl Hash for PrecisionDate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.year.hash(state);
        self.month.hash(state);
        self.day.hash(state);
    }
}

impl std::fmt::Display for PrecisionDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// A time-of-day of hour, minute, or second(.millisecond) precision.
/// Times never carry a timezone.
#[derive(Debug, Clone)]
pub struct PrecisionTime {
    hour: u32,
    minute: Option<u32>,
    second: Option<u32>,
    millisecond: Option<u32>,
    text: Arc<str>,
}

impl PrecisionTime {
    /// Parse `HH`, `HH:MM`, `HH:MM:SS`, or `HH:MM:SS.fff` (1-3 fraction
    /// digits). A timezone suffix makes the whole string invalid.
    pub fn parse(s: &str) -> Option<Self> {
        if s.contains('+') || s.contains('-') || s.ends_with('Z') {
            return None;
        }
        let mut parts = s.splitn(3, ':');
        let hour = parse_two_digits(parts.next()?)?;
        if hour > 23 {
            return None;
        }
        let minute = match parts.next() {
            None => None,
            Some(m) => {
                let m = parse_two_digits(m)?;
                if m > 59 {
                    return None;
                }
                Some(m)
            }
        };
        let (second, millisecond) = match parts.next() {
            None => (None, None),
            Some(sec) => {
                let (sec_str, frac) = match sec.split_once('.') {
                    Some((s, f)) => (s, Some(f)),
                    None => (sec, None),
                };
                let second = parse_two_digits(sec_str)?;
                if second > 59 {
                    return None;
                }
                let millisecond = match frac {
                    None => None,
                    Some(f) if (1..=3).contains(&f.len()) => {
                        // "5" means 500 ms, "05" means 50 ms.
                        let padded = format!("{:0<3}", f);
                        Some(padded.parse::<u32>().ok()?)
                    }
                    Some(_) => return None,
                };
                (Some(second), millisecond)
            }
        };
        Some(Self {
            hour,
            minute,
            second,
            millisecond,
            text: Arc::from(s),
        })
    }

    pub fn precision(&self) -> TimePrecision {
        match (self.minute, self.second) {
            (None, _) => TimePrecision::Hour,
            (Some(_), None) => TimePrecision::Minute,
            (Some(_), Some(_)) => TimePrecision::Second,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_milli_opt(
            self.hour,
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.millisecond.unwrap_or(0),
        )
    }

    /// Precision-aware comparison; seconds and milliseconds are one level.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match self.hour.cmp(&other.hour) {
            Ordering::Equal => {}
            ord => return Some(ord),
        }
        match (self.minute, other.minute) {
            (None, None) => return Some(Ordering::Equal),
            (None, Some(_)) | (Some(_), None) => return None,
            (Some(a), Some(b)) => match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return Some(ord),
            },
        }
        match (self.second, other.second) {
            (None, None) => Some(Ordering::Equal),
            (None, Some(_)) | (Some(_), None) => None,
            (Some(a), Some(b)) => {
                let left = a * 1000 + self.millisecond.unwrap_or(0);
                let right = b * 1000 + other.millisecond.unwrap_or(0);
                Some(left.cmp(&right))
            }
        }
    }
}

impl PartialEq for PrecisionTime {
    fn eq(&self, other: &Self) -> bool {
        self.hour == other.hour
            && self.minute == other.minute
            && self.second == other.second
            && self.millisecond.unwrap_or(0) == other.millisecond.unwrap_or(0)
    }
}

impl Eq for PrecisionTime {}

impl Hash for PrecisionTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hour.hash(state);
        self.minute.hash(state);
        self.second.hash(state);
        self.millisecond.unwrap_or(0).hash(state);
    }
}

impl std::fmt::Display for PrecisionTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// A datetime from year precision down to milliseconds, with an optional
/// timezone offset in minutes (`Z` is offset zero).
#[derive(Debug, Clone)]
pub struct PrecisionDateTime {
    date: PrecisionDate,
    time: Option<PrecisionTime>,
    /// Offset east of UTC in minutes; `None` when no timezone was written.
    offset_minutes: Option<i32>,
    text: Arc<str>,
}

impl PrecisionDateTime {
    /// Parse `YYYY[-MM[-DD[T[HH[:MM[:SS[.fff]]]][Z|±HH:MM]]]]`.
    ///
    /// A trailing `T` with no time component is accepted (a partial
    /// datetime of date precision).
    pub fn parse(s: &str) -> Option<Self> {
        let (date_part, rest) = match s.split_once('T') {
            Some((d, r)) => (d, Some(r)),
            None => (s, None),
        };
        let date = PrecisionDate::parse(date_part)?;
        let (time, offset_minutes) = match rest {
            None | Some("") => (None, None),
            Some(r) => {
                let (time_part, offset) = split_timezone(r);
                let offset_minutes = match offset {
                    Some(tz) => Some(parse_offset(tz)?),
                    None => None,
                };
                // A time component requires a full date before it.
                if date.precision() != DatePrecision::Day {
                    return None;
                }
                (Some(PrecisionTime::parse(time_part)?), offset_minutes)
            }
        };
        Some(Self {
            date,
            time,
            offset_minutes,
            text: Arc::from(s),
        })
    }

    pub fn date(&self) -> &PrecisionDate {
        &self.date
    }

    pub fn time(&self) -> Option<&PrecisionTime> {
        self.time.as_ref()
    }

    pub fn offset_minutes(&self) -> Option<i32> {
        self.offset_minutes
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The instant as a timezone-normalized `NaiveDateTime` in UTC, when
    /// date and time are both fully specified.
    pub fn to_utc(&self) -> Option<NaiveDateTime> {
        let date = self.date.to_naive_date()?;
        let time = self.time.as_ref()?;
        if self.date.precision() != DatePrecision::Day
            || time.precision() != TimePrecision::Second
        {
            return None;
        }
        let naive = NaiveDateTime::new(date, time.to_naive_time()?);
        let offset = TimeDelta::minutes(i64::from(self.offset_minutes.unwrap_or(0)));
        naive.checked_sub_signed(offset)
    }

    /// Precision-aware comparison. Fully-specified values on both sides
    /// compare as UTC instants; partial values compare component-wise and
    /// answer `None` across differing precisions.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.to_utc(), other.to_utc()) {
            return Some(a.cmp(&b));
        }
        match self.date.compare(&other.date)? {
            Ordering::Equal => {}
            ord => return Some(ord),
        }
        match (&self.time, &other.time) {
            (None, None) => Some(Ordering::Equal),
            (None, Some(_)) | (Some(_), None) => None,
            (Some(a), Some(b)) => a.compare(b),
        }
    }
}

impl PartialEq for PrecisionDateTime {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.to_utc(), other.to_utc()) {
            return a == b;
        }
        self.date == other.date
            && self.time == other.time
            && self.offset_minutes == other.offset_minutes
    }
}

impl Eq for PrecisionDateTime {}

impl Hash for PrecisionDateTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash the UTC instant when there is one so equal values collide.
        match self.to_utc() {
            Some(utc) => utc.hash(state),
            None => {
                self.date.hash(state);
                self.time.hash(state);
                self.offset_minutes.hash(state);
            }
        }
    }
}

impl std::fmt::Display for PrecisionDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn parse_two_digits(s: &str) -> Option<u32> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Split a time string into its clock part and an optional trailing
/// timezone (`Z`, `+HH:MM`, `-HH:MM`).
fn split_timezone(s: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = s.strip_suffix('Z') {
        return (stripped, Some("Z"));
    }
    if let Some(pos) = s.find(['+', '-']) {
        return (&s[..pos], Some(&s[pos..]));
    }
    (s, None)
}

fn parse_offset(tz: &str) -> Option<i32> {
    if tz == "Z" {
        return Some(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = parse_two_digits(hours)?.try_into().ok()?;
    let minutes: i32 = parse_two_digits(minutes)?.try_into().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_precisions() {
        assert_eq!(
            PrecisionDate::parse("2015").unwrap().precision(),
            DatePrecision::Year
        );
        assert_eq!(
            PrecisionDate::parse("2015-02").unwrap().precision(),
            DatePrecision::Month
        );
        assert_eq!(
            PrecisionDate::parse("2015-02-04").unwrap().precision(),
            DatePrecision::Day
        );
        assert!(PrecisionDate::parse("2015-13").is_none());
        assert!(PrecisionDate::parse("2015-02-30").is_none());
        assert!(PrecisionDate::parse("15-02-04").is_none());
    }

    #[test]
    fn test_date_compare_across_precisions() {
        let year = PrecisionDate::parse("2015").unwrap();
        let month = PrecisionDate::parse("2015-02").unwrap();
        let other_year = PrecisionDate::parse("2016").unwrap();
        assert_eq!(year.compare(&other_year), Some(Ordering::Less));
        // Same year, differing precision: indeterminate.
        assert_eq!(year.compare(&month), None);
    }

    #[test]
    fn test_time_parse_and_compare() {
        let a = PrecisionTime::parse("14:30:00").unwrap();
        let b = PrecisionTime::parse("14:30:00.500").unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        let hour = PrecisionTime::parse("14").unwrap();
        assert_eq!(hour.compare(&a), None);
        assert!(PrecisionTime::parse("14:30:00+01:00").is_none());
        assert!(PrecisionTime::parse("24:00").is_none());
    }

    #[test]
    fn test_datetime_timezone_normalization() {
        let utc = PrecisionDateTime::parse("2015-02-04T14:00:00Z").unwrap();
        let plus_nine = PrecisionDateTime::parse("2015-02-04T23:00:00+09:00").unwrap();
        assert_eq!(utc.compare(&plus_nine), Some(Ordering::Equal));
        assert_eq!(utc, plus_nine);
    }

    #[test]
    fn test_partial_datetime() {
        let partial = PrecisionDateTime::parse("2015-02-04T").unwrap();
        assert!(partial.time().is_none());
        let dated = PrecisionDateTime::parse("2015-02-04T08:30").unwrap();
        assert_eq!(partial.compare(&dated), None);
        // Timezone without a full date is malformed.
        assert!(PrecisionDateTime::parse("2015-02T08:30Z").is_none());
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DAY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("day key pattern compiles"));

/// Timestamp layouts without an offset. The date part is taken as written.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    Empty,
    Unparseable(String),
    NotACalendarDay(String),
    OutOfRange(i64),
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateError::Empty => write!(f, "empty date"),
            DateError::Unparseable(s) => write!(f, "unparseable date: {s:?}"),
            DateError::NotACalendarDay(s) => write!(f, "not a calendar day: {s}"),
            DateError::OutOfRange(ms) => write!(f, "timestamp out of range: {ms}"),
        }
    }
}

impl std::error::Error for DateError {}

/// A calendar day in the civil calendar, rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn next(self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// Inclusive walk from `self` to `end`. Empty when `end` is before `self`.
    pub fn through(self, end: DayKey) -> impl Iterator<Item = DayKey> {
        let mut cursor = Some(self);
        std::iter::from_fn(move || {
            let day = cursor.filter(|d| *d <= end)?;
            cursor = day.next();
            Some(day)
        })
    }

    /// Number of days in `[self, end]`; zero or negative when inverted.
    pub fn days_through(self, end: DayKey) -> i64 {
        (end.0 - self.0).num_days() + 1
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = DateError;

    /// Strict canonical form only. Use [`DateNormalizer`] for anything looser.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !DAY_KEY_RE.is_match(s) {
            return Err(DateError::Unparseable(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| DateError::NotACalendarDay(s.to_string()))
    }
}

impl TryFrom<String> for DayKey {
    type Error = DateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

/// Any date representation a caller may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateInput {
    EpochMs(i64),
    Text(String),
}

impl DateInput {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DateError> {
        match value {
            serde_json::Value::String(s) => Ok(DateInput::Text(s.clone())),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(DateInput::EpochMs)
                .ok_or_else(|| DateError::Unparseable(n.to_string())),
            other => Err(DateError::Unparseable(other.to_string())),
        }
    }
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

/// Converts date representations to day keys using the wall-clock calendar of
/// one civil zone: the host's local zone, or a fixed offset when configured.
///
/// Instants (offset-bearing timestamps, epoch millis) are shifted into that
/// zone before the day is read. Naive timestamps already are wall-clock time,
/// so their date part is used as is. Nothing is ever read off the UTC
/// rendering of an instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateNormalizer {
    offset: Option<FixedOffset>,
}

impl DateNormalizer {
    pub fn host_local() -> Self {
        Self { offset: None }
    }

    pub fn fixed(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }

    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::fixed)
    }

    pub fn to_day_key(&self, input: &DateInput) -> Result<DayKey, DateError> {
        match input {
            DateInput::Text(s) => self.parse_str(s),
            DateInput::EpochMs(ms) => {
                let instant =
                    DateTime::<Utc>::from_timestamp_millis(*ms).ok_or(DateError::OutOfRange(*ms))?;
                Ok(self.day_of(instant))
            }
        }
    }

    pub fn parse_str(&self, raw: &str) -> Result<DayKey, DateError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DateError::Empty);
        }
        if DAY_KEY_RE.is_match(s) {
            return s.parse();
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(self.day_of(dt.with_timezone(&Utc)));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Ok(self.day_of(dt.with_timezone(&Utc)));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|ndt| DayKey(ndt.date()))
            .ok_or_else(|| DateError::Unparseable(s.to_string()))
    }

    /// The civil day `instant` falls on in this normalizer's zone.
    pub fn day_of(&self, instant: DateTime<Utc>) -> DayKey {
        match self.offset {
            Some(offset) => DayKey(instant.with_timezone(&offset).date_naive()),
            None => DayKey(instant.with_timezone(&Local).date_naive()),
        }
    }
}

/// Inclusive `[start, end]` range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DayKey,
    pub end: DayKey,
}

impl DayWindow {
    pub fn new(start: DayKey, end: DayKey) -> Self {
        debug_assert!(start <= end, "DayWindow start must not be after end");
        Self { start, end }
    }

    /// Smallest window covering every day in `days`; `None` when empty.
    pub fn spanning<'a>(days: impl IntoIterator<Item = &'a DayKey>) -> Option<Self> {
        let mut iter = days.into_iter();
        let first = *iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), d| (lo.min(*d), hi.max(*d)));
        Some(Self { start, end })
    }

    pub fn contains(&self, day: DayKey) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn intersects(&self, other: &DayWindow) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> DayKey {
        s.parse().unwrap()
    }

    fn utc_minus_5() -> DateNormalizer {
        DateNormalizer::from_offset_minutes(-300).unwrap()
    }

    #[test]
    fn canonical_key_passes_through() {
        let n = DateNormalizer::host_local();
        let key = n.to_day_key(&"2024-01-31".into()).unwrap();
        assert_eq!(key.to_string(), "2024-01-31");
    }

    #[test]
    fn canonical_shape_but_impossible_day() {
        let n = DateNormalizer::host_local();
        assert_eq!(
            n.parse_str("2024-02-30"),
            Err(DateError::NotACalendarDay("2024-02-30".into()))
        );
        assert!(n.parse_str("2023-02-29").is_err());
        assert!(n.parse_str("2024-02-29").is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        let n = DateNormalizer::host_local();
        assert!(matches!(n.parse_str("next tuesday"), Err(DateError::Unparseable(_))));
        assert_eq!(n.parse_str("   "), Err(DateError::Empty));
        assert!("2024-1-5".parse::<DayKey>().is_err());
    }

    #[test]
    fn late_evening_behind_utc_keeps_local_day() {
        let n = utc_minus_5();
        let key = n.parse_str("2024-03-01T23:30:00-05:00").unwrap();
        assert_eq!(key, day("2024-03-01"));

        // The same instant read off its UTC rendering lands a day later.
        let naive_utc = DateTime::parse_from_rfc3339("2024-03-01T23:30:00-05:00")
            .unwrap()
            .with_timezone(&Utc)
            .date_naive();
        assert_eq!(naive_utc.to_string(), "2024-03-02");
    }

    #[test]
    fn naive_timestamp_uses_written_date() {
        let n = utc_minus_5();
        assert_eq!(n.parse_str("2024-03-01T23:30:00").unwrap(), day("2024-03-01"));
        assert_eq!(n.parse_str("2024-03-01 23:30").unwrap(), day("2024-03-01"));
        assert_eq!(n.parse_str("2024-03-01T23:30:00.250").unwrap(), day("2024-03-01"));
    }

    #[test]
    fn utc_serialized_local_midnight_is_recovered() {
        // Local midnight of 2024-03-01 in UTC+2, serialized as UTC.
        let n = DateNormalizer::from_offset_minutes(120).unwrap();
        assert_eq!(n.parse_str("2024-02-29T22:00:00.000Z").unwrap(), day("2024-03-01"));
    }

    #[test]
    fn epoch_millis_use_zone() {
        // 2024-03-02T04:30:00Z == 2024-03-01T23:30:00-05:00
        let ms = 1_709_353_800_000;
        assert_eq!(utc_minus_5().to_day_key(&DateInput::EpochMs(ms)).unwrap(), day("2024-03-01"));
        let utc = DateNormalizer::from_offset_minutes(0).unwrap();
        assert_eq!(utc.to_day_key(&DateInput::EpochMs(ms)).unwrap(), day("2024-03-02"));
    }

    #[test]
    fn offset_without_colon() {
        let n = utc_minus_5();
        assert_eq!(n.parse_str("2024-03-01T23:30:00-0500").unwrap(), day("2024-03-01"));
    }

    #[test]
    fn date_input_from_json() {
        assert_eq!(
            DateInput::from_json(&serde_json::json!("2024-01-01")).unwrap(),
            DateInput::Text("2024-01-01".into())
        );
        assert_eq!(
            DateInput::from_json(&serde_json::json!(5)).unwrap(),
            DateInput::EpochMs(5)
        );
        assert!(DateInput::from_json(&serde_json::json!(null)).is_err());
        assert!(DateInput::from_json(&serde_json::json!(1.5)).is_err());
    }

    #[test]
    fn day_key_serde_is_a_plain_string() {
        let key = day("2024-12-31");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2024-12-31\"");
        let back: DayKey = serde_json::from_str("\"2024-12-31\"").unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<DayKey>("\"2024-13-01\"").is_err());
    }

    #[test]
    fn through_is_inclusive_across_year_end() {
        let days: Vec<String> = day("2023-12-30")
            .through(day("2024-01-02"))
            .map(|d| d.to_string())
            .collect();
        assert_eq!(days, ["2023-12-30", "2023-12-31", "2024-01-01", "2024-01-02"]);
        assert_eq!(day("2024-01-02").through(day("2024-01-01")).count(), 0);
        assert_eq!(day("2024-02-28").days_through(day("2024-03-01")), 3);
    }

    #[test]
    fn window_spanning_and_intersection() {
        let days = [day("2024-07-05"), day("2024-07-01"), day("2024-07-03")];
        let w = DayWindow::spanning(&days).unwrap();
        assert_eq!(w, DayWindow::new(day("2024-07-01"), day("2024-07-05")));
        assert!(w.contains(day("2024-07-05")));
        assert!(!w.contains(day("2024-07-06")));

        let touching = DayWindow::new(day("2024-07-05"), day("2024-07-09"));
        let after = DayWindow::new(day("2024-07-06"), day("2024-07-09"));
        assert!(w.intersects(&touching)); // inclusive ends
        assert!(!w.intersects(&after));
        assert!(DayWindow::spanning(&[]).is_none());
    }
}

//! Converts legacy range-based occupations (`type` + `startDate`/`endDate`)
//! into explicit day lists.

use std::fmt;

use serde_json::{Map, Value};

use crate::dates::{DateError, DateInput, DateNormalizer, DayKey};
use crate::limits::MAX_DAYS_PER_OCCUPATION;
use crate::model::{Occupation, OccupationType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    NotAList,
    NotAnObject { index: usize },
    UnknownType { index: usize, value: String },
    BadDate {
        index: usize,
        field: &'static str,
        source: DateError,
    },
    HalfRange { index: usize },
    InvertedRange {
        index: usize,
        start: DayKey,
        end: DayKey,
    },
    RangeTooLong { index: usize, days: i64 },
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::NotAList => write!(f, "occupations is neither a list nor an object"),
            ExpandError::NotAnObject { index } => write!(f, "entry {index}: not an object"),
            ExpandError::UnknownType { index, value } => {
                write!(f, "entry {index}: unknown occupation type {value}")
            }
            ExpandError::BadDate { index, field, source } => {
                write!(f, "entry {index}: {field}: {source}")
            }
            ExpandError::HalfRange { index } => {
                write!(f, "entry {index}: startDate and endDate must be given together")
            }
            ExpandError::InvertedRange { index, start, end } => {
                write!(f, "entry {index}: endDate {end} is before startDate {start}")
            }
            ExpandError::RangeTooLong { index, days } => {
                write!(f, "entry {index}: range of {days} days exceeds {MAX_DAYS_PER_OCCUPATION}")
            }
        }
    }
}

impl std::error::Error for ExpandError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Some entry already carries a `dates` list; the record is left alone.
    AlreadyCanonical,
    /// Unsanitized: may still hold `standby` or empty entries.
    Expanded(Vec<Occupation>),
}

/// True when any entry carries a `dates` list. Decided once per resource.
pub fn is_canonical(entries: &[Value]) -> bool {
    entries
        .iter()
        .any(|e| e.get("dates").is_some_and(Value::is_array))
}

/// Expand one resource's legacy occupations.
///
/// `null` means no occupations; a bare object is read as a one-entry list.
/// Entries without a range become an empty `standby` entry, which the next
/// sanitizing write drops.
pub fn expand(legacy: &Value, normalizer: &DateNormalizer) -> Result<Expansion, ExpandError> {
    let entries: &[Value] = match legacy {
        Value::Null => &[],
        Value::Array(items) => items,
        Value::Object(_) => std::slice::from_ref(legacy),
        _ => return Err(ExpandError::NotAList),
    };
    if is_canonical(entries) {
        return Ok(Expansion::AlreadyCanonical);
    }
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| expand_entry(index, entry, normalizer))
        .collect::<Result<Vec<_>, _>>()
        .map(Expansion::Expanded)
}

fn expand_entry(index: usize, entry: &Value, normalizer: &DateNormalizer) -> Result<Occupation, ExpandError> {
    let obj = entry.as_object().ok_or(ExpandError::NotAnObject { index })?;

    let kind = match obj.get("type") {
        None | Some(Value::Null) => OccupationType::Standby,
        Some(Value::String(s)) => s.parse().map_err(|_| ExpandError::UnknownType {
            index,
            value: s.clone(),
        })?,
        Some(other) => {
            return Err(ExpandError::UnknownType {
                index,
                value: other.to_string(),
            });
        }
    };

    let start = date_field(obj, "startDate", index, normalizer)?;
    let end = date_field(obj, "endDate", index, normalizer)?;

    match (start, end) {
        (Some(start), Some(end)) => {
            if end < start {
                return Err(ExpandError::InvertedRange { index, start, end });
            }
            let days = start.days_through(end);
            if days > MAX_DAYS_PER_OCCUPATION as i64 {
                return Err(ExpandError::RangeTooLong { index, days });
            }
            Ok(Occupation::new(kind, start.through(end)))
        }
        (None, None) => Ok(Occupation::new(OccupationType::Standby, [])),
        _ => Err(ExpandError::HalfRange { index }),
    }
}

fn date_field(
    obj: &Map<String, Value>,
    field: &'static str,
    index: usize,
    normalizer: &DateNormalizer,
) -> Result<Option<DayKey>, ExpandError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => DateInput::from_json(value)
            .and_then(|input| normalizer.to_day_key(&input))
            .map(Some)
            .map_err(|source| ExpandError::BadDate { index, field, source }),
    }
}

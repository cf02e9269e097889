use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

use crate::dates::{DateInput, DateNormalizer, DayKey};
use crate::engine::EngineError;
use crate::model::{Occupation, OccupationType};

/// Parse untrusted occupation entries (`{"type": .., "dates": [..]}`).
///
/// Entries that are not objects, lack a `dates` list, or carry an unknown type
/// are dropped. A date inside a well-formed entry that cannot be normalized
/// fails the whole batch with `occupations[i].dates[j]` as the field. The
/// result is not yet sanitized.
pub fn parse_raw(raw: &[Value], normalizer: &DateNormalizer) -> Result<Vec<Occupation>, EngineError> {
    let mut parsed = Vec::with_capacity(raw.len());
    for (index, entry) in raw.iter().enumerate() {
        if let Some(occupation) = parse_entry(index, entry, normalizer)? {
            parsed.push(occupation);
        }
    }
    Ok(parsed)
}

fn parse_entry(index: usize, entry: &Value, normalizer: &DateNormalizer) -> Result<Option<Occupation>, EngineError> {
    let Some(obj) = entry.as_object() else {
        warn!(index, "dropping occupation entry that is not an object");
        return Ok(None);
    };
    let Some(dates) = obj.get("dates").and_then(Value::as_array) else {
        warn!(index, "dropping occupation entry without a dates list");
        return Ok(None);
    };
    let kind = match obj.get("type").and_then(Value::as_str).map(str::parse::<OccupationType>) {
        Some(Ok(kind)) => kind,
        _ => {
            warn!(index, "dropping occupation entry with missing or unknown type");
            return Ok(None);
        }
    };

    let mut days = BTreeSet::new();
    for (position, value) in dates.iter().enumerate() {
        let day = DateInput::from_json(value)
            .and_then(|input| normalizer.to_day_key(&input))
            .map_err(|source| EngineError::InvalidDate {
                field: format!("occupations[{index}].dates[{position}]"),
                source,
            })?;
        days.insert(day);
    }
    Ok(Some(Occupation { kind, dates: days }))
}

/// Bring occupations into stored form:
/// - `standby` entries are dropped,
/// - entries of the same type are merged,
/// - a day held by several hard-block types stays only in the first
///   (by [`OccupationType`] order),
/// - entries left without dates are dropped.
///
/// Output is ordered by type. `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(occupations: impl IntoIterator<Item = Occupation>) -> Vec<Occupation> {
    let mut by_kind: BTreeMap<OccupationType, BTreeSet<DayKey>> = BTreeMap::new();
    for occ in occupations {
        if occ.kind == OccupationType::Standby {
            continue;
        }
        by_kind.entry(occ.kind).or_default().extend(occ.dates);
    }

    let mut claimed = BTreeSet::new();
    for (_, dates) in by_kind.iter_mut().filter(|(kind, _)| kind.is_hard_block()) {
        dates.retain(|day| claimed.insert(*day));
    }

    by_kind
        .into_iter()
        .filter(|(_, dates)| !dates.is_empty())
        .map(|(kind, dates)| Occupation { kind, dates })
        .collect()
}

/// Occupations of a vehicle created without explicit input: one `use`
/// entry, no dates.
pub fn default_occupations() -> Vec<Occupation> {
    vec![Occupation {
        kind: OccupationType::Use,
        dates: BTreeSet::new(),
    }]
}

/// Days that are both in `use` and hard-blocked, with the blocking type.
/// Not rejected on write, but worth flagging: the block wins at check time.
pub fn mixed_days(occupations: &[Occupation]) -> Vec<(DayKey, OccupationType)> {
    let usage: BTreeSet<DayKey> = occupations
        .iter()
        .filter(|o| o.kind == OccupationType::Use)
        .flat_map(|o| o.dates.iter().copied())
        .collect();
    let mut mixed = Vec::new();
    for occ in occupations.iter().filter(|o| o.kind.is_hard_block()) {
        for day in occ.dates.intersection(&usage) {
            mixed.push((*day, occ.kind));
        }
    }
    mixed.sort();
    mixed.dedup_by_key(|(day, _)| *day);
    mixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(s: &str) -> DayKey {
        s.parse().unwrap()
    }

    fn normalizer() -> DateNormalizer {
        DateNormalizer::from_offset_minutes(0).unwrap()
    }

    fn as_set(occs: &[Occupation]) -> BTreeSet<(OccupationType, Vec<DayKey>)> {
        occs.iter()
            .map(|o| (o.kind, o.dates.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn malformed_entries_dropped() {
        let raw = vec![
            json!("use"),
            json!({"type": "use"}),
            json!({"type": "use", "dates": "2024-01-01"}),
            json!({"type": "holiday", "dates": ["2024-01-01"]}),
            json!({"dates": ["2024-01-01"]}),
            json!({"type": "rental", "dates": ["2024-01-01"]}),
        ];
        let parsed = parse_raw(&raw, &normalizer()).unwrap();
        assert_eq!(parsed, vec![Occupation::new(OccupationType::Rental, [day("2024-01-01")])]);
    }

    #[test]
    fn dates_normalized_and_deduplicated() {
        let raw = vec![json!({
            "type": "use",
            "dates": ["2024-01-01", "2024-01-01T10:00:00", "2024-01-01T23:00:00Z", 1704153600000i64]
        })];
        let parsed = sanitize(parse_raw(&raw, &normalizer()).unwrap());
        // 1704153600000 == 2024-01-02T00:00:00Z
        assert_eq!(
            parsed,
            vec![Occupation::new(OccupationType::Use, [day("2024-01-01"), day("2024-01-02")])]
        );
    }

    #[test]
    fn standby_and_empty_never_survive() {
        let raw = vec![
            json!({"type": "standby", "dates": ["2024-01-01"]}),
            json!({"type": "inspection", "dates": []}),
        ];
        assert!(sanitize(parse_raw(&raw, &normalizer()).unwrap()).is_empty());
    }

    #[test]
    fn bad_date_in_a_valid_entry_names_its_position() {
        let raw = vec![
            json!({"type": "use", "dates": ["2024-01-01"]}),
            json!({"type": "maintenance", "dates": ["2024-02-01", "2024-02-30"]}),
        ];
        let err = parse_raw(&raw, &normalizer()).unwrap_err();
        assert_eq!(err.field(), Some("occupations[1].dates[1]"));
        assert!(matches!(err, EngineError::InvalidDate { .. }));

        let null_date = vec![json!({"type": "rental", "dates": [null]})];
        let err = parse_raw(&null_date, &normalizer()).unwrap_err();
        assert_eq!(err.field(), Some("occupations[0].dates[0]"));
    }

    #[test]
    fn same_type_entries_merge() {
        let out = sanitize(vec![
            Occupation::new(OccupationType::Use, [day("2024-01-02")]),
            Occupation::new(OccupationType::Service, [day("2024-01-05")]),
            Occupation::new(OccupationType::Use, [day("2024-01-01"), day("2024-01-02")]),
        ]);
        assert_eq!(
            out,
            vec![
                Occupation::new(OccupationType::Use, [day("2024-01-01"), day("2024-01-02")]),
                Occupation::new(OccupationType::Service, [day("2024-01-05")]),
            ]
        );
    }

    #[test]
    fn day_held_by_one_hard_block_only() {
        let out = sanitize(vec![
            Occupation::new(OccupationType::Inspection, [day("2024-03-01"), day("2024-03-02")]),
            Occupation::new(OccupationType::Maintenance, [day("2024-03-01")]),
            Occupation::new(OccupationType::Use, [day("2024-03-01")]),
        ]);
        assert_eq!(
            out,
            vec![
                Occupation::new(OccupationType::Use, [day("2024-03-01")]),
                Occupation::new(OccupationType::Maintenance, [day("2024-03-01")]),
                Occupation::new(OccupationType::Inspection, [day("2024-03-02")]),
            ]
        );
    }

    #[test]
    fn hard_block_emptied_by_exclusivity_is_dropped() {
        let out = sanitize(vec![
            Occupation::new(OccupationType::Accident, [day("2024-03-01")]),
            Occupation::new(OccupationType::Service, [day("2024-03-01")]),
        ]);
        assert_eq!(out, vec![Occupation::new(OccupationType::Service, [day("2024-03-01")])]);
    }

    #[test]
    fn sanitize_is_idempotent_and_order_independent() {
        // Small deterministic generator over types and a 10-day pool.
        let pool: Vec<DayKey> = day("2024-01-01").through(day("2024-01-10")).collect();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let n_entries = (next() % 6) as usize;
            let mut input = Vec::new();
            for _ in 0..n_entries {
                let kind = OccupationType::ALL[(next() % 8) as usize];
                let n_days = (next() % 4) as usize;
                let dates = (0..n_days).map(|_| pool[(next() % 10) as usize]);
                input.push(Occupation::new(kind, dates));
            }

            let once = sanitize(input.clone());
            let twice = sanitize(once.clone());
            assert_eq!(as_set(&once), as_set(&twice));

            let mut reversed = input;
            reversed.reverse();
            assert_eq!(as_set(&sanitize(reversed)), as_set(&once));
        }
    }

    #[test]
    fn mixed_days_flag_use_under_block() {
        let occs = sanitize(vec![
            Occupation::new(OccupationType::Use, [day("2024-05-10"), day("2024-05-11")]),
            Occupation::new(OccupationType::Maintenance, [day("2024-05-10")]),
            Occupation::new(OccupationType::Rental, [day("2024-05-12")]),
        ]);
        assert_eq!(mixed_days(&occs), vec![(day("2024-05-10"), OccupationType::Maintenance)]);
    }

    #[test]
    fn default_is_single_empty_use() {
        let d = default_occupations();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].kind, OccupationType::Use);
        assert!(d[0].dates.is_empty());
        // Would not survive a sanitizing write.
        assert!(sanitize(d).is_empty());
    }
}

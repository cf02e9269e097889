use std::collections::BTreeSet;
use std::sync::Arc;

use crate::dates::DayKey;
use crate::model::*;

/// Per-day vehicle verdicts. A hard block is reported first and never waived;
/// otherwise a `use` day conflicts unless this tour already schedules the
/// vehicle that day. At most one conflict per day.
pub fn vehicle_conflicts(
    vehicle: &ResourceState,
    days: &BTreeSet<DayKey>,
    self_scheduled: &BTreeSet<DayKey>,
) -> Vec<ConflictRecord> {
    let usage = vehicle.usage_days();
    let blocks = vehicle.hard_block_days();
    let mut out = Vec::new();

    for &day in days {
        if let Some(&block) = blocks.get(&day) {
            out.push(ConflictRecord {
                resource_kind: ResourceKind::Vehicle,
                resource_id: vehicle.id.clone(),
                display_name: vehicle.display_name().to_string(),
                date: day,
                message: format!("vehicle unavailable on {day} ({block})"),
                reason: ConflictReason::HardBlock(block),
            });
            continue;
        }
        if usage.contains(&day) && !self_scheduled.contains(&day) {
            out.push(ConflictRecord {
                resource_kind: ResourceKind::Vehicle,
                resource_id: vehicle.id.clone(),
                display_name: vehicle.display_name().to_string(),
                date: day,
                message: format!("vehicle already in use on {day}"),
                reason: ConflictReason::InUse,
            });
        }
    }
    out
}

/// Per-day guide verdicts from the bookings that assign the guide. Bookings
/// of `own_tour` never conflict with it.
pub fn guide_conflicts(
    guide_id: &str,
    display_name: &str,
    bookings: &[Arc<Booking>],
    days: &BTreeSet<DayKey>,
    own_tour: &str,
) -> Vec<ConflictRecord> {
    days.iter()
        .filter(|&&day| bookings.iter().any(|b| b.tour_id != own_tour && b.covers(day)))
        .map(|&day| ConflictRecord {
            resource_kind: ResourceKind::Guide,
            resource_id: guide_id.to_string(),
            display_name: display_name.to_string(),
            date: day,
            message: format!("guide already booked on {day}"),
            reason: ConflictReason::Booked,
        })
        .collect()
}

use std::collections::{BTreeSet, HashSet};

use futures::future::join_all;
use tracing::debug;

use crate::dates::{DayKey, DayWindow};
use crate::limits::*;
use crate::model::*;

use super::conflict::{guide_conflicts, vehicle_conflicts};
use super::{Engine, EngineError};

/// Candidate ids in first-seen order, each once.
fn unique_ids(ids: &[ResourceId]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

impl Engine {
    /// Check candidate guides and vehicles against `days` on behalf of `tour`.
    ///
    /// Candidates this agency doesn't know contribute nothing. Guides come
    /// first in the result, then vehicles, each in request order.
    pub async fn check_availability(
        &self,
        tour: &Tour,
        days: &BTreeSet<DayKey>,
        guide_ids: &[ResourceId],
        vehicle_ids: &[ResourceId],
    ) -> Result<AvailabilityReport, EngineError> {
        if days.len() > MAX_DATES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many dates"));
        }
        if guide_ids.len() > MAX_CANDIDATES_PER_REQUEST || vehicle_ids.len() > MAX_CANDIDATES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many candidates"));
        }
        let window = DayWindow::spanning(days)
            .ok_or_else(|| EngineError::invalid("dates", "at least one date is required"))?;

        let guides = unique_ids(guide_ids);
        let vehicles = unique_ids(vehicle_ids);

        let guide_checks = guides
            .iter()
            .map(|id| self.guide_conflicts_for(tour, id, days, &window));
        let vehicle_checks = vehicles
            .iter()
            .map(|id| self.vehicle_conflicts_for(tour, id, days));
        let (guide_results, vehicle_results) = futures::join!(join_all(guide_checks), join_all(vehicle_checks));

        let mut conflicts = Vec::new();
        for batch in guide_results {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL, "kind" => "guide").increment(batch.len() as u64);
            conflicts.extend(batch);
        }
        for batch in vehicle_results {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL, "kind" => "vehicle")
                .increment(batch.len() as u64);
            conflicts.extend(batch);
        }
        Ok(AvailabilityReport::from_conflicts(conflicts))
    }

    async fn guide_conflicts_for(
        &self,
        tour: &Tour,
        guide_id: &str,
        days: &BTreeSet<DayKey>,
        window: &DayWindow,
    ) -> Vec<ConflictRecord> {
        // Occupancy lives on bookings; the resource record only lends a name.
        let registered_name = match self.resource_snapshot(guide_id).await {
            Some(rs) if rs.kind == ResourceKind::Guide => rs.name,
            Some(_) => {
                debug!(guide_id, "candidate guide id names a vehicle; skipped");
                return Vec::new();
            }
            None => None,
        };
        let bookings = self.find_overlapping_bookings(guide_id, window);
        if bookings.is_empty() {
            return Vec::new();
        }
        let display_name = registered_name
            .or_else(|| {
                bookings
                    .iter()
                    .find_map(|b| b.guide(guide_id).and_then(|g| g.name.clone()))
            })
            .unwrap_or_else(|| guide_id.to_string());
        guide_conflicts(guide_id, &display_name, &bookings, days, &tour.id)
    }

    async fn vehicle_conflicts_for(&self, tour: &Tour, vehicle_id: &str, days: &BTreeSet<DayKey>) -> Vec<ConflictRecord> {
        let Some(vehicle) = self.resource_snapshot(vehicle_id).await else {
            debug!(vehicle_id, "unknown vehicle skipped");
            return Vec::new();
        };
        if vehicle.kind != ResourceKind::Vehicle {
            debug!(vehicle_id, "candidate vehicle id names a guide; skipped");
            return Vec::new();
        }
        let self_scheduled = tour.scheduled_days_for_vehicle(vehicle_id);
        vehicle_conflicts(&vehicle, days, &self_scheduled)
    }
}

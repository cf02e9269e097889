use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::occupation::{default_occupations, mixed_days, sanitize};

use super::{apply_to_resource, Engine, EngineError, WalCommand};

/// A full-replace write of one resource record.
#[derive(Debug, Clone)]
pub struct ResourceWrite {
    pub id: ResourceId,
    /// `None` keeps the stored kind, or makes a vehicle when creating.
    pub kind: Option<ResourceKind>,
    pub name: Option<String>,
    /// `None` keeps what is stored (or the default, for a new vehicle).
    /// `Some` is sanitized and replaces the whole collection.
    pub occupations: Option<Vec<Occupation>>,
}

pub(super) fn validate_id(field: &str, id: &str) -> Result<(), EngineError> {
    if id.trim().is_empty() {
        return Err(EngineError::invalid(field, "must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

fn validate_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

impl Engine {
    /// Replace a resource record, creating it when missing. Readers see the
    /// old collection or the new one, never a mix.
    pub async fn write_resource(&self, write: ResourceWrite) -> Result<ResourceState, EngineError> {
        validate_id("id", &write.id)?;
        validate_name(write.name.as_deref())?;

        let occupations = match write.occupations {
            Some(raw) => {
                if raw.len() > MAX_OCCUPATIONS_PER_WRITE {
                    return Err(EngineError::LimitExceeded("too many occupation entries"));
                }
                let clean = sanitize(raw);
                if clean.iter().any(|o| o.dates.len() > MAX_DAYS_PER_OCCUPATION) {
                    return Err(EngineError::LimitExceeded("too many days in one occupation"));
                }
                Some(clean)
            }
            None => None,
        };

        loop {
            let gate = self.write_gate.read().await;
            let Some(rs) = self.get_resource(&write.id) else {
                drop(gate);
                let _gate = self.write_gate.write().await;
                if self.store.contains_resource(&write.id) {
                    // Created by a concurrent writer while we waited.
                    continue;
                }
                if self.store.resource_count() >= MAX_RESOURCES_PER_TENANT {
                    return Err(EngineError::LimitExceeded("too many resources"));
                }
                let kind = write.kind.unwrap_or_default();
                let occupations = occupations.unwrap_or_else(|| match kind {
                    ResourceKind::Vehicle => default_occupations(),
                    ResourceKind::Guide => Vec::new(),
                });
                let state = ResourceState::new(write.id, kind, write.name, occupations);
                let event = Event::ResourceWritten {
                    id: state.id.clone(),
                    kind: state.kind,
                    name: state.name.clone(),
                    occupations: state.occupations.clone(),
                };
                self.wal_append(&event).await?;
                flag_mixed_days(&state);
                self.store.insert_resource(state.clone());
                metrics::counter!(crate::observability::RESOURCE_WRITES_TOTAL, "op" => "create").increment(1);
                info!(agency = %self.agency_id(), resource_id = %state.id, kind = %state.kind, "resource created");
                return Ok(state);
            };

            // The shared gate keeps deletes and compaction out until the
            // replace is logged and applied.
            let mut guard = rs.write().await;
            if let Some(kind) = write.kind
                && kind != guard.kind
            {
                return Err(EngineError::invalid(
                    "kind",
                    format!("resource {} is a {}, not a {}", guard.id, guard.kind, kind),
                ));
            }
            let event = Event::ResourceWritten {
                id: write.id,
                kind: guard.kind,
                name: write.name,
                occupations: occupations.unwrap_or_else(|| guard.occupations.clone()),
            };
            self.wal_append(&event).await?;
            apply_to_resource(&mut guard, &event);
            flag_mixed_days(&guard);
            metrics::counter!(crate::observability::RESOURCE_WRITES_TOTAL, "op" => "replace").increment(1);
            return Ok(guard.clone());
        }
    }

    pub async fn delete_resource(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        let rs = self
            .get_resource(id)
            .ok_or_else(|| EngineError::not_found("resource", id))?;
        // Wait out in-flight writers so a replace can't land after the delete.
        let _guard = rs.write().await;

        let event = Event::ResourceDeleted { id: id.to_string() };
        self.wal_append(&event).await?;
        self.store.remove_resource(id);
        metrics::counter!(crate::observability::RESOURCE_WRITES_TOTAL, "op" => "delete").increment(1);
        Ok(())
    }

    /// Store a tour for this agency. Ownership across agencies is checked by
    /// the tenant manager before this is called.
    pub async fn upsert_tour(&self, tour: Tour) -> Result<(), EngineError> {
        validate_id("id", &tour.id)?;
        validate_name(tour.name.as_deref())?;
        if tour.agency_id != self.agency_id() {
            return Err(EngineError::Forbidden { tour_id: tour.id });
        }
        if tour.itinerary.len() > MAX_ITINERARY_DAYS {
            return Err(EngineError::LimitExceeded("itinerary too long"));
        }

        let _gate = self.write_gate.write().await;
        let event = Event::TourUpserted(tour);
        self.wal_append(&event).await?;
        if let Event::TourUpserted(tour) = event {
            self.store.put_tour(tour);
        }
        Ok(())
    }

    pub async fn delete_tour(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        if self.store.get_tour(id).is_none() {
            return Err(EngineError::not_found("tour", id));
        }
        // Bookings belong to their tour and go with it.
        for booking in self.store.bookings.for_tour(id) {
            let event = Event::BookingRemoved { id: booking.id.clone() };
            self.wal_append(&event).await?;
            self.store.bookings.remove(&booking.id);
        }
        let event = Event::TourDeleted { id: id.to_string() };
        self.wal_append(&event).await?;
        self.store.remove_tour(id);
        Ok(())
    }

    pub async fn upsert_booking(&self, booking: Booking) -> Result<(), EngineError> {
        validate_id("id", &booking.id)?;
        validate_id("tourId", &booking.tour_id)?;
        if booking.agency_id != self.agency_id() {
            return Err(EngineError::Forbidden {
                tour_id: booking.tour_id,
            });
        }
        if booking.end_date < booking.start_date {
            return Err(EngineError::invalid("endDate", "must not be before startDate"));
        }
        if booking.assigned_guides.len() > MAX_GUIDES_PER_BOOKING {
            return Err(EngineError::LimitExceeded("too many assigned guides"));
        }
        for guide in &booking.assigned_guides {
            validate_id("assignedGuides.guideId", &guide.guide_id)?;
        }

        let _gate = self.write_gate.write().await;
        if self.store.bookings.get(&booking.id).is_none() && self.store.bookings.len() >= MAX_BOOKINGS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        let event = Event::BookingUpserted(booking);
        self.wal_append(&event).await?;
        if let Event::BookingUpserted(booking) = event {
            self.store.bookings.upsert(booking);
        }
        Ok(())
    }

    pub async fn remove_booking(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        if self.store.bookings.get(id).is_none() {
            return Err(EngineError::not_found("booking", id));
        }
        let event = Event::BookingRemoved { id: id.to_string() };
        self.wal_append(&event).await?;
        self.store.bookings.remove(id);
        Ok(())
    }

    /// Rewrite the WAL as the minimal event list that rebuilds current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        // Exclusive gate: no create, delete or replace lands between the
        // snapshot and the file swap.
        let _gate = self.write_gate.write().await;
        let mut events = Vec::new();

        for id in self.store.resource_ids() {
            let Some(rs) = self.get_resource(&id) else { continue };
            let guard = rs.read().await;
            events.push(Event::ResourceWritten {
                id: guard.id.clone(),
                kind: guard.kind,
                name: guard.name.clone(),
                occupations: guard.occupations.clone(),
            });
        }
        for tour in self.store.tours() {
            events.push(Event::TourUpserted((*tour).clone()));
        }
        let mut bookings = self.store.bookings.all();
        bookings.sort_by(|a, b| a.id.cmp(&b.id));
        for booking in bookings {
            events.push(Event::BookingUpserted((*booking).clone()));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn flag_mixed_days(state: &ResourceState) {
    let mixed = mixed_days(&state.occupations);
    if mixed.is_empty() {
        return;
    }
    metrics::counter!(crate::observability::MIXED_DAYS_TOTAL).increment(mixed.len() as u64);
    warn!(
        resource_id = %state.id,
        days = mixed.len(),
        first = %mixed[0].0,
        "use occupation overlaps hard-blocked days"
    );
}

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

use super::bookings::BookingIndex;
use super::{apply_to_resource, SharedResourceState};

pub struct InMemoryStore {
    resources: DashMap<ResourceId, SharedResourceState>,
    tours: DashMap<TourId, Arc<Tour>>,
    pub(super) bookings: BookingIndex,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            tours: DashMap::new(),
            bookings: BookingIndex::new(),
        }
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn get_resource(&self, id: &str) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn insert_resource(&self, state: ResourceState) -> SharedResourceState {
        let id = state.id.clone();
        let shared = Arc::new(RwLock::new(state));
        self.resources.insert(id, shared.clone());
        shared
    }

    pub fn remove_resource(&self, id: &str) -> Option<SharedResourceState> {
        self.resources.remove(id).map(|(_, rs)| rs)
    }

    /// Sorted, so listings and snapshots are stable.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.resources.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // ── Tours ────────────────────────────────────────────────

    pub fn tour_count(&self) -> usize {
        self.tours.len()
    }

    pub fn get_tour(&self, id: &str) -> Option<Arc<Tour>> {
        self.tours.get(id).map(|e| e.value().clone())
    }

    pub fn put_tour(&self, tour: Tour) -> Option<Arc<Tour>> {
        self.tours.insert(tour.id.clone(), Arc::new(tour))
    }

    pub fn remove_tour(&self, id: &str) -> Option<Arc<Tour>> {
        self.tours.remove(id).map(|(_, t)| t)
    }

    pub fn tours(&self) -> Vec<Arc<Tour>> {
        let mut tours: Vec<Arc<Tour>> = self.tours.iter().map(|e| e.value().clone()).collect();
        tours.sort_by(|a, b| a.id.cmp(&b.id));
        tours
    }

    // ── Event application ────────────────────────────────────

    /// Apply a replayed event. Only called while the engine is being built,
    /// so every lock is uncontended.
    pub fn replay_event(&self, event: &Event) {
        match event {
            Event::ResourceWritten {
                id,
                kind,
                name,
                occupations,
            } => match self.get_resource(id) {
                Some(rs) => {
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    apply_to_resource(&mut guard, event);
                }
                None => {
                    self.insert_resource(ResourceState::new(
                        id.clone(),
                        *kind,
                        name.clone(),
                        occupations.clone(),
                    ));
                }
            },
            Event::ResourceDeleted { id } => {
                self.remove_resource(id);
            }
            Event::TourUpserted(tour) => {
                self.put_tour(tour.clone());
            }
            Event::TourDeleted { id } => {
                self.remove_tour(id);
            }
            Event::BookingUpserted(booking) => {
                self.bookings.upsert(booking.clone());
            }
            Event::BookingRemoved { id } => {
                self.bookings.remove(id);
            }
        }
    }
}

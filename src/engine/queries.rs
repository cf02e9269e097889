use std::sync::Arc;

use crate::dates::DayWindow;
use crate::model::*;

use super::Engine;

impl Engine {
    /// Point-in-time copy of a resource record.
    pub async fn resource_snapshot(&self, id: &str) -> Option<ResourceState> {
        let rs = self.get_resource(id)?;
        let guard = rs.read().await;
        Some(guard.clone())
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.store.resource_ids()
    }

    pub fn resource_count(&self) -> usize {
        self.store.resource_count()
    }

    pub fn tours(&self) -> Vec<Arc<Tour>> {
        self.store.tours()
    }

    pub fn get_booking(&self, id: &str) -> Option<Arc<Booking>> {
        self.store.bookings.get(id)
    }

    pub fn booking_count(&self) -> usize {
        self.store.bookings.len()
    }

    /// This agency's bookings that assign `guide_id` and intersect `window`.
    pub fn find_overlapping_bookings(&self, guide_id: &str, window: &DayWindow) -> Vec<Arc<Booking>> {
        self.store
            .bookings
            .find_overlapping(self.agency_id(), guide_id, window)
    }
}

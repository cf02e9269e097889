use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::dates::DayWindow;
use crate::model::*;

/// Bookings plus a secondary index from guide id to the bookings that assign
/// that guide. Writers must be serialized by the caller; readers never block
/// on each other.
pub struct BookingIndex {
    bookings: DashMap<BookingId, Arc<Booking>>,
    by_guide: DashMap<ResourceId, Vec<Arc<Booking>>>,
}

impl Default for BookingIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingIndex {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_guide: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Booking>> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<Booking>> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }

    /// Insert or replace a booking, re-pointing the guide index.
    ///
    /// Each guide's list is edited under a single entry lock, so a reader of
    /// that guide sees the old booking or the new one, never neither.
    pub fn upsert(&self, booking: Booking) -> Option<Arc<Booking>> {
        let booking = Arc::new(booking);
        let previous = self.bookings.insert(booking.id.clone(), booking.clone());
        let added = guide_ids(&booking);
        let mut touched = previous.as_deref().map(guide_ids).unwrap_or_default();
        touched.extend(added.iter().cloned());

        for guide_id in touched {
            {
                let mut list = self.by_guide.entry(guide_id.clone()).or_default();
                list.retain(|b| b.id != booking.id);
                if added.contains(&guide_id) {
                    list.push(booking.clone());
                }
            }
            self.by_guide.remove_if(&guide_id, |_, list| list.is_empty());
        }
        previous
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Booking>> {
        let (_, prev) = self.bookings.remove(id)?;
        for guide_id in guide_ids(&prev) {
            if let Some(mut list) = self.by_guide.get_mut(&guide_id) {
                list.retain(|b| b.id != prev.id);
            }
            self.by_guide.remove_if(&guide_id, |_, list| list.is_empty());
        }
        Some(prev)
    }

    /// Bookings attached to `tour_id`, ordered by id.
    pub fn for_tour(&self, tour_id: &str) -> Vec<Arc<Booking>> {
        let mut hits: Vec<Arc<Booking>> = self
            .bookings
            .iter()
            .filter(|e| e.value().tour_id == tour_id)
            .map(|e| e.value().clone())
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits
    }

    /// Bookings of `agency_id` that assign `guide_id` and whose
    /// `[start_date, end_date]` intersects `window`. Ordered by start date.
    pub fn find_overlapping(&self, agency_id: &str, guide_id: &str, window: &DayWindow) -> Vec<Arc<Booking>> {
        let mut hits: Vec<Arc<Booking>> = match self.by_guide.get(guide_id) {
            Some(list) => list
                .iter()
                .filter(|b| b.agency_id == agency_id && b.window().intersects(window))
                .cloned()
                .collect(),
            None => return Vec::new(),
        };
        hits.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)));
        hits
    }
}

fn guide_ids(booking: &Booking) -> BTreeSet<ResourceId> {
    booking
        .assigned_guides
        .iter()
        .map(|g| g.guide_id.clone())
        .collect()
}

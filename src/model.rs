use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dates::{DayKey, DayWindow};

pub type AgencyId = String;
pub type ResourceId = String;
pub type TourId = String;
pub type BookingId = String;

/// What a resource is doing on the days of an occupation.
///
/// Variant order is the precedence among hard blocks: when one day lands in
/// two hard-block occupations, the earlier variant keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupationType {
    /// Deployed on a tour. Waived for the tour that owns the assignment.
    Use,
    /// Free. Never stored.
    Standby,
    Maintenance,
    Service,
    Accident,
    Rental,
    Decommissioned,
    Inspection,
}

impl OccupationType {
    pub const ALL: [OccupationType; 8] = [
        OccupationType::Use,
        OccupationType::Standby,
        OccupationType::Maintenance,
        OccupationType::Service,
        OccupationType::Accident,
        OccupationType::Rental,
        OccupationType::Decommissioned,
        OccupationType::Inspection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OccupationType::Use => "use",
            OccupationType::Standby => "standby",
            OccupationType::Maintenance => "maintenance",
            OccupationType::Service => "service",
            OccupationType::Accident => "accident",
            OccupationType::Rental => "rental",
            OccupationType::Decommissioned => "decommissioned",
            OccupationType::Inspection => "inspection",
        }
    }

    /// Always blocks scheduling, never waived.
    pub fn is_hard_block(self) -> bool {
        !matches!(self, OccupationType::Use | OccupationType::Standby)
    }
}

impl fmt::Display for OccupationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OccupationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OccupationType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// One occupation record: a type and the explicit days it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupation {
    #[serde(rename = "type")]
    pub kind: OccupationType,
    pub dates: BTreeSet<DayKey>,
}

impl Occupation {
    pub fn new(kind: OccupationType, dates: impl IntoIterator<Item = DayKey>) -> Self {
        Self {
            kind,
            dates: dates.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Vehicle,
    Guide,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Vehicle => "vehicle",
            ResourceKind::Guide => "guide",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vehicle or guide together with its stored occupations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: Option<String>,
    /// Sanitized: at most one entry per type, no standby, no empty entries.
    pub occupations: Vec<Occupation>,
}

impl ResourceState {
    pub fn new(id: ResourceId, kind: ResourceKind, name: Option<String>, occupations: Vec<Occupation>) -> Self {
        Self {
            id,
            kind,
            name,
            occupations,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Union of all `use` days.
    pub fn usage_days(&self) -> BTreeSet<DayKey> {
        self.occupations
            .iter()
            .filter(|o| o.kind == OccupationType::Use)
            .flat_map(|o| o.dates.iter().copied())
            .collect()
    }

    /// Day → blocking type, over every hard-block occupation.
    pub fn hard_block_days(&self) -> BTreeMap<DayKey, OccupationType> {
        let mut blocks = BTreeMap::new();
        for occ in self.occupations.iter().filter(|o| o.kind.is_hard_block()) {
            for &day in &occ.dates {
                blocks
                    .entry(day)
                    .and_modify(|t: &mut OccupationType| *t = (*t).min(occ.kind))
                    .or_insert(occ.kind);
            }
        }
        blocks
    }
}

/// Who or what an itinerary activity is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default)]
    pub guide_id: Option<ResourceId>,
    #[serde(default)]
    pub vehicle_id: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryDay {
    pub date: DayKey,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// A tour as supplied by the planning workflow. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: TourId,
    pub agency_id: AgencyId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub itinerary: Vec<ItineraryDay>,
}

impl Tour {
    /// Days on which this tour's own itinerary already assigns `vehicle_id`.
    pub fn scheduled_days_for_vehicle(&self, vehicle_id: &str) -> BTreeSet<DayKey> {
        self.itinerary
            .iter()
            .filter(|day| {
                day.activities.iter().any(|a| {
                    a.assignments
                        .iter()
                        .any(|asg| asg.vehicle_id.as_deref() == Some(vehicle_id))
                })
            })
            .map(|day| day.date)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedGuide {
    pub guide_id: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A tour's booking over an inclusive day range. Guide occupancy is derived
/// from these, never stored per guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub tour_id: TourId,
    pub agency_id: AgencyId,
    pub start_date: DayKey,
    pub end_date: DayKey,
    #[serde(default)]
    pub assigned_guides: Vec<AssignedGuide>,
}

impl Booking {
    pub fn window(&self) -> DayWindow {
        DayWindow::new(self.start_date, self.end_date)
    }

    pub fn covers(&self, day: DayKey) -> bool {
        self.window().contains(day)
    }

    pub fn guide(&self, guide_id: &str) -> Option<&AssignedGuide> {
        self.assigned_guides.iter().find(|g| g.guide_id == guide_id)
    }
}

// ── Availability check ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub tour_id: TourId,
    /// Kept as raw JSON so a bad element is reported by its index.
    pub dates: Vec<serde_json::Value>,
    #[serde(default)]
    pub guide_ids: Vec<ResourceId>,
    #[serde(default)]
    pub vehicle_ids: Vec<ResourceId>,
}

/// Why a resource is unavailable on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Guide is assigned to another tour's booking covering the day.
    Booked,
    /// Vehicle is in `use` on the day and not by this tour.
    InUse,
    HardBlock(OccupationType),
}

impl ConflictReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictReason::Booked => "booking",
            ConflictReason::InUse => "use",
            ConflictReason::HardBlock(t) => t.as_str(),
        }
    }
}

impl Serialize for ConflictReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConflictReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "booking" => Ok(ConflictReason::Booked),
            "use" => Ok(ConflictReason::InUse),
            other => other
                .parse::<OccupationType>()
                .ok()
                .filter(|t| t.is_hard_block())
                .map(ConflictReason::HardBlock)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown conflict reason {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    #[serde(rename = "type")]
    pub resource_kind: ResourceKind,
    #[serde(rename = "id")]
    pub resource_id: ResourceId,
    #[serde(rename = "name")]
    pub display_name: String,
    pub date: DayKey,
    pub message: String,
    pub reason: ConflictReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicts: Vec<ConflictRecord>,
}

impl AvailabilityReport {
    pub fn from_conflicts(conflicts: Vec<ConflictRecord>) -> Self {
        Self {
            available: conflicts.is_empty(),
            conflicts,
        }
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Full replace of a resource record and its occupations.
    ResourceWritten {
        id: ResourceId,
        kind: ResourceKind,
        name: Option<String>,
        occupations: Vec<Occupation>,
    },
    ResourceDeleted {
        id: ResourceId,
    },
    TourUpserted(Tour),
    TourDeleted {
        id: TourId,
    },
    BookingUpserted(Booking),
    BookingRemoved {
        id: BookingId,
    },
}

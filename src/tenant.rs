use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::compactor;
use crate::dates::{DateInput, DateNormalizer, DayKey};
use crate::engine::{Engine, EngineError};
use crate::limits::*;
use crate::model::*;

static AGENCY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("agency id pattern compiles"));

pub fn validate_agency_id(agency_id: &str) -> Result<(), EngineError> {
    if agency_id.len() > MAX_AGENCY_ID_LEN {
        return Err(EngineError::LimitExceeded("agency id too long"));
    }
    if !AGENCY_ID_RE.is_match(agency_id) {
        return Err(EngineError::invalid(
            "agencyId",
            "only letters, digits, '_' and '-' are allowed",
        ));
    }
    Ok(())
}

/// Per-agency engines plus the global tour → agency directory that decides
/// NotFound versus Forbidden. Each agency gets its own Engine + WAL + compactor.
pub struct TenantManager {
    engines: DashMap<AgencyId, Arc<Engine>>,
    tour_owners: DashMap<TourId, AgencyId>,
    /// Serializes tour ownership changes across agencies.
    claims: Mutex<()>,
    data_dir: PathBuf,
    compact_threshold: u64,
    normalizer: DateNormalizer,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, normalizer: DateNormalizer) -> Self {
        Self {
            engines: DashMap::new(),
            tour_owners: DashMap::new(),
            claims: Mutex::new(()),
            data_dir,
            compact_threshold,
            normalizer,
        }
    }

    /// Create the data dir if needed and load every agency WAL in it, so the
    /// tour directory is complete before the first request.
    pub fn open(data_dir: PathBuf, compact_threshold: u64, normalizer: DateNormalizer) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&data_dir).map_err(|e| EngineError::WalError(e.to_string()))?;
        let manager = Self::new(data_dir, compact_threshold, normalizer);
        for agency in wal_agencies(&manager.data_dir)? {
            if let Err(e) = manager.get_or_create(&agency) {
                warn!(agency, error = %e, "skipping agency WAL");
            }
        }
        info!(
            agencies = manager.engines.len(),
            tours = manager.tour_owners.len(),
            "tenants loaded"
        );
        Ok(manager)
    }

    pub fn normalizer(&self) -> &DateNormalizer {
        &self.normalizer
    }

    pub fn engine(&self, agency_id: &str) -> Option<Arc<Engine>> {
        self.engines.get(agency_id).map(|e| e.value().clone())
    }

    pub fn engines(&self) -> Vec<Arc<Engine>> {
        self.engines.iter().map(|e| e.value().clone()).collect()
    }

    /// Get or lazily create an engine for the given agency.
    pub fn get_or_create(&self, agency_id: &str) -> Result<Arc<Engine>, EngineError> {
        if let Some(engine) = self.engine(agency_id) {
            return Ok(engine);
        }
        validate_agency_id(agency_id)?;
        if self.engines.len() >= MAX_TENANTS {
            return Err(EngineError::LimitExceeded("too many agencies"));
        }

        let engine = match self.engines.entry(agency_id.to_string()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let wal_path = self.data_dir.join(format!("{agency_id}.wal"));
                let engine =
                    Arc::new(Engine::new(agency_id, wal_path).map_err(|e| EngineError::WalError(e.to_string()))?);
                slot.insert(engine.clone());
                engine
            }
        };

        for tour in engine.tours() {
            if let Some(previous) = self.tour_owners.insert(tour.id.clone(), agency_id.to_string())
                && previous != agency_id
            {
                warn!(tour_id = %tour.id, previous, agency_id, "tour claimed by two agencies");
            }
        }

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        info!(agency = agency_id, "agency engine ready");
        Ok(engine)
    }

    /// Resolve a tour on behalf of `caller`: unknown → NotFound, owned by
    /// another agency → Forbidden.
    pub fn resolve_tour(&self, caller: &str, tour_id: &str) -> Result<Arc<Tour>, EngineError> {
        let owner = self
            .tour_owners
            .get(tour_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::not_found("tour", tour_id))?;
        if owner != caller {
            return Err(EngineError::Forbidden {
                tour_id: tour_id.to_string(),
            });
        }
        self.engine(caller)
            .and_then(|engine| engine.get_tour(tour_id))
            .ok_or_else(|| EngineError::not_found("tour", tour_id))
    }

    pub async fn upsert_tour(&self, caller: &str, mut tour: Tour) -> Result<(), EngineError> {
        let engine = self.get_or_create(caller)?;
        tour.agency_id = caller.to_string();

        let _claims = self.claims.lock().await;
        if let Some(owner) = self.tour_owners.get(&tour.id)
            && owner.value() != caller
        {
            return Err(EngineError::Forbidden { tour_id: tour.id });
        }
        let tour_id = tour.id.clone();
        engine.upsert_tour(tour).await?;
        self.tour_owners.insert(tour_id, caller.to_string());
        Ok(())
    }

    pub async fn delete_tour(&self, caller: &str, tour_id: &str) -> Result<(), EngineError> {
        let _claims = self.claims.lock().await;
        self.resolve_tour(caller, tour_id)?;
        let engine = self.get_or_create(caller)?;
        engine.delete_tour(tour_id).await?;
        self.tour_owners.remove(tour_id);
        Ok(())
    }

    /// Store a booking for one of the caller's own tours.
    pub async fn upsert_booking(&self, caller: &str, mut booking: Booking) -> Result<(), EngineError> {
        self.resolve_tour(caller, &booking.tour_id)?;
        booking.agency_id = caller.to_string();
        self.get_or_create(caller)?.upsert_booking(booking).await
    }

    pub async fn remove_booking(&self, caller: &str, booking_id: &str) -> Result<(), EngineError> {
        let engine = self
            .engine(caller)
            .ok_or_else(|| EngineError::not_found("booking", booking_id))?;
        engine.remove_booking(booking_id).await
    }

    /// The availability check as seen by a caller: the tour gate first, then
    /// date normalization, then the per-resource checks.
    pub async fn check_availability(
        &self,
        caller: &str,
        request: &AvailabilityRequest,
    ) -> Result<AvailabilityReport, EngineError> {
        let start = Instant::now();
        let result = self.check_availability_inner(caller, request).await;
        metrics::histogram!(crate::observability::AVAILABILITY_CHECK_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(report) if report.available => "available",
            Ok(_) => "conflicts",
            Err(_) => "error",
        };
        metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn check_availability_inner(
        &self,
        caller: &str,
        request: &AvailabilityRequest,
    ) -> Result<AvailabilityReport, EngineError> {
        validate_agency_id(caller)?;
        let tour = self.resolve_tour(caller, &request.tour_id)?;

        if request.dates.is_empty() {
            return Err(EngineError::invalid("dates", "at least one date is required"));
        }
        if request.dates.len() > MAX_DATES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many dates"));
        }
        let days = request
            .dates
            .iter()
            .enumerate()
            .map(|(i, value)| {
                DateInput::from_json(value)
                    .and_then(|input| self.normalizer.to_day_key(&input))
                    .map_err(|source| EngineError::InvalidDate {
                        field: format!("dates[{i}]"),
                        source,
                    })
            })
            .collect::<Result<BTreeSet<DayKey>, _>>()?;

        let engine = self.get_or_create(caller)?;
        engine
            .check_availability(&tour, &days, &request.guide_ids, &request.vehicle_ids)
            .await
    }
}

/// Agency ids with a WAL in `dir`, sorted.
fn wal_agencies(dir: &Path) -> Result<Vec<AgencyId>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::WalError(e.to_string()))?;
    let mut agencies = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EngineError::WalError(e.to_string()))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("wal") {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if validate_agency_id(stem).is_ok() => agencies.push(stem.to_string()),
            _ => warn!(path = %path.display(), "ignoring WAL with unusable agency name"),
        }
    }
    agencies.sort();
    Ok(agencies)
}

//! Batch job turning legacy range-based vehicle occupations into day lists.
//!
//! Every record gets its own outcome; a bad record is counted and skipped,
//! never fatal to the batch.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{EngineError, ResourceWrite};
use crate::expand::{expand, ExpandError, Expansion};
use crate::model::*;
use crate::tenant::TenantManager;

/// One record of the legacy export.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyVehicle {
    pub id: ResourceId,
    pub agency_id: AgencyId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub occupations: Value,
}

#[derive(Debug)]
pub enum MigrationError {
    Malformed(String),
    Expand(ExpandError),
    Write(EngineError),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::Malformed(msg) => write!(f, "malformed record: {msg}"),
            MigrationError::Expand(e) => write!(f, "cannot expand occupations: {e}"),
            MigrationError::Write(e) => write!(f, "cannot store resource: {e}"),
        }
    }
}

impl std::error::Error for MigrationError {}

#[derive(Debug)]
pub enum ResourceOutcome {
    /// Written back with `days` occupied days after sanitizing.
    Migrated { days: usize },
    AlreadyCanonical,
    Failed(MigrationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFailure {
    pub index: usize,
    pub id: Option<ResourceId>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub run_id: String,
    pub succeeded: usize,
    pub failed: usize,
    /// Records actually rewritten (already-canonical ones excluded).
    pub total_migrated: usize,
    pub days_written: usize,
    pub failures: Vec<MigrationFailure>,
}

impl MigrationReport {
    fn record(&mut self, index: usize, id: Option<&str>, outcome: ResourceOutcome) {
        let label = match outcome {
            ResourceOutcome::Migrated { days } => {
                self.succeeded += 1;
                self.total_migrated += 1;
                self.days_written += days;
                "migrated"
            }
            ResourceOutcome::AlreadyCanonical => {
                self.succeeded += 1;
                "canonical"
            }
            ResourceOutcome::Failed(e) => {
                warn!(run_id = %self.run_id, index, id, error = %e, "resource migration failed");
                self.failed += 1;
                self.failures.push(MigrationFailure {
                    index,
                    id: id.map(str::to_string),
                    reason: e.to_string(),
                });
                "failed"
            }
        };
        metrics::counter!(crate::observability::MIGRATION_RECORDS_TOTAL, "outcome" => label).increment(1);
    }
}

/// Read the legacy export: a JSON array of records.
pub fn load_records(path: &Path) -> io::Result<Vec<Value>> {
    let bytes = std::fs::read(path)?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Array(records) => Ok(records),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "legacy export must be a JSON array",
        )),
    }
}

/// Migrate one record.
pub async fn migrate_record(tm: &TenantManager, raw: Value) -> ResourceOutcome {
    let record: LegacyVehicle = match serde_json::from_value(raw) {
        Ok(record) => record,
        Err(e) => return ResourceOutcome::Failed(MigrationError::Malformed(e.to_string())),
    };
    let occupations = match expand(&record.occupations, tm.normalizer()) {
        Ok(Expansion::AlreadyCanonical) => return ResourceOutcome::AlreadyCanonical,
        Ok(Expansion::Expanded(occupations)) => occupations,
        Err(e) => return ResourceOutcome::Failed(MigrationError::Expand(e)),
    };

    let engine = match tm.get_or_create(&record.agency_id) {
        Ok(engine) => engine,
        Err(e) => return ResourceOutcome::Failed(MigrationError::Write(e)),
    };
    let write = ResourceWrite {
        id: record.id,
        kind: record.kind,
        name: record.name,
        occupations: Some(occupations),
    };
    match engine.write_resource(write).await {
        Ok(stored) => ResourceOutcome::Migrated {
            days: stored.occupations.iter().map(|o| o.dates.len()).sum(),
        },
        Err(e) => ResourceOutcome::Failed(MigrationError::Write(e)),
    }
}

/// Run the whole batch. Always completes; per-record failures are in the report.
pub async fn run_migration(tm: &TenantManager, records: Vec<Value>) -> MigrationReport {
    let mut report = MigrationReport {
        run_id: Ulid::new().to_string(),
        ..Default::default()
    };
    info!(run_id = %report.run_id, records = records.len(), "migration started");

    for (index, raw) in records.into_iter().enumerate() {
        let id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        let outcome = migrate_record(tm, raw).await;
        report.record(index, id.as_deref(), outcome);
    }

    info!(
        run_id = %report.run_id,
        succeeded = report.succeeded,
        failed = report.failed,
        migrated = report.total_migrated,
        "migration finished"
    );
    report
}

use std::net::SocketAddr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability checks. Labels: outcome (available, conflicts, error).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "tourocc_availability_checks_total";

/// Histogram: availability check latency in seconds.
pub const AVAILABILITY_CHECK_DURATION_SECONDS: &str = "tourocc_availability_check_duration_seconds";

/// Counter: conflicts reported. Labels: kind (guide, vehicle).
pub const CONFLICTS_TOTAL: &str = "tourocc_conflicts_total";

/// Counter: resource record writes. Labels: op (create, replace, delete).
pub const RESOURCE_WRITES_TOTAL: &str = "tourocc_resource_writes_total";

/// Counter: days stored as both `use` and hard-blocked.
pub const MIXED_DAYS_TOTAL: &str = "tourocc_mixed_days_total";

/// Counter: migrated legacy records. Labels: outcome (migrated, canonical, failed).
pub const MIGRATION_RECORDS_TOTAL: &str = "tourocc_migration_records_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of loaded agency engines.
pub const TENANTS_ACTIVE: &str = "tourocc_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tourocc_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tourocc_wal_flush_batch_size";

/// Install the fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(env_filter)
        .try_init()
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

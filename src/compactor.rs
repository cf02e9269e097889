use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites an agency's WAL once enough appends have
/// piled up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor tick. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact().await {
        Ok(()) => {
            info!(agency = %engine.agency_id(), appends, "WAL compacted");
            true
        }
        Err(e) => {
            warn!(agency = %engine.agency_id(), error = %e, "WAL compaction failed");
            false
        }
    }
}

/// Compact every agency once, regardless of threshold. Used on shutdown.
pub async fn compact_all(engines: &[Arc<Engine>]) {
    for engine in engines {
        if let Err(e) = engine.compact().await {
            warn!(agency = %engine.agency_id(), error = %e, "final compaction failed");
        } else {
            debug!(agency = %engine.agency_id(), "final compaction done");
        }
    }
}

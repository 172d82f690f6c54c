use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;

/// How often expired locks are swept. Expiry itself is lazy — the sweep
/// only trims dead entries and reclaims WAL space.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that periodically removes expired slot locks.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        let now = engine.clock.now_ms();
        let expired = engine.collect_expired_locks(now);
        for (lock_id, _court_id) in expired {
            match engine.release_lock(lock_id).await {
                Ok(()) => {
                    metrics::counter!(crate::observability::LOCKS_EXPIRED_TOTAL).increment(1);
                    info!("reaped expired lock {lock_id}");
                }
                Err(e) => {
                    // May already have been released — that's fine
                    debug!("reaper skip {lock_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends have piled
/// up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

/// Spawn both maintenance tasks.
pub fn spawn_maintenance(engine: Arc<Engine>, compact_threshold: u64) {
    tokio::spawn(run_reaper(engine.clone()));
    tokio::spawn(run_compactor(engine, compact_threshold));
}

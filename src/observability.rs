use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings durably committed.
pub const BOOKINGS_COMMITTED_TOTAL: &str = "courtbook_bookings_committed_total";

/// Counter: commits and lock attempts that lost a race under the write lock.
pub const BOOKING_CONFLICTS_TOTAL: &str = "courtbook_booking_conflicts_total";

/// Counter: slot locks granted.
pub const LOCKS_ACQUIRED_TOTAL: &str = "courtbook_locks_acquired_total";

/// Counter: slot locks released — explicitly, by commit, or by the reaper.
pub const LOCKS_RELEASED_TOTAL: &str = "courtbook_locks_released_total";

/// Counter: expired locks swept by the reaper.
pub const LOCKS_EXPIRED_TOTAL: &str = "courtbook_locks_expired_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: registered courts.
pub const COURTS_ACTIVE: &str = "courtbook_courts_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Install the default fmt tracing subscriber, respecting `RUST_LOG`.
/// Embedding applications that bring their own subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None — counters still record, nothing scrapes them.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

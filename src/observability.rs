use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations. Labels: op, outcome (ok or an error code).
pub const BOOKINGS_TOTAL: &str = "huddle_bookings_total";

/// Histogram: booking operation latency in seconds. Labels: op.
pub const BOOKING_DURATION_SECONDS: &str = "huddle_booking_duration_seconds";

/// Histogram: alternatives attached to each scheduling conflict.
pub const ALTERNATIVES_OFFERED: &str = "huddle_alternatives_offered";

/// Counter: store calls or lock waits that hit the store timeout. Labels: op.
pub const STORE_TIMEOUTS_TOTAL: &str = "huddle_store_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "huddle_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "huddle_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "huddle_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "huddle_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "huddle_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter: {e}"),
    }
}

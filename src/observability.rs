use std::net::SocketAddr;

// ── Booking workflow ────────────────────────────────────────────

/// Counter: lifecycle transitions. Labels: transition, outcome.
pub const TRANSITIONS_TOTAL: &str = "roombook_transitions_total";

/// Counter: submissions refused by the conflict evaluator. Labels: reason.
pub const CONFLICT_REJECTIONS_TOTAL: &str = "roombook_conflict_rejections_total";

/// Counter: pending bookings deleted by an approval cascade.
pub const CASCADE_DECLINED_TOTAL: &str = "roombook_cascade_declined_total";

// ── Notifications ───────────────────────────────────────────────

/// Counter: mail sends attempted. Labels: status (sent, failed).
pub const NOTIFICATIONS_TOTAL: &str = "roombook_notifications_total";

/// Counter: notices dropped because the outbox was full or closed.
pub const OUTBOX_DROPPED_TOTAL: &str = "roombook_outbox_dropped_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roombook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roombook_wal_flush_batch_size";

// ── HTTP ────────────────────────────────────────────────────────

/// Gauge: open live-snapshot WebSockets.
pub const LIVE_SUBSCRIBERS: &str = "roombook_live_subscribers";

/// Counter: HTTP requests. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "roombook_http_requests_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

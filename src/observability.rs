use std::net::SocketAddr;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: bookings created. Labels: party (member|guest).
pub const BOOKINGS_CREATED_TOTAL: &str = "fleetbook_bookings_created_total";

/// Counter: state transitions applied. Labels: action, status.
pub const TRANSITIONS_TOTAL: &str = "fleetbook_transitions_total";

/// Counter: create/approve attempts rejected by an overlapping booking.
pub const CONFLICTS_TOTAL: &str = "fleetbook_conflicts_total";

/// Counter: bookings reclassified OVERDUE by the sweeper.
pub const OVERDUE_SWEPT_TOTAL: &str = "fleetbook_overdue_swept_total";

/// Counter: trip assignments written.
pub const TRIPS_ASSIGNED_TOTAL: &str = "fleetbook_trips_assigned_total";

// ── Storage ─────────────────────────────────────────────────────

/// Gauge: resources currently registered.
pub const RESOURCES_ACTIVE: &str = "fleetbook_resources_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

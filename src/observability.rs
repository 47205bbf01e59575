use std::net::SocketAddr;

use crate::engine::ScheduleError;

// ── RED metrics (operation-driven) ──────────────────────────────

/// Counter: total schedule operations. Labels: op, status.
pub const OPS_TOTAL: &str = "slotgrid_ops_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OP_DURATION_SECONDS: &str = "slotgrid_op_duration_seconds";

/// Counter: operations that returned an error. Labels: op, reason.
pub const REJECTIONS_TOTAL: &str = "slotgrid_rejections_total";

// ── USE metrics (schedule and sync state) ───────────────────────

/// Gauge: appointments currently booked.
pub const APPOINTMENTS_BOOKED: &str = "slotgrid_appointments_booked";

/// Gauge: days currently flagged off.
pub const DAYS_OFF: &str = "slotgrid_days_off";

/// Counter: store snapshots applied by reconcile.
pub const RECONCILES_APPLIED_TOTAL: &str = "slotgrid_reconciles_applied_total";

/// Counter: store snapshots skipped as stale.
pub const RECONCILES_STALE_TOTAL: &str = "slotgrid_reconciles_stale_total";

/// Gauge: 1 while the sync loop is recovering from a lagged stream.
pub const SYNC_DEGRADED: &str = "slotgrid_sync_degraded";

/// Counter: local rollbacks after a failed store write.
pub const STORE_ROLLBACKS_TOTAL: &str = "slotgrid_store_rollbacks_total";

/// Counter: appointments removed by day-off cascades.
pub const CASCADE_DELETES_TOTAL: &str = "slotgrid_cascade_deletes_total";

/// Counter: debounced render ticks emitted.
pub const RENDER_TICKS_TOTAL: &str = "slotgrid_render_ticks_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a rejection to a short reason label for metrics.
pub fn error_label(err: &ScheduleError) -> &'static str {
    match err {
        ScheduleError::DayOffBlocked(_) => "day_off",
        ScheduleError::Overlap(_) => "overlap",
        ScheduleError::InsufficientSpace(_) => "insufficient_space",
        ScheduleError::CompletedLocked(_) => "completed_locked",
        ScheduleError::NotConfirmed(_) => "not_confirmed",
        ScheduleError::NotFound(_) => "not_found",
        ScheduleError::NoSelection => "no_selection",
        ScheduleError::InvalidDraft(_) => "invalid_draft",
        ScheduleError::StoreWriteFailed(_) => "store_write",
        ScheduleError::StoreReadFailed(_) => "store_read",
    }
}

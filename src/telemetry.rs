//! Per-session operation counters and structured timing lines.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::logger::{AUDIT_TARGET, METRICS_TARGET};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Operations at or above this duration are logged at warn level.
    pub slow_op_ms: u64,
    pub db_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let slow = std::env::var("MONGOSESSION_SLOW_OP_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(500);
        Self { slow_op_ms: slow, db_name: "default".into() }
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub ops_total: AtomicU64,
    pub ops_slow_total: AtomicU64,
    pub ops_failed_total: AtomicU64,
    pub writes_total: AtomicU64,
}

/// Snapshot of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ops_total: u64,
    pub ops_slow_total: u64,
    pub ops_failed_total: u64,
    pub writes_total: u64,
}

#[derive(Debug, Default)]
pub struct Telemetry {
    pub cfg: RwLock<TelemetryConfig>,
    pub metrics: Metrics,
}

impl Telemetry {
    #[must_use]
    pub fn new(cfg: TelemetryConfig) -> Self {
        Self { cfg: RwLock::new(cfg), metrics: Metrics::default() }
    }

    pub fn set_slow_op_ms(&self, ms: u64) {
        self.cfg.write().slow_op_ms = ms;
    }

    /// Record a finished operation. `results` is the number of documents returned, if any.
    pub fn record_op(&self, op: &str, collection: &str, started: Instant, results: Option<usize>, ok: bool) {
        self.metrics.ops_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.metrics.ops_failed_total.fetch_add(1, Ordering::Relaxed);
        }
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let cfg = self.cfg.read().clone();
        let slow = duration_ms >= cfg.slow_op_ms;
        if slow {
            self.metrics.ops_slow_total.fetch_add(1, Ordering::Relaxed);
        }
        let line = serde_json::json!({
            "ts": now_ts(),
            "db": cfg.db_name,
            "op": op,
            "collection": collection,
            "duration_ms": duration_ms,
            "results": results,
            "ok": ok,
            "slow": slow,
        })
        .to_string();
        if slow {
            log::warn!(target: METRICS_TARGET, "{line}");
        } else {
            log::debug!(target: METRICS_TARGET, "{line}");
        }
    }

    /// Record a write on the audit target.
    pub fn record_write(&self, op: &str, collection: &str, detail: &str) {
        self.metrics.writes_total.fetch_add(1, Ordering::Relaxed);
        log::info!(
            target: AUDIT_TARGET,
            "{}",
            serde_json::json!({
                "ts": now_ts(),
                "db": self.cfg.read().db_name,
                "op": op,
                "collection": collection,
                "detail": detail,
            })
        );
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let m = &self.metrics;
        MetricsSnapshot {
            ops_total: m.ops_total.load(Ordering::Relaxed),
            ops_slow_total: m.ops_slow_total.load(Ordering::Relaxed),
            ops_failed_total: m.ops_failed_total.load(Ordering::Relaxed),
            writes_total: m.writes_total.load(Ordering::Relaxed),
        }
    }

    /// OpenMetrics-style exposition of the counters.
    #[must_use]
    pub fn metrics_text(&self) -> String {
        let s = self.snapshot();
        format!(
            "mongosession_ops_total {}\n\
             mongosession_ops_slow_total {}\n\
             mongosession_ops_failed_total {}\n\
             mongosession_writes_total {}\n",
            s.ops_total, s.ops_slow_total, s.ops_failed_total, s.writes_total,
        )
    }
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

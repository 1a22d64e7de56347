//! Observability infrastructure for the sync layer
//!
//! Provides:
//! - Prometheus metrics (applied/dropped events, flushes, coalesced samples, buffer sizes)
//! - Structured logging of lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for bulk-load latency (in seconds)
const LOAD_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SyncMetricsInner> = OnceLock::new();

struct SyncMetricsInner {
    events_applied: IntCounterVec,
    events_dropped: IntCounterVec,
    stats_flushes: IntCounter,
    stats_coalesced: IntCounter,
    bulk_load_latency_seconds: Histogram,
    bulk_load_failures: IntCounter,
    pods_tracked: IntGauge,
    log_entries: IntGauge,
}

impl SyncMetricsInner {
    fn new() -> Self {
        Self {
            events_applied: register_int_counter_vec!(
                "pod_sync_events_applied_total",
                "Backend events applied to the registry",
                &["kind"]
            )
            .expect("Failed to register events_applied"),

            events_dropped: register_int_counter_vec!(
                "pod_sync_events_dropped_total",
                "Backend events dropped because the pod is unknown",
                &["kind"]
            )
            .expect("Failed to register events_dropped"),

            stats_flushes: register_int_counter!(
                "pod_sync_stats_flushes_total",
                "Coalesced stats flushes that applied at least one sample"
            )
            .expect("Failed to register stats_flushes"),

            stats_coalesced: register_int_counter!(
                "pod_sync_stats_coalesced_total",
                "Stats samples superseded by a newer sample before flush"
            )
            .expect("Failed to register stats_coalesced"),

            bulk_load_latency_seconds: register_histogram!(
                "pod_sync_bulk_load_latency_seconds",
                "Time spent fetching the full pod list from the backend",
                LOAD_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register bulk_load_latency_seconds"),

            bulk_load_failures: register_int_counter!(
                "pod_sync_bulk_load_failures_total",
                "Failed bulk pod list fetches"
            )
            .expect("Failed to register bulk_load_failures"),

            pods_tracked: register_int_gauge!(
                "pod_sync_pods_tracked",
                "Number of pods in the snapshot store"
            )
            .expect("Failed to register pods_tracked"),

            log_entries: register_int_gauge!(
                "pod_sync_log_entries",
                "Log entries buffered across all pods"
            )
            .expect("Failed to register log_entries"),
        }
    }
}

/// Sync metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct SyncMetrics {
    _private: (),
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMetrics").finish()
    }
}

impl SyncMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SyncMetricsInner {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new)
    }

    pub fn inc_event_applied(&self, kind: &str) {
        self.inner().events_applied.with_label_values(&[kind]).inc();
    }

    pub fn add_events_applied(&self, kind: &str, count: u64) {
        self.inner().events_applied.with_label_values(&[kind]).inc_by(count);
    }

    pub fn inc_event_dropped(&self, kind: &str) {
        self.inner().events_dropped.with_label_values(&[kind]).inc();
    }

    pub fn inc_stats_flushes(&self) {
        self.inner().stats_flushes.inc();
    }

    pub fn add_stats_coalesced(&self, count: u64) {
        self.inner().stats_coalesced.inc_by(count);
    }

    pub fn observe_bulk_load_latency(&self, duration_secs: f64) {
        self.inner().bulk_load_latency_seconds.observe(duration_secs);
    }

    pub fn inc_bulk_load_failures(&self) {
        self.inner().bulk_load_failures.inc();
    }

    /// Update registry size gauges
    pub fn set_registry_size(&self, pods: i64, log_entries: i64) {
        self.inner().pods_tracked.set(pods);
        self.inner().log_entries.set(log_entries);
    }
}

/// Structured logger for sync lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a completed bulk load
    pub fn log_pods_loaded(&self, count: usize, elapsed_ms: u128) {
        info!(
            event = "pods_loaded",
            instance = %self.instance,
            pods = count,
            elapsed_ms = elapsed_ms,
            "Loaded pod snapshot from backend"
        );
    }

    /// Log a failed bulk load; existing state is kept
    pub fn log_load_failed(&self, error: &str) {
        warn!(
            event = "pods_load_failed",
            instance = %self.instance,
            error = %error,
            "Failed to load pods, keeping previous snapshot"
        );
    }

    /// Log an explicit pod removal
    pub fn log_pod_removed(&self, pod_id: &str) {
        info!(
            event = "pod_removed",
            instance = %self.instance,
            pod_id = %pod_id,
            "Removed pod with its history and logs"
        );
    }

    /// Log event stream attach/detach
    pub fn log_subscription(&self, attached: bool) {
        info!(
            event = "event_subscription",
            instance = %self.instance,
            attached = attached,
            "Event subscription changed"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "mirror_started",
            instance = %self.instance,
            version = %version,
            "Pod mirror started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "mirror_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Pod mirror shutting down"
        );
    }
}

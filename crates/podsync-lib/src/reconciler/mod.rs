//! Event reconciliation
//!
//! Applies backend push events to the registry under per-kind rules:
//! - status, process-list, port and log events apply immediately, in delivery order
//! - stats events are coalesced (last value per pod) and applied on the next flush
//!
//! Events for pods the registry does not know are dropped silently; the pod
//! was most likely removed between emission and delivery.

mod coalesce;
mod runtime;
mod schedule;

#[cfg(test)]
mod tests;

pub use coalesce::StatsCoalescer;
pub use runtime::{PodSync, PodSyncBuilder};
pub use schedule::FlushTimer;

use crate::config::SyncConfig;
use crate::models::BackendEvent;
use crate::observability::SyncMetrics;
use crate::registry::PodRegistry;
use tracing::debug;

/// What happened to a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Applied to the registry immediately
    Applied,
    /// Parked for the next flush; `schedule_flush` is set for the first
    /// sample of a window
    Deferred { schedule_flush: bool },
    /// Pod unknown, event discarded
    Dropped,
}

pub struct EventReconciler {
    coalescer: StatsCoalescer,
    dedupe_detected_ports: bool,
    metrics: SyncMetrics,
}

impl EventReconciler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            coalescer: StatsCoalescer::new(),
            dedupe_detected_ports: config.dedupe_detected_ports,
            metrics: SyncMetrics::new(),
        }
    }

    /// Classify an event and apply it according to its kind
    pub fn handle(&mut self, registry: &mut PodRegistry, event: BackendEvent) -> Outcome {
        let kind = event.kind();
        let pod_id = event.pod_id().to_string();

        let outcome = match event {
            BackendEvent::StatsUpdate(update) => {
                if registry.contains(&update.pod_id) {
                    Outcome::Deferred {
                        schedule_flush: self.coalescer.record(update),
                    }
                } else {
                    Outcome::Dropped
                }
            }
            BackendEvent::StatusChanged(e) => {
                applied_if(registry.set_status(&e.pod_id, e.status, e.error_message))
            }
            BackendEvent::ProcessListUpdate(e) => {
                applied_if(registry.set_processes(&e.pod_id, e.processes))
            }
            BackendEvent::PortDetected(e) => applied_if(registry.add_detected_port(
                &e.pod_id,
                e.port,
                self.dedupe_detected_ports,
            )),
            BackendEvent::LogBatch(e) => applied_if(registry.append_logs(&e.pod_id, e.entries)),
        };

        match outcome {
            Outcome::Applied => self.metrics.inc_event_applied(kind.as_str()),
            Outcome::Dropped => {
                debug!(pod_id = %pod_id, kind = kind.as_str(), "Dropping event for unknown pod");
                self.metrics.inc_event_dropped(kind.as_str());
            }
            Outcome::Deferred { .. } => {}
        }
        outcome
    }

    /// Apply every pending stats sample: one snapshot update and one
    /// history sample per pod. A flush with nothing pending is a no-op.
    pub fn flush(&mut self, registry: &mut PodRegistry) -> usize {
        let pending = self.coalescer.take();
        if pending.is_empty() {
            return 0;
        }

        let superseded = self.coalescer.take_superseded();
        let applied = registry.apply_stats(pending);

        self.metrics.add_stats_coalesced(superseded);
        if applied > 0 {
            self.metrics.inc_stats_flushes();
            self.metrics.add_events_applied("stats-update", applied as u64);
        }
        debug!(applied, superseded, "Flushed coalesced stats");
        applied
    }

    /// Drop pending stats and the scheduled-flush guard
    pub fn reset(&mut self) {
        self.coalescer.cancel();
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.coalescer.is_flush_scheduled()
    }

    pub fn pending_stats(&self) -> usize {
        self.coalescer.pending_len()
    }
}

fn applied_if(known: bool) -> Outcome {
    if known {
        Outcome::Applied
    } else {
        Outcome::Dropped
    }
}

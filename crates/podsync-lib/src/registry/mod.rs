//! Pod registry: snapshot store, history buffers and log buffers
//!
//! `PodRegistry` is the single owner of all mirrored state. Every logical
//! update ends with one publish of an immutable `RegistryView` on a watch
//! channel, so consumers always see a complete, consistent snapshot.
//!
//! Removing a pod discards its history and logs in the same publish; an id
//! never survives in a buffer without a matching store entry.

mod history;
mod logs;
mod store;
mod view;

pub use history::{HistoryBuffers, Metric, Series, DEFAULT_HISTORY_CAPACITY};
pub use logs::{LogBuffer, LogLines, DEFAULT_LOG_CAPACITY};
pub use store::{PodMap, PodStore};
pub use view::RegistryView;

use crate::config::SyncConfig;
use crate::models::{DetectedPort, LogEntry, Pod, PodStatsUpdate, PodStatus, Process};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub struct PodRegistry {
    store: PodStore,
    history: HistoryBuffers,
    logs: LogBuffer,
    initialized: bool,
    version: u64,
    current: Arc<RegistryView>,
    publisher: watch::Sender<Arc<RegistryView>>,
}

impl PodRegistry {
    pub fn new(config: &SyncConfig) -> Self {
        let current = Arc::new(RegistryView::default());
        let (publisher, _) = watch::channel(Arc::clone(&current));

        Self {
            store: PodStore::new(),
            history: HistoryBuffers::new(config.history_capacity),
            logs: LogBuffer::new(config.log_capacity),
            initialized: false,
            version: 0,
            current,
            publisher,
        }
    }

    /// Receive every view published from now on
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistryView>> {
        self.publisher.subscribe()
    }

    /// The most recently published view
    pub fn view(&self) -> Arc<RegistryView> {
        Arc::clone(&self.current)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    pub fn pod_count(&self) -> usize {
        self.store.len()
    }

    pub fn log_entries(&self) -> usize {
        self.logs.total_entries()
    }

    /// Seed or fully replace the pod set and mark the registry initialized
    ///
    /// History and logs of pods absent from the new set are discarded.
    pub fn replace_all(&mut self, pods: Vec<Pod>) {
        let dropped = self.store.replace_all(pods);
        for id in &dropped {
            self.history.remove(id);
            self.logs.remove(id);
        }
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "Bulk load dropped pods");
        }
        self.initialized = true;
        self.publish();
    }

    /// Add or replace one pod
    pub fn upsert(&mut self, pod: Pod) {
        self.store.upsert(pod);
        self.publish();
    }

    /// Remove a pod together with its history and logs
    ///
    /// Returns false (and publishes nothing) for unknown ids.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.store.remove(id).is_none() {
            return false;
        }
        self.history.remove(id);
        self.logs.remove(id);
        self.publish();
        true
    }

    /// Apply a status transition; returns false for unknown pods
    ///
    /// Re-applying the current status is accepted but publishes nothing.
    pub fn set_status(&mut self, id: &str, status: PodStatus, error_message: Option<String>) -> bool {
        let Some(pod) = self.store.get(id) else {
            return false;
        };
        if pod.status == status && pod.error_message == error_message {
            return true;
        }

        self.store.update(id, |pod| Pod {
            status,
            error_message,
            ..pod.clone()
        });
        self.publish();
        true
    }

    /// Replace a pod's process list
    pub fn set_processes(&mut self, id: &str, processes: Vec<Process>) -> bool {
        let applied = self.store.update(id, |pod| Pod {
            processes,
            ..pod.clone()
        });
        if applied {
            self.publish();
        }
        applied
    }

    /// Append a detected port
    ///
    /// With `dedupe` set, a port whose number and protocol are already
    /// recorded is accepted without change.
    pub fn add_detected_port(&mut self, id: &str, port: DetectedPort, dedupe: bool) -> bool {
        let Some(pod) = self.store.get(id) else {
            return false;
        };
        if dedupe && pod.detected_ports.iter().any(|p| p.same_socket(&port)) {
            return true;
        }

        self.store.update(id, |pod| {
            let mut detected_ports = pod.detected_ports.clone();
            detected_ports.push(port);
            Pod {
                detected_ports,
                ..pod.clone()
            }
        });
        self.publish();
        true
    }

    /// Apply the latest stats sample for each pod in one publish
    ///
    /// Each known pod gets its snapshot fields updated and exactly one sample
    /// per history metric. Returns how many samples were applied.
    pub fn apply_stats<I>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = PodStatsUpdate>,
    {
        let mut applied = 0;
        for update in updates {
            let PodStatsUpdate {
                pod_id,
                cpu_percent,
                memory_used,
                memory_limit,
            } = update;

            let known = self.store.update(&pod_id, |pod| Pod {
                cpu_percent,
                memory_used,
                memory_limit,
                ..pod.clone()
            });
            if !known {
                debug!(pod_id = %pod_id, "Dropping stats for unknown pod");
                continue;
            }

            self.history.push(&pod_id, Metric::Cpu, cpu_percent);
            self.history.push(&pod_id, Metric::Memory, memory_used as f64);
            applied += 1;
        }

        if applied > 0 {
            self.publish();
        }
        applied
    }

    /// Append a log batch; batches for unknown pods are dropped
    pub fn append_logs(&mut self, id: &str, entries: Vec<LogEntry>) -> bool {
        if !self.store.contains(id) {
            return false;
        }
        let evicted = self.logs.append(id, entries);
        if evicted > 0 {
            debug!(pod_id = %id, evicted, "Trimmed log buffer");
        }
        self.publish();
        true
    }

    /// Replace a pod's logs wholesale
    pub fn replace_logs(&mut self, id: &str, entries: Vec<LogEntry>) -> bool {
        if !self.store.contains(id) {
            return false;
        }
        self.logs.replace(id, entries);
        self.publish();
        true
    }

    /// Discard a pod's log buffer
    pub fn clear_logs(&mut self, id: &str) -> bool {
        let cleared = self.logs.clear(id);
        if cleared {
            self.publish();
        }
        cleared
    }

    fn publish(&mut self) {
        self.version += 1;
        let view = Arc::new(RegistryView {
            version: self.version,
            initialized: self.initialized,
            pods: self.store.snapshot(),
            cpu_history: self.history.snapshot(Metric::Cpu),
            memory_history: self.history.snapshot(Metric::Memory),
            logs: self.logs.snapshot(),
        });
        self.current = Arc::clone(&view);
        self.publisher.send_replace(view);
    }
}

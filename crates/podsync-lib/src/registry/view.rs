//! Read-only projections over a published registry state
//!
//! A `RegistryView` is immutable. Every logical update to the registry
//! publishes a fresh `Arc<RegistryView>`, so comparing two views with
//! `Arc::ptr_eq` is enough to tell whether anything changed.

use super::history::{Metric, Series, SeriesMap};
use super::logs::{LogLines, LogMap};
use super::store::PodMap;
use crate::models::{Pod, PodStatus};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    pub(crate) version: u64,
    pub(crate) initialized: bool,
    pub(crate) pods: Arc<PodMap>,
    pub(crate) cpu_history: Arc<SeriesMap>,
    pub(crate) memory_history: Arc<SeriesMap>,
    pub(crate) logs: Arc<LogMap>,
}

impl RegistryView {
    /// Monotonic counter bumped on every publish
    pub fn version(&self) -> u64 {
        self.version
    }

    /// False until the first bulk load completes
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// All pods, ordered by id
    pub fn all_pods(&self) -> Vec<Arc<Pod>> {
        self.pods.values().cloned().collect()
    }

    /// Pods with a live container: running, starting, stopping or error
    pub fn running_pods(&self) -> Vec<Arc<Pod>> {
        self.pods
            .values()
            .filter(|p| p.status.is_active())
            .cloned()
            .collect()
    }

    pub fn stopped_pods(&self) -> Vec<Arc<Pod>> {
        self.pods
            .values()
            .filter(|p| p.status == PodStatus::Stopped)
            .cloned()
            .collect()
    }

    pub fn pod(&self, id: &str) -> Option<Arc<Pod>> {
        self.pods.get(id).cloned()
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    pub fn history(&self, id: &str, metric: Metric) -> Series {
        let map = match metric {
            Metric::Cpu => &self.cpu_history,
            Metric::Memory => &self.memory_history,
        };
        map.get(id).cloned().unwrap_or_default()
    }

    pub fn cpu_history(&self, id: &str) -> Series {
        self.history(id, Metric::Cpu)
    }

    pub fn memory_history(&self, id: &str) -> Series {
        self.history(id, Metric::Memory)
    }

    pub fn logs(&self, id: &str) -> LogLines {
        self.logs.get(id).cloned().unwrap_or_default()
    }

    pub fn log_len(&self, id: &str) -> usize {
        self.logs.get(id).map(|l| l.len()).unwrap_or(0)
    }
}

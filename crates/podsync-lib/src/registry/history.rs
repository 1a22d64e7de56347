//! Per-pod CPU and memory history
//!
//! Two bounded sample sequences per pod with FIFO eviction. Series are
//! created on the first sample and dropped with the pod.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default number of samples kept per metric
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// A shared, immutable sample sequence, oldest first
pub type Series = Arc<VecDeque<f64>>;

pub type SeriesMap = HashMap<String, Series>;

/// Metric tracked in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// CPU percent
    Cpu,
    /// Memory used, bytes
    Memory,
}

impl Metric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cpu" => Some(Metric::Cpu),
            "memory" | "ram" => Some(Metric::Memory),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct HistoryBuffers {
    capacity: usize,
    cpu: Arc<SeriesMap>,
    memory: Arc<SeriesMap>,
}

impl HistoryBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cpu: Arc::default(),
            memory: Arc::default(),
        }
    }

    /// Append a sample, dropping the oldest once the cap is reached
    pub fn push(&mut self, pod_id: &str, metric: Metric, value: f64) {
        let capacity = self.capacity;
        if capacity == 0 {
            return;
        }

        let map = Arc::make_mut(self.series_mut(metric));
        let series = Arc::make_mut(map.entry(pod_id.to_string()).or_default());
        while series.len() >= capacity {
            series.pop_front();
        }
        series.push_back(value);
    }

    /// Current samples for a pod, empty if none were recorded
    pub fn get(&self, pod_id: &str, metric: Metric) -> Series {
        self.series(metric).get(pod_id).cloned().unwrap_or_default()
    }

    /// Drop both series for a pod
    pub fn remove(&mut self, pod_id: &str) -> bool {
        let mut removed = false;
        for metric in [Metric::Cpu, Metric::Memory] {
            if self.series(metric).contains_key(pod_id) {
                Arc::make_mut(self.series_mut(metric)).remove(pod_id);
                removed = true;
            }
        }
        removed
    }

    pub fn contains(&self, pod_id: &str) -> bool {
        self.cpu.contains_key(pod_id) || self.memory.contains_key(pod_id)
    }

    /// Ids with at least one recorded sample
    pub fn pod_ids(&self) -> impl Iterator<Item = &String> {
        self.cpu
            .keys()
            .chain(self.memory.keys().filter(|id| !self.cpu.contains_key(*id)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shared handle to every series of one metric
    pub fn snapshot(&self, metric: Metric) -> Arc<SeriesMap> {
        Arc::clone(self.series(metric))
    }

    fn series(&self, metric: Metric) -> &Arc<SeriesMap> {
        match metric {
            Metric::Cpu => &self.cpu,
            Metric::Memory => &self.memory,
        }
    }

    fn series_mut(&mut self, metric: Metric) -> &mut Arc<SeriesMap> {
        match metric {
            Metric::Cpu => &mut self.cpu,
            Metric::Memory => &mut self.memory,
        }
    }
}

impl Default for HistoryBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

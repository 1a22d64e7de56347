//! Per-pod log ring buffer
//!
//! Batches arrive pre-ordered from the producer. Overflow is trimmed in one
//! bulk cut after each append, never one entry at a time.

use crate::models::LogEntry;
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of log entries kept per pod
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// A shared, immutable log sequence, oldest first
pub type LogLines = Arc<Vec<LogEntry>>;

pub type LogMap = HashMap<String, LogLines>;

#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    buffers: Arc<LogMap>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: Arc::default(),
        }
    }

    /// Append a batch and trim to capacity
    ///
    /// Returns the number of entries evicted.
    pub fn append(&mut self, pod_id: &str, entries: Vec<LogEntry>) -> usize {
        let capacity = self.capacity;
        let map = Arc::make_mut(&mut self.buffers);
        let lines = Arc::make_mut(map.entry(pod_id.to_string()).or_default());

        lines.extend(entries);
        let excess = lines.len().saturating_sub(capacity);
        if excess > 0 {
            lines.drain(..excess);
        }
        excess
    }

    /// Replace a pod's buffer wholesale, keeping the newest entries
    pub fn replace(&mut self, pod_id: &str, mut entries: Vec<LogEntry>) {
        let excess = entries.len().saturating_sub(self.capacity);
        if excess > 0 {
            entries.drain(..excess);
        }
        Arc::make_mut(&mut self.buffers).insert(pod_id.to_string(), Arc::new(entries));
    }

    /// Current entries for a pod, empty if none
    pub fn get(&self, pod_id: &str) -> LogLines {
        self.buffers.get(pod_id).cloned().unwrap_or_default()
    }

    /// Discard a pod's buffer
    pub fn clear(&mut self, pod_id: &str) -> bool {
        if !self.buffers.contains_key(pod_id) {
            return false;
        }
        Arc::make_mut(&mut self.buffers).remove(pod_id).is_some()
    }

    /// Discard a pod's buffer as part of pod removal
    pub fn remove(&mut self, pod_id: &str) -> bool {
        self.clear(pod_id)
    }

    pub fn contains(&self, pod_id: &str) -> bool {
        self.buffers.contains_key(pod_id)
    }

    pub fn len(&self, pod_id: &str) -> usize {
        self.buffers.get(pod_id).map(|l| l.len()).unwrap_or(0)
    }

    /// Entries held across all pods
    pub fn total_entries(&self) -> usize {
        self.buffers.values().map(|l| l.len()).sum()
    }

    pub fn pod_ids(&self) -> impl Iterator<Item = &String> {
        self.buffers.keys()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Arc<LogMap> {
        Arc::clone(&self.buffers)
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

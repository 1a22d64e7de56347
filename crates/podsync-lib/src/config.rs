//! Sync layer configuration

use crate::registry::{DEFAULT_HISTORY_CAPACITY, DEFAULT_LOG_CAPACITY};
use std::time::Duration;

/// Default flush pacing: one 60 Hz display frame
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(16);

/// Configuration for the pod registry and its reconciler
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Samples kept per metric per pod (default: 60)
    pub history_capacity: usize,
    /// Log entries kept per pod (default: 10,000)
    pub log_capacity: usize,
    /// Delay between the first pending stats sample and its flush
    pub flush_interval: Duration,
    /// Channel buffer size for commands sent to the sync task
    pub command_buffer_size: usize,
    /// Suppress detected ports whose port and protocol are already recorded
    pub dedupe_detected_ports: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_capacity: DEFAULT_LOG_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            command_buffer_size: 256,
            dedupe_detected_ports: false,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-metric history capacity
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the per-pod log capacity
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Set the stats flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the command channel size
    pub fn command_buffer_size(mut self, size: usize) -> Self {
        self.command_buffer_size = size;
        self
    }

    /// Enable or disable detected-port deduplication
    pub fn dedupe_detected_ports(mut self, enabled: bool) -> Self {
        self.dedupe_detected_ports = enabled;
        self
    }
}

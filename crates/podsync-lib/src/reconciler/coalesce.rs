//! Stats coalescing
//!
//! High-frequency stats samples are parked here, last value wins per pod,
//! until the next flush. The `flush_scheduled` flag is the single guard that
//! keeps at most one flush outstanding.

use crate::models::PodStatsUpdate;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StatsCoalescer {
    pending: HashMap<String, PodStatsUpdate>,
    flush_scheduled: bool,
    superseded: u64,
}

impl StatsCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a sample, replacing any earlier one for the same pod
    ///
    /// Returns true when the caller must schedule a flush.
    pub fn record(&mut self, update: PodStatsUpdate) -> bool {
        if self.pending.insert(update.pod_id.clone(), update).is_some() {
            self.superseded += 1;
        }
        if self.flush_scheduled {
            return false;
        }
        self.flush_scheduled = true;
        true
    }

    /// Take every pending sample and mark the flush as consumed
    pub fn take(&mut self) -> Vec<PodStatsUpdate> {
        self.flush_scheduled = false;
        self.pending.drain().map(|(_, update)| update).collect()
    }

    /// Drop pending samples and the scheduled flag
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.flush_scheduled = false;
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Samples overwritten since the last call
    pub fn take_superseded(&mut self) -> u64 {
        std::mem::take(&mut self.superseded)
    }
}

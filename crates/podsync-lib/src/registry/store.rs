//! Entity snapshot store
//!
//! Canonical mapping from pod id to pod. The map lives behind an `Arc` and is
//! copied on write whenever a published view still holds the previous one, so
//! readers never observe a half-applied update.

use crate::models::Pod;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Pods keyed by id; values are shared so a map copy is shallow
pub type PodMap = BTreeMap<String, Arc<Pod>>;

#[derive(Debug, Default)]
pub struct PodStore {
    pods: Arc<PodMap>,
}

impl PodStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire pod set
    ///
    /// Returns the ids that were present before and are absent now.
    /// If the input repeats an id, the last occurrence wins.
    pub fn replace_all(&mut self, pods: impl IntoIterator<Item = Pod>) -> Vec<String> {
        let next: PodMap = pods
            .into_iter()
            .map(|pod| (pod.id.clone(), Arc::new(pod)))
            .collect();

        let dropped = self
            .pods
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();

        self.pods = Arc::new(next);
        dropped
    }

    /// Insert or replace a single pod; never touches other entries
    pub fn upsert(&mut self, pod: Pod) -> Option<Arc<Pod>> {
        debug!(pod_id = %pod.id, "Upserting pod");
        Arc::make_mut(&mut self.pods).insert(pod.id.clone(), Arc::new(pod))
    }

    /// Remove a pod; unknown ids are a no-op
    pub fn remove(&mut self, id: &str) -> Option<Arc<Pod>> {
        if !self.pods.contains_key(id) {
            return None;
        }
        Arc::make_mut(&mut self.pods).remove(id)
    }

    /// Structurally replace a pod with `f(current)`
    ///
    /// Returns false if the id is unknown. The previous `Arc<Pod>` is left
    /// untouched for anyone still holding it.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&Pod) -> Pod,
    {
        let Some(current) = self.pods.get(id) else {
            return false;
        };
        let next = f(current);
        debug_assert_eq!(next.id, id, "update must not change the pod id");
        Arc::make_mut(&mut self.pods).insert(id.to_string(), Arc::new(next));
        true
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Pod>> {
        self.pods.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pods.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// Shared handle to the current map
    pub fn snapshot(&self) -> Arc<PodMap> {
        Arc::clone(&self.pods)
    }
}

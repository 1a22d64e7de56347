//! Backend collaborator interfaces
//!
//! The sync layer talks to the backend through two seams:
//! - `Backend`: one-shot request/response calls (bulk pod list, log history)
//! - `EventSource`: a push subscription delivering `BackendEvent`s
//!
//! `LocalBackend` implements both in memory for harness and test use.

use crate::error::{Result, SyncError};
use crate::models::{
    BackendEvent, DetectedPort, LogBatchEvent, LogEntry, Pod, PodStatsUpdate, PortDetectedEvent,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Request/response calls consumed from the backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the full pod list
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Seed the backend with pods (harness/debug path)
    async fn inject_pods(&self, pods: Vec<Pod>) -> Result<()>;

    /// Fetch recent log history for a pod, newest `tail` entries if given
    async fn pod_logs(&self, pod_id: &str, tail: Option<usize>) -> Result<Vec<LogEntry>>;
}

/// Push event subscription
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> Result<Subscription>;
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A live event subscription
///
/// Dropping the subscription unsubscribes. `unsubscribe` may be called any
/// number of times.
pub struct Subscription {
    events: mpsc::Receiver<BackendEvent>,
    unsubscribe: Option<Unsubscribe>,
    closed: bool,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<BackendEvent>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            unsubscribe: Some(Box::new(unsubscribe)),
            closed: false,
        }
    }

    /// A subscription whose teardown is just closing the channel
    pub fn from_receiver(events: mpsc::Receiver<BackendEvent>) -> Self {
        Self {
            events,
            unsubscribe: None,
            closed: false,
        }
    }

    /// Next delivered event; `None` once the source is gone or unsubscribed
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.events.close();
        self.closed = true;
    }

    pub fn is_active(&self) -> bool {
        !self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Default per-subscriber channel size
const DEFAULT_EVENT_BUFFER: usize = 1024;

/// In-memory backend for harness and test use
///
/// Holds an injectable pod list and log history, and fans emitted events
/// out to every live subscriber.
pub struct LocalBackend {
    pods: RwLock<Vec<Pod>>,
    logs: DashMap<String, Vec<LogEntry>>,
    subscribers: Arc<DashMap<u64, mpsc::Sender<BackendEvent>>>,
    next_subscriber: AtomicU64,
    unavailable: AtomicBool,
    event_buffer: usize,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::with_event_buffer(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_event_buffer(event_buffer: usize) -> Self {
        Self {
            pods: RwLock::new(Vec::new()),
            logs: DashMap::new(),
            subscribers: Arc::new(DashMap::new()),
            next_subscriber: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            event_buffer: event_buffer.max(1),
        }
    }

    /// Make every call fail, simulating a backend outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SyncError::Backend("backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver an event to every subscriber, returning how many received it
    pub async fn emit(&self, event: BackendEvent) -> usize {
        let targets: Vec<(u64, mpsc::Sender<BackendEvent>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                debug!(subscriber = id, "Dropping closed subscriber");
                self.subscribers.remove(&id);
            }
        }
        delivered
    }

    /// Emit a stats sample
    pub async fn set_stats(&self, pod_id: &str, cpu_percent: f64, memory_used: u64, memory_limit: u64) -> usize {
        self.emit(BackendEvent::StatsUpdate(PodStatsUpdate {
            pod_id: pod_id.to_string(),
            cpu_percent,
            memory_used,
            memory_limit,
        }))
        .await
    }

    /// Record a detected port on the stored pod and emit it
    pub async fn inject_detected_port(&self, pod_id: &str, port: DetectedPort) -> usize {
        if let Some(pod) = self.pods.write().await.iter_mut().find(|p| p.id == pod_id) {
            pod.detected_ports.push(port.clone());
        }
        self.emit(BackendEvent::PortDetected(PortDetectedEvent {
            pod_id: pod_id.to_string(),
            port,
        }))
        .await
    }

    /// Store log lines and emit them as one batch
    pub async fn inject_logs(&self, pod_id: &str, entries: Vec<LogEntry>) -> usize {
        self.logs
            .entry(pod_id.to_string())
            .or_default()
            .extend(entries.iter().cloned());
        self.emit(BackendEvent::LogBatch(LogBatchEvent {
            pod_id: pod_id.to_string(),
            entries,
        }))
        .await
    }

    /// Clear stored pods and logs; subscriptions stay open
    pub async fn reset(&self) {
        self.pods.write().await.clear();
        self.logs.clear();
        self.set_unavailable(false);
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.check_available()?;
        Ok(self.pods.read().await.clone())
    }

    async fn inject_pods(&self, pods: Vec<Pod>) -> Result<()> {
        self.check_available()?;
        debug!(count = pods.len(), "Injecting pods");
        *self.pods.write().await = pods;
        Ok(())
    }

    async fn pod_logs(&self, pod_id: &str, tail: Option<usize>) -> Result<Vec<LogEntry>> {
        self.check_available()?;
        let Some(lines) = self.logs.get(pod_id) else {
            return Ok(Vec::new());
        };
        let skip = tail.map(|t| lines.len().saturating_sub(t)).unwrap_or(0);
        Ok(lines[skip..].to_vec())
    }
}

#[async_trait]
impl EventSource for LocalBackend {
    async fn subscribe(&self) -> Result<Subscription> {
        self.check_available()
            .map_err(|e| SyncError::Subscribe(e.to_string()))?;

        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.event_buffer);
        self.subscribers.insert(id, tx);

        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(rx, move || {
            subscribers.remove(&id);
        }))
    }
}

//! Sync runtime
//!
//! One task owns the `PodRegistry`. Event delivery, mutation commands and the
//! flush timer are multiplexed with `select!`, so each handler runs to
//! completion before the next one starts. Readers get published views through
//! a watch channel and never touch the registry directly.

use super::{EventReconciler, FlushTimer, Outcome};
use crate::backend::{Backend, EventSource, LocalBackend, Subscription};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::health::{components, HealthRegistry};
use crate::models::{BackendEvent, LogEntry, Pod};
use crate::observability::{StructuredLogger, SyncMetrics};
use crate::registry::{PodRegistry, RegistryView};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Requests handled on the owner task
enum Command {
    ReplaceAll(Vec<Pod>, oneshot::Sender<()>),
    Upsert(Pod, oneshot::Sender<()>),
    Remove(String, oneshot::Sender<bool>),
    ReplaceLogs(String, Vec<LogEntry>, oneshot::Sender<bool>),
    ClearLogs(String, oneshot::Sender<bool>),
    Attach(Subscription, oneshot::Sender<()>),
    Unsubscribe(oneshot::Sender<()>),
    Detach(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// State owned by the sync task
struct SyncTask {
    registry: PodRegistry,
    reconciler: EventReconciler,
    timer: FlushTimer,
    subscription: Option<Subscription>,
    commands: mpsc::Receiver<Command>,
    health: HealthRegistry,
    metrics: SyncMetrics,
}

impl SyncTask {
    async fn run(mut self) {
        debug!("Sync task started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown(ack)) => {
                            self.detach();
                            let _ = ack.send(());
                            break;
                        }
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("All sync handles dropped");
                            break;
                        }
                    }
                }
                event = next_event(&mut self.subscription) => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            warn!("Event stream closed by source");
                            self.unsubscribe();
                            self.health
                                .set_unhealthy(components::EVENT_STREAM, "Event stream closed")
                                .await;
                        }
                    }
                }
                _ = self.timer.fired() => {
                    self.reconciler.flush(&mut self.registry);
                    self.update_gauges();
                }
            }
        }

        self.detach();
        debug!("Sync task stopped");
    }

    fn handle_event(&mut self, event: BackendEvent) {
        match self.reconciler.handle(&mut self.registry, event) {
            Outcome::Deferred { schedule_flush: true } => {
                self.timer.schedule();
            }
            Outcome::Applied => self.update_gauges(),
            Outcome::Deferred { .. } | Outcome::Dropped => {}
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ReplaceAll(pods, ack) => {
                self.registry.replace_all(pods);
                let _ = ack.send(());
            }
            Command::Upsert(pod, ack) => {
                self.registry.upsert(pod);
                let _ = ack.send(());
            }
            Command::Remove(id, ack) => {
                let _ = ack.send(self.registry.remove(&id));
            }
            Command::ReplaceLogs(id, entries, ack) => {
                let _ = ack.send(self.registry.replace_logs(&id, entries));
            }
            Command::ClearLogs(id, ack) => {
                let _ = ack.send(self.registry.clear_logs(&id));
            }
            Command::Attach(subscription, ack) => {
                self.unsubscribe();
                self.subscription = Some(subscription);
                let _ = ack.send(());
            }
            Command::Unsubscribe(ack) => {
                self.unsubscribe();
                let _ = ack.send(());
            }
            Command::Detach(ack) => {
                self.detach();
                let _ = ack.send(());
            }
            Command::Shutdown(ack) => {
                let _ = ack.send(());
            }
        }
        self.update_gauges();
    }

    /// Drop the current subscription; samples already received still flush
    fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Unsubscribe, cancel the pending flush and drop pending stats.
    /// Safe to call in any state.
    fn detach(&mut self) {
        self.unsubscribe();
        self.timer.cancel();
        self.reconciler.reset();
    }

    fn update_gauges(&self) {
        self.metrics.set_registry_size(
            self.registry.pod_count() as i64,
            self.registry.log_entries() as i64,
        );
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<BackendEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to the running sync layer
///
/// Dropping the handle stops the sync task, which unsubscribes from the
/// event source and cancels any pending flush.
pub struct PodSync {
    backend: Arc<dyn Backend>,
    events: Arc<dyn EventSource>,
    commands: mpsc::Sender<Command>,
    views: watch::Receiver<Arc<RegistryView>>,
    health: HealthRegistry,
    metrics: SyncMetrics,
    logger: StructuredLogger,
    task: Option<JoinHandle<()>>,
}

impl PodSync {
    pub fn builder() -> PodSyncBuilder {
        PodSyncBuilder::new()
    }

    /// The most recently published view; never blocks on the sync task
    pub fn view(&self) -> Arc<RegistryView> {
        Arc::clone(&self.views.borrow())
    }

    /// Receiver notified on every publish
    pub fn watch(&self) -> watch::Receiver<Arc<RegistryView>> {
        self.views.clone()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Subscribe to the event stream, replacing any prior subscription
    ///
    /// The prior subscription is torn down before the new one is opened so
    /// no event is delivered twice. Stats received on the old subscription
    /// are kept for the pending flush.
    pub async fn listen(&self) -> Result<()> {
        self.request(Command::Unsubscribe).await?;

        let subscription = match self.events.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(error = %e, "Failed to subscribe to backend events");
                self.health
                    .set_unhealthy(components::EVENT_STREAM, e.to_string())
                    .await;
                return Err(e);
            }
        };

        self.request(|ack| Command::Attach(subscription, ack)).await?;
        self.health.set_healthy(components::EVENT_STREAM).await;
        self.logger.log_subscription(true);
        Ok(())
    }

    /// Unsubscribe, cancel any pending flush and drop pending stats
    pub async fn stop_listening(&self) -> Result<()> {
        self.request(Command::Detach).await?;
        self.health
            .set_degraded(components::EVENT_STREAM, "Not subscribed")
            .await;
        self.logger.log_subscription(false);
        Ok(())
    }

    /// Fetch the full pod list and replace the snapshot
    ///
    /// On failure the current snapshot is left untouched.
    pub async fn load_pods(&self) -> Result<()> {
        let start = Instant::now();

        let pods = match self.backend.list_pods().await {
            Ok(pods) => pods,
            Err(e) => {
                let message = e.to_string();
                self.metrics.inc_bulk_load_failures();
                self.logger.log_load_failed(&message);
                self.health.record_load(Err(message.as_str())).await;
                return Err(e);
            }
        };

        let count = pods.len();
        self.request(|ack| Command::ReplaceAll(pods, ack)).await?;

        let elapsed = start.elapsed();
        self.metrics.observe_bulk_load_latency(elapsed.as_secs_f64());
        self.health.record_load(Ok(())).await;
        self.logger.log_pods_loaded(count, elapsed.as_millis());
        Ok(())
    }

    /// Replace the snapshot with a caller-supplied pod list
    pub async fn set_pods(&self, pods: Vec<Pod>) -> Result<()> {
        self.request(|ack| Command::ReplaceAll(pods, ack)).await?;
        self.health.record_load(Ok(())).await;
        Ok(())
    }

    /// Seed the backend with pods (harness path); the snapshot is not touched
    /// until the next `load_pods`
    pub async fn inject_pods(&self, pods: Vec<Pod>) -> Result<()> {
        self.backend.inject_pods(pods).await
    }

    /// Add or replace one pod
    pub async fn upsert_pod(&self, pod: Pod) -> Result<()> {
        self.request(|ack| Command::Upsert(pod, ack)).await
    }

    /// Remove a pod with its history and logs; false if it was unknown
    pub async fn remove_pod(&self, id: &str) -> Result<bool> {
        let removed = self
            .request(|ack| Command::Remove(id.to_string(), ack))
            .await?;
        if removed {
            self.logger.log_pod_removed(id);
        }
        Ok(removed)
    }

    /// Replace a pod's log buffer with the backend's recent history
    ///
    /// On failure the current buffer is left untouched.
    pub async fn load_logs(&self, id: &str, tail: Option<usize>) -> Result<bool> {
        let entries = self.backend.pod_logs(id, tail).await.map_err(|e| {
            warn!(pod_id = %id, error = %e, "Failed to fetch pod logs");
            e
        })?;
        self.request(|ack| Command::ReplaceLogs(id.to_string(), entries, ack))
            .await
    }

    /// Discard a pod's log buffer
    pub async fn clear_logs(&self, id: &str) -> Result<bool> {
        self.request(|ack| Command::ClearLogs(id.to_string(), ack))
            .await
    }

    /// Stop the sync task; safe to call more than once
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if self.request(Command::Shutdown).await.is_err() {
            debug!("Sync task already stopped");
        }
        if let Err(e) = task.await {
            warn!(error = %e, "Sync task ended abnormally");
        }
        info!("Pod sync shut down");
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(make(ack))
            .await
            .map_err(|_| SyncError::Closed)?;
        done.await.map_err(|_| SyncError::Closed)
    }
}

/// Builder for creating and starting the sync layer
pub struct PodSyncBuilder {
    backend: Option<Arc<dyn Backend>>,
    events: Option<Arc<dyn EventSource>>,
    config: SyncConfig,
    instance: String,
}

impl PodSyncBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            events: None,
            config: SyncConfig::default(),
            instance: "default".to_string(),
        }
    }

    /// Set the request/response backend
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the push event source
    pub fn events(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use an in-memory backend for both calls and events
    pub fn local(self, backend: Arc<LocalBackend>) -> Self {
        self.backend(backend.clone()).events(backend)
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Name used in structured log records
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Spawn the sync task; must be called inside a tokio runtime
    pub async fn build(self) -> Result<PodSync> {
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("Backend is required"))?;
        let events = self
            .events
            .ok_or_else(|| anyhow::anyhow!("Event source is required"))?;

        let registry = PodRegistry::new(&self.config);
        let views = registry.subscribe();
        let (commands, command_rx) = mpsc::channel(self.config.command_buffer_size.max(1));
        let health = HealthRegistry::for_sync().await;
        let metrics = SyncMetrics::new();

        let task = SyncTask {
            registry,
            reconciler: EventReconciler::new(&self.config),
            timer: FlushTimer::new(self.config.flush_interval),
            subscription: None,
            commands: command_rx,
            health: health.clone(),
            metrics: metrics.clone(),
        };

        Ok(PodSync {
            backend,
            events,
            commands,
            views,
            health,
            metrics,
            logger: StructuredLogger::new(self.instance),
            task: Some(tokio::spawn(task.run())),
        })
    }
}

impl Default for PodSyncBuilder {
    fn default() -> Self {
        Self::new()
    }
}

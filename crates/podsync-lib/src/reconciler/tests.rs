//! Tests for event reconciliation and the sync runtime
//!
//! These tests verify:
//! - Per-kind event handling against the registry
//! - Stats coalescing and flush pacing
//! - Subscription lifecycle and teardown of the running sync task

use super::*;
use crate::backend::{Backend, EventSource, LocalBackend, Subscription};
use crate::error::SyncError;
use crate::health::{components, ComponentStatus};
use crate::models::{
    Confidence, DetectedPort, DetectionMethod, LogBatchEvent, LogEntry, LogLevel, LogSource, Pod,
    PodStatsUpdate, PodStatus, PodStatusChanged, PortDetectedEvent, Process, ProcessListUpdate,
};
use crate::registry::RegistryView;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

fn pod(id: &str, status: PodStatus) -> Pod {
    Pod::new(id, format!("pod-{}", id), status)
}

fn stats(id: &str, cpu: f64, mem: u64) -> BackendEvent {
    BackendEvent::StatsUpdate(PodStatsUpdate {
        pod_id: id.to_string(),
        cpu_percent: cpu,
        memory_used: mem,
        memory_limit: 4096,
    })
}

fn status(id: &str, status: PodStatus) -> BackendEvent {
    BackendEvent::StatusChanged(PodStatusChanged {
        pod_id: id.to_string(),
        status,
        error_message: None,
    })
}

fn log_entry(ts: i64) -> LogEntry {
    LogEntry {
        timestamp: ts,
        message: format!("line {}", ts),
        source: LogSource::Container,
        level: LogLevel::Stdout,
    }
}

fn log_batch(id: &str, range: std::ops::Range<i64>) -> BackendEvent {
    BackendEvent::LogBatch(LogBatchEvent {
        pod_id: id.to_string(),
        entries: range.map(log_entry).collect(),
    })
}

fn detected(id: &str, number: u16) -> BackendEvent {
    BackendEvent::PortDetected(PortDetectedEvent {
        pod_id: id.to_string(),
        port: DetectedPort {
            container_port: number,
            protocol: "tcp".to_string(),
            process_name: "node".to_string(),
            detection_method: DetectionMethod::ProcessName,
            confidence: Confidence::High,
        },
    })
}

mod reconciler_tests {
    use super::*;

    fn setup(pods: Vec<Pod>) -> (PodRegistry, EventReconciler) {
        let config = SyncConfig::default();
        let mut registry = PodRegistry::new(&config);
        registry.replace_all(pods);
        (registry, EventReconciler::new(&config))
    }

    #[test]
    fn test_status_event_after_bulk_load() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Stopped)]);

        let outcome = reconciler.handle(&mut registry, status("a", PodStatus::Running));

        assert_eq!(outcome, Outcome::Applied);
        let view = registry.view();
        assert_eq!(view.pod("a").unwrap().status, PodStatus::Running);
        assert_eq!(view.running_pods().len(), 1);
        assert!(view.stopped_pods().is_empty());
    }

    #[test]
    fn test_three_stats_samples_flush_as_one() {
        let (mut registry, mut reconciler) = setup(vec![pod("x", PodStatus::Running)]);

        // Only the first sample of a window asks for a flush
        assert_eq!(
            reconciler.handle(&mut registry, stats("x", 10.0, 100)),
            Outcome::Deferred { schedule_flush: true }
        );
        assert_eq!(
            reconciler.handle(&mut registry, stats("x", 20.0, 200)),
            Outcome::Deferred { schedule_flush: false }
        );
        assert_eq!(
            reconciler.handle(&mut registry, stats("x", 30.0, 300)),
            Outcome::Deferred { schedule_flush: false }
        );

        // Nothing is visible before the flush
        assert!(registry.view().cpu_history("x").is_empty());
        assert_eq!(reconciler.pending_stats(), 1);

        assert_eq!(reconciler.flush(&mut registry), 1);

        let view = registry.view();
        assert_eq!(view.cpu_history("x").iter().copied().collect::<Vec<_>>(), vec![30.0]);
        assert_eq!(view.memory_history("x").iter().copied().collect::<Vec<_>>(), vec![300.0]);
        assert_eq!(view.pod("x").unwrap().cpu_percent, 30.0);
        assert!(!reconciler.is_flush_scheduled());
    }

    #[test]
    fn test_flush_covers_every_pending_pod() {
        let (mut registry, mut reconciler) =
            setup(vec![pod("a", PodStatus::Running), pod("b", PodStatus::Running)]);

        reconciler.handle(&mut registry, stats("a", 1.0, 10));
        reconciler.handle(&mut registry, stats("b", 2.0, 20));
        let version = registry.view().version();

        assert_eq!(reconciler.flush(&mut registry), 2);

        // One publish for the whole batch
        assert_eq!(registry.view().version(), version + 1);
        assert_eq!(registry.view().cpu_history("a").len(), 1);
        assert_eq!(registry.view().cpu_history("b").len(), 1);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);
        let version = registry.view().version();

        assert_eq!(reconciler.flush(&mut registry), 0);
        assert_eq!(registry.view().version(), version);
    }

    #[test]
    fn test_stats_for_unknown_pod_are_dropped() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);

        let outcome = reconciler.handle(&mut registry, stats("ghost", 50.0, 1));

        assert_eq!(outcome, Outcome::Dropped);
        assert!(!reconciler.is_flush_scheduled());
        assert_eq!(reconciler.pending_stats(), 0);
    }

    #[test]
    fn test_removal_between_sample_and_flush() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);

        reconciler.handle(&mut registry, stats("a", 5.0, 50));
        assert!(registry.remove("a"));

        assert_eq!(reconciler.flush(&mut registry), 0);
        assert!(registry.view().pod("a").is_none());
        assert!(registry.view().cpu_history("a").is_empty());
    }

    #[test]
    fn test_log_batch_over_capacity_keeps_newest() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);

        reconciler.handle(&mut registry, log_batch("a", 0..10_050));

        let logs = registry.view().logs("a");
        assert_eq!(logs.len(), 10_000);
        assert_eq!(logs.first().unwrap().timestamp, 50);
        assert_eq!(logs.last().unwrap().timestamp, 10_049);
    }

    #[test]
    fn test_repeated_status_is_idempotent() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Stopped)]);

        reconciler.handle(&mut registry, status("a", PodStatus::Running));
        let first = registry.view();
        reconciler.handle(&mut registry, status("a", PodStatus::Running));
        let second = registry.view();

        assert_eq!(first.version(), second.version());
        assert_eq!(second.pod("a").unwrap().status, PodStatus::Running);
    }

    #[test]
    fn test_events_after_removal_are_dropped() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);
        reconciler.handle(&mut registry, log_batch("a", 0..3));
        reconciler.handle(&mut registry, stats("a", 1.0, 1));
        reconciler.flush(&mut registry);

        assert!(registry.remove("a"));

        assert_eq!(
            reconciler.handle(&mut registry, status("a", PodStatus::Running)),
            Outcome::Dropped
        );
        assert_eq!(
            reconciler.handle(&mut registry, log_batch("a", 3..4)),
            Outcome::Dropped
        );
        assert_eq!(reconciler.handle(&mut registry, detected("a", 80)), Outcome::Dropped);

        let view = registry.view();
        assert!(view.pod("a").is_none());
        assert_eq!(view.log_len("a"), 0);
        assert!(view.cpu_history("a").is_empty());
        assert!(view.memory_history("a").is_empty());
    }

    #[test]
    fn test_process_list_replaces_previous() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);
        let process = |pid| Process {
            pid,
            name: format!("proc-{}", pid),
            cpu_percent: 0.0,
            memory_bytes: 0,
        };

        for processes in [vec![process(1), process(2)], vec![process(3)]] {
            reconciler.handle(
                &mut registry,
                BackendEvent::ProcessListUpdate(ProcessListUpdate {
                    pod_id: "a".to_string(),
                    processes,
                }),
            );
        }

        let pod = registry.view().pod("a").unwrap();
        assert_eq!(pod.processes.len(), 1);
        assert_eq!(pod.processes[0].pid, 3);
    }

    #[test]
    fn test_detected_ports_append_by_default() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);

        reconciler.handle(&mut registry, detected("a", 3000));
        reconciler.handle(&mut registry, detected("a", 3000));

        assert_eq!(registry.view().pod("a").unwrap().detected_ports.len(), 2);
    }

    #[test]
    fn test_detected_ports_dedupe_when_configured() {
        let config = SyncConfig::default().dedupe_detected_ports(true);
        let mut registry = PodRegistry::new(&config);
        registry.replace_all(vec![pod("a", PodStatus::Running)]);
        let mut reconciler = EventReconciler::new(&config);

        reconciler.handle(&mut registry, detected("a", 3000));
        reconciler.handle(&mut registry, detected("a", 3000));
        reconciler.handle(&mut registry, detected("a", 8080));

        assert_eq!(registry.view().pod("a").unwrap().detected_ports.len(), 2);
    }

    #[test]
    fn test_reset_discards_pending_samples() {
        let (mut registry, mut reconciler) = setup(vec![pod("a", PodStatus::Running)]);
        reconciler.handle(&mut registry, stats("a", 9.0, 9));

        reconciler.reset();
        reconciler.reset();

        assert!(!reconciler.is_flush_scheduled());
        assert_eq!(reconciler.flush(&mut registry), 0);
        assert!(registry.view().cpu_history("a").is_empty());
    }
}

mod runtime_tests {
    use super::*;

    async fn setup(pods: Vec<Pod>) -> (Arc<LocalBackend>, PodSync) {
        let backend = Arc::new(LocalBackend::new());
        backend.inject_pods(pods).await.unwrap();
        let sync = PodSync::builder()
            .local(backend.clone())
            .instance("test")
            .build()
            .await
            .unwrap();
        (backend, sync)
    }

    /// Wait until a published view satisfies `pred`
    async fn wait_for<F>(rx: &mut watch::Receiver<Arc<RegistryView>>, pred: F) -> Arc<RegistryView>
    where
        F: Fn(&RegistryView) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let view = rx.borrow_and_update().clone();
                if pred(&view) {
                    return view;
                }
                rx.changed().await.expect("sync task stopped");
            }
        })
        .await
        .expect("timed out waiting for view")
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_then_status_event() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Stopped)]).await;
        let mut rx = sync.watch();

        assert!(!sync.view().is_initialized());
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();

        assert!(sync.view().is_initialized());
        assert_eq!(sync.view().pod("a").unwrap().status, PodStatus::Stopped);

        backend.emit(status("a", PodStatus::Running)).await;

        let view = wait_for(&mut rx, |v| {
            v.pod("a").map(|p| p.status) == Some(PodStatus::Running)
        })
        .await;
        assert_eq!(view.running_pods().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_are_coalesced_per_frame() {
        let (backend, sync) = setup(vec![pod("x", PodStatus::Running)]).await;
        let mut rx = sync.watch();
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();

        backend.set_stats("x", 10.0, 1, 10).await;
        backend.set_stats("x", 20.0, 2, 10).await;
        backend.set_stats("x", 30.0, 3, 10).await;

        let view = wait_for(&mut rx, |v| !v.cpu_history("x").is_empty()).await;
        assert_eq!(view.cpu_history("x").iter().copied().collect::<Vec<_>>(), vec![30.0]);
        assert_eq!(view.memory_history("x").iter().copied().collect::<Vec<_>>(), vec![3.0]);

        // No further flush arrives for the same window
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sync.view().cpu_history("x").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_keeps_previous_snapshot() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        sync.load_pods().await.unwrap();
        let before = sync.view();

        backend.set_unavailable(true);
        let result = sync.load_pods().await;

        assert!(matches!(result, Err(SyncError::Backend(_))));
        let after = sync.view();
        assert_eq!(after.version(), before.version());
        assert_eq!(after.pod_count(), 1);

        let health = sync.health().health().await;
        assert_eq!(
            health.components[components::BULK_LOAD].status,
            ComponentStatus::Degraded
        );
        assert!(sync.health().readiness().await.ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_load_failure_leaves_uninitialized() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        backend.set_unavailable(true);

        assert!(sync.load_pods().await.is_err());
        assert!(!sync.view().is_initialized());
        assert_eq!(sync.view().pod_count(), 0);
        assert!(!sync.health().readiness().await.ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relisten_does_not_duplicate_events() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        let mut rx = sync.watch();
        sync.load_pods().await.unwrap();

        sync.listen().await.unwrap();
        sync.listen().await.unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        assert_eq!(backend.emit(log_batch("a", 0..1)).await, 1);
        wait_for(&mut rx, |v| v.log_len("a") > 0).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sync.view().log_len("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relisten_keeps_received_stats() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        let mut rx = sync.watch();
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();

        backend.set_stats("a", 42.0, 7, 10).await;
        // Let the sync task take the sample off the old subscription
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        sync.listen().await.unwrap();

        let view = wait_for(&mut rx, |v| !v.cpu_history("a").is_empty()).await;
        assert_eq!(view.cpu_history("a").iter().copied().collect::<Vec<_>>(), vec![42.0]);
        assert_eq!(view.pod("a").unwrap().memory_used, 7);
        assert_eq!(backend.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_marks_stream_unhealthy() {
        let (backend, sync) = setup(vec![]).await;
        backend.set_unavailable(true);

        assert!(matches!(sync.listen().await, Err(SyncError::Subscribe(_))));

        let health = sync.health().health().await;
        assert_eq!(
            health.components[components::EVENT_STREAM].status,
            ComponentStatus::Unhealthy
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_listening_cancels_pending_flush() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();

        backend.set_stats("a", 42.0, 1, 1).await;
        sync.stop_listening().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(sync.view().cpu_history("a").is_empty());
        assert_eq!(backend.subscriber_count(), 0);
        assert_eq!(backend.set_stats("a", 1.0, 1, 1).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_pod_discards_buffers() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        let mut rx = sync.watch();
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();

        backend.inject_logs("a", vec![log_entry(1)]).await;
        backend.set_stats("a", 1.0, 1, 1).await;
        wait_for(&mut rx, |v| v.log_len("a") == 1 && v.cpu_history("a").len() == 1).await;

        assert!(sync.remove_pod("a").await.unwrap());
        assert!(!sync.remove_pod("a").await.unwrap());

        // Late events for the removed pod do not resurrect it
        backend.set_stats("a", 2.0, 2, 2).await;
        backend.inject_logs("a", vec![log_entry(2)]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let view = sync.view();
        assert!(view.pod("a").is_none());
        assert_eq!(view.log_len("a"), 0);
        assert!(view.cpu_history("a").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_and_set_pods() {
        let (_backend, sync) = setup(vec![]).await;

        sync.upsert_pod(pod("a", PodStatus::Starting)).await.unwrap();
        assert_eq!(sync.view().pod_count(), 1);
        assert!(!sync.view().is_initialized());

        sync.set_pods(vec![pod("b", PodStatus::Stopped), pod("c", PodStatus::Running)])
            .await
            .unwrap();
        let view = sync.view();
        assert!(view.is_initialized());
        assert!(view.pod("a").is_none());
        assert_eq!(
            view.all_pods().iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_logs_replaces_buffer() {
        let (backend, sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        sync.load_pods().await.unwrap();
        backend.inject_logs("a", (0..10).map(log_entry).collect()).await;

        assert!(sync.load_logs("a", Some(3)).await.unwrap());
        let logs = sync.view().logs("a");
        assert_eq!(logs.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![7, 8, 9]);

        assert!(sync.clear_logs("a").await.unwrap());
        assert_eq!(sync.view().log_len("a"), 0);
        assert!(!sync.load_logs("missing", None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_safe_twice() {
        let (backend, mut sync) = setup(vec![pod("a", PodStatus::Running)]).await;
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();
        backend.set_stats("a", 1.0, 1, 1).await;

        sync.shutdown().await;
        sync.shutdown().await;

        assert_eq!(backend.subscriber_count(), 0);
        assert!(matches!(sync.load_pods().await, Err(SyncError::Closed)));
        // The last published view stays readable
        assert_eq!(sync.view().pod_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_without_listen() {
        let (_backend, mut sync) = setup(vec![]).await;

        sync.shutdown().await;
        assert!(matches!(sync.stop_listening().await, Err(SyncError::Closed)));
    }

    /// Event source backed by a single channel the test controls
    struct ChannelSource {
        rx: Mutex<Option<mpsc::Receiver<BackendEvent>>>,
    }

    #[async_trait]
    impl EventSource for ChannelSource {
        async fn subscribe(&self) -> crate::Result<Subscription> {
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| SyncError::Subscribe("already subscribed".to_string()))?;
            Ok(Subscription::from_receiver(rx))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_marks_unhealthy() {
        let backend = Arc::new(LocalBackend::new());
        let (tx, rx) = mpsc::channel(8);
        let source = Arc::new(ChannelSource {
            rx: Mutex::new(Some(rx)),
        });
        let sync = PodSync::builder()
            .backend(backend)
            .events(source)
            .build()
            .await
            .unwrap();

        sync.listen().await.unwrap();
        drop(tx);

        let status = timeout(Duration::from_secs(1), async {
            loop {
                let health = sync.health().health().await;
                let status = health.components[components::EVENT_STREAM].status;
                if status == ComponentStatus::Unhealthy {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stream closure not detected");
        assert_eq!(status, ComponentStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_still_flushes_received_stats() {
        let backend = Arc::new(LocalBackend::new());
        backend
            .inject_pods(vec![pod("a", PodStatus::Running)])
            .await
            .unwrap();
        let (tx, rx) = mpsc::channel(8);
        let source = Arc::new(ChannelSource {
            rx: Mutex::new(Some(rx)),
        });
        let sync = PodSync::builder()
            .backend(backend)
            .events(source)
            .build()
            .await
            .unwrap();
        let mut views = sync.watch();
        sync.load_pods().await.unwrap();
        sync.listen().await.unwrap();

        tx.send(stats("a", 12.5, 3)).await.unwrap();
        drop(tx);

        let view = wait_for(&mut views, |v| !v.cpu_history("a").is_empty()).await;
        assert_eq!(view.cpu_history("a").iter().copied().collect::<Vec<_>>(), vec![12.5]);
    }

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let result = PodSync::builder().build().await;
        assert!(result.is_err());
    }
}

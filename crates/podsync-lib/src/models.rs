//! Core data models shared with the backend
//!
//! Wire names are camelCase so payloads decode straight from the backend's JSON.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PodStatus {
    Running,
    Stopped,
    Starting,
    Stopping,
    Error,
}

impl PodStatus {
    /// True for every state that still holds a live container reference.
    ///
    /// `Error` counts as active: a failed pod keeps its container around.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PodStatus::Running | PodStatus::Starting | PodStatus::Stopping | PodStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Running => "running",
            PodStatus::Stopped => "stopped",
            PodStatus::Starting => "starting",
            PodStatus::Stopping => "stopping",
            PodStatus::Error => "error",
        }
    }
}

/// A tracked development environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub id: String,
    pub name: String,
    pub project_path: String,
    pub image: String,
    pub status: PodStatus,
    #[serde(default)]
    pub uptime_secs: Option<u64>,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_used: u64,
    #[serde(default)]
    pub memory_limit: u64,
    #[serde(default)]
    pub default_shell: String,
    #[serde(default)]
    pub exposed_ports: Vec<ExposedPort>,
    #[serde(default)]
    pub detected_ports: Vec<DetectedPort>,
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub remote_user: Option<String>,
    #[serde(default)]
    pub remote_workspace_folder: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
}

impl Pod {
    /// Create a pod with only the identifying fields set
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: PodStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            project_path: String::new(),
            image: String::new(),
            status,
            uptime_secs: None,
            cpu_percent: 0.0,
            memory_used: 0,
            memory_limit: 0,
            default_shell: String::new(),
            exposed_ports: Vec::new(),
            detected_ports: Vec::new(),
            processes: Vec::new(),
            error_message: None,
            container_id: None,
            started_at: None,
            alias: None,
            remote_user: None,
            remote_workspace_folder: None,
            container_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortStatus {
    Active,
    HostPortBusy,
    Error(String),
}

/// A container port forwarded to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedPort {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: String,
    pub status: PortStatus,
    pub auto_expose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectionMethod {
    WellKnown,
    ProcessName,
    Nmap,
    BannerGrab,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Confidence {
    High,
    Low,
}

/// A listening port found by the backend's scanners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPort {
    pub container_port: u16,
    pub protocol: String,
    pub process_name: String,
    pub detection_method: DetectionMethod,
    pub confidence: Confidence,
}

impl DetectedPort {
    /// Two detections describe the same socket when port and protocol match
    pub fn same_socket(&self, other: &DetectedPort) -> bool {
        self.container_port == other.container_port && self.protocol == other.protocol
    }
}

/// A process running inside a pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogSource {
    Build,
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Stdout,
    Stderr,
}

/// One line of build or container output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub message: String,
    pub source: LogSource,
    pub level: LogLevel,
}

// Event payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatsUpdate {
    pub pod_id: String,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatusChanged {
    pub pod_id: String,
    pub status: PodStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessListUpdate {
    pub pod_id: String,
    pub processes: Vec<Process>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDetectedEvent {
    pub pod_id: String,
    pub port: DetectedPort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatchEvent {
    pub pod_id: String,
    pub entries: Vec<LogEntry>,
}

/// Kinds of push events delivered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StatsUpdate,
    StatusChanged,
    ProcessListUpdate,
    PortDetected,
    LogBatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StatsUpdate => "stats-update",
            EventKind::StatusChanged => "status-changed",
            EventKind::ProcessListUpdate => "process-list-update",
            EventKind::PortDetected => "port-detected",
            EventKind::LogBatch => "log-batch",
        }
    }
}

/// Envelope for a single push event
///
/// Encoded as `{"event": "<kind>", "payload": {...}}`. The backend's own
/// channel names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum BackendEvent {
    #[serde(rename = "stats-update", alias = "pod-stats-update")]
    StatsUpdate(PodStatsUpdate),
    #[serde(rename = "status-changed", alias = "pod-status-changed")]
    StatusChanged(PodStatusChanged),
    #[serde(rename = "process-list-update")]
    ProcessListUpdate(ProcessListUpdate),
    #[serde(rename = "port-detected")]
    PortDetected(PortDetectedEvent),
    #[serde(rename = "log-batch", alias = "pod-log-update")]
    LogBatch(LogBatchEvent),
}

impl BackendEvent {
    /// Decode one event from its JSON form
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn pod_id(&self) -> &str {
        match self {
            BackendEvent::StatsUpdate(e) => &e.pod_id,
            BackendEvent::StatusChanged(e) => &e.pod_id,
            BackendEvent::ProcessListUpdate(e) => &e.pod_id,
            BackendEvent::PortDetected(e) => &e.pod_id,
            BackendEvent::LogBatch(e) => &e.pod_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            BackendEvent::StatsUpdate(_) => EventKind::StatsUpdate,
            BackendEvent::StatusChanged(_) => EventKind::StatusChanged,
            BackendEvent::ProcessListUpdate(_) => EventKind::ProcessListUpdate,
            BackendEvent::PortDetected(_) => EventKind::PortDetected,
            BackendEvent::LogBatch(_) => EventKind::LogBatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_decodes_with_missing_optional_fields() {
        let json = r#"{
            "id": "a",
            "name": "web",
            "projectPath": "/work/web",
            "image": "node:20",
            "status": "stopped"
        }"#;

        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.id, "a");
        assert_eq!(pod.status, PodStatus::Stopped);
        assert!(pod.detected_ports.is_empty());
        assert_eq!(pod.uptime_secs, None);
    }

    #[test]
    fn test_port_status_wire_format() {
        let busy = serde_json::to_value(PortStatus::HostPortBusy).unwrap();
        assert_eq!(busy, serde_json::json!("hostPortBusy"));

        let err = serde_json::to_value(PortStatus::Error("refused".into())).unwrap();
        assert_eq!(err, serde_json::json!({ "error": "refused" }));
    }

    #[test]
    fn test_backend_event_decoding() {
        let event = BackendEvent::from_json(
            r#"{"event":"status-changed","payload":{"podId":"a","status":"running","errorMessage":null}}"#,
        )
        .unwrap();

        assert_eq!(event.kind(), EventKind::StatusChanged);
        assert_eq!(event.pod_id(), "a");
    }

    #[test]
    fn test_backend_event_accepts_channel_aliases() {
        let event = BackendEvent::from_json(
            r#"{"event":"pod-stats-update","payload":{"podId":"x","cpuPercent":12.5,"memoryUsed":1024,"memoryLimit":4096}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::StatsUpdate);

        let event = BackendEvent::from_json(
            r#"{"event":"pod-log-update","payload":{"podId":"x","entries":[]}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::LogBatch);
    }

    #[test]
    fn test_backend_event_rejects_unknown_kind() {
        let result = BackendEvent::from_json(r#"{"event":"pod-exploded","payload":{}}"#);
        assert!(matches!(result, Err(crate::SyncError::Decode(_))));
    }

    #[test]
    fn test_error_pods_count_as_active() {
        assert!(PodStatus::Error.is_active());
        assert!(PodStatus::Starting.is_active());
        assert!(!PodStatus::Stopped.is_active());
    }
}

//! Client-side mirror of the pod backend
//!
//! This crate provides the in-memory state layer that sits between the
//! backend process and the rendering layer:
//! - Pod snapshot store with publish-by-replacement semantics
//! - Bounded CPU/memory history and per-pod log ring buffers
//! - Event reconciliation with stats coalescing
//! - Health checks and observability

pub mod backend;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod reconciler;
pub mod registry;

pub use backend::{Backend, EventSource, LocalBackend, Subscription};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, SyncMetrics};
pub use reconciler::{EventReconciler, PodSync, PodSyncBuilder};
pub use registry::{Metric, PodRegistry, RegistryView};

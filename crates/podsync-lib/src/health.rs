//! Health tracking for the sync layer
//!
//! Tracks the event stream and bulk-load components and reports readiness
//! once the first pod snapshot has been loaded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Epoch milliseconds of the last status change
    pub since_ms: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const EVENT_STREAM: &str = "event_stream";
    pub const BULK_LOAD: &str = "bulk_load";
}

/// Health registry shared between the sync handle and any HTTP surface
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    loaded: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the sync components
    pub async fn for_sync() -> Self {
        let registry = Self::new();
        registry.update(components::EVENT_STREAM, ComponentHealth::degraded("Not subscribed")).await;
        registry.update(components::BULK_LOAD, ComponentHealth::healthy()).await;
        registry
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components.write().await.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record the outcome of a bulk load
    ///
    /// A failed load degrades the component but never clears readiness
    /// gained from an earlier success: the previous snapshot is still served.
    pub async fn record_load(&self, result: Result<(), &str>) {
        match result {
            Ok(()) => {
                self.set_healthy(components::BULK_LOAD).await;
                *self.loaded.write().await = true;
            }
            Err(message) => self.set_degraded(components::BULK_LOAD, message).await,
        }
    }

    pub async fn is_loaded(&self) -> bool {
        *self.loaded.read().await
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let loaded = self.is_loaded().await;
        let health = self.health().await;

        let reason = if !loaded {
            Some("Pod snapshot not yet loaded")
        } else if !health.status.is_operational() {
            Some("Sync component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_sync_registry_starts_degraded_until_subscribed() {
        let registry = HealthRegistry::for_sync().await;
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.components.contains_key(components::BULK_LOAD));

        registry.set_healthy(components::EVENT_STREAM).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unhealthy_component_wins() {
        let registry = HealthRegistry::for_sync().await;
        registry
            .set_unhealthy(components::EVENT_STREAM, "Subscription closed")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_requires_first_load() {
        let registry = HealthRegistry::for_sync().await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());

        registry.record_load(Ok(())).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_readiness() {
        let registry = HealthRegistry::for_sync().await;
        registry.record_load(Ok(())).await;
        registry.record_load(Err("backend unavailable")).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::BULK_LOAD].status,
            ComponentStatus::Degraded
        );
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_when_unhealthy() {
        let registry = HealthRegistry::for_sync().await;
        registry.record_load(Ok(())).await;
        registry.set_unhealthy(components::EVENT_STREAM, "Failed").await;

        assert!(!registry.readiness().await.ready);
    }
}

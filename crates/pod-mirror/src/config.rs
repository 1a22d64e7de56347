//! Mirror configuration

use anyhow::{Context, Result};
use podsync_lib::SyncConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Mirror configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health/metrics/queries
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON-lines event feed; stdin when unset
    #[serde(default)]
    pub feed_path: Option<PathBuf>,

    /// JSON array of pods injected into the backend before the first load
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    /// Stats flush interval in milliseconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Collapse repeated port detections for the same socket
    #[serde(default)]
    pub dedupe_detected_ports: bool,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_flush_interval() -> u64 {
    16
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            api_port: default_api_port(),
            feed_path: None,
            seed_path: None,
            flush_interval_ms: default_flush_interval(),
            dedupe_detected_ports: false,
        }
    }
}

impl MirrorConfig {
    /// Load configuration from `MIRROR_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MIRROR").try_parsing(true))
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize from an already built source; malformed values are an error
    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid MIRROR_* configuration")
    }

    /// Library settings derived from this configuration
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .flush_interval(Duration::from_millis(self.flush_interval_ms.max(1)))
            .dedupe_detected_ports(self.dedupe_detected_ports)
    }
}

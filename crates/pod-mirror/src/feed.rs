//! Event feed
//!
//! Reads backend events as JSON lines (`{"event": "...", "payload": {...}}`)
//! and fans them out through the local backend. Malformed lines are logged
//! and skipped.

use anyhow::{Context, Result};
use podsync_lib::{BackendEvent, LocalBackend, Pod};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Counters for one feed run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub delivered: usize,
    pub skipped: usize,
}

/// Pump events from a line reader into the backend until EOF
pub async fn pump<R>(reader: R, backend: Arc<LocalBackend>) -> Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = FeedSummary::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match BackendEvent::from_json(line) {
            Ok(event) => {
                debug!(pod_id = %event.pod_id(), kind = event.kind().as_str(), "Feeding event");
                backend.emit(event).await;
                summary.delivered += 1;
            }
            Err(e) => {
                warn!(error = %e, "Skipping malformed event line");
                summary.skipped += 1;
            }
        }
    }

    info!(
        delivered = summary.delivered,
        skipped = summary.skipped,
        "Event feed finished"
    );
    Ok(summary)
}

/// Pump events from a file, or stdin when no path is given
pub async fn run(path: Option<&Path>, backend: Arc<LocalBackend>) -> Result<FeedSummary> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event feed {}", path.display()))?;
            pump(BufReader::new(file), backend).await
        }
        None => pump(BufReader::new(tokio::io::stdin()), backend).await,
    }
}

/// Read the seed pod list (a JSON array)
pub async fn load_seed(path: &Path) -> Result<Vec<Pod>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let pods: Vec<Pod> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid seed file {}", path.display()))?;
    Ok(pods)
}

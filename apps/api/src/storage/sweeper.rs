use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::BlobStore;

/// Runs `sweep_expired` on a fixed interval until the handle is aborted.
pub fn spawn_sweeper(
    blobs: Arc<dyn BlobStore>,
    ttl: Duration,
    every: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - ttl;
            match blobs.sweep_expired(cutoff).await {
                Ok(0) => {}
                Ok(removed) => info!("Blob sweeper removed {removed} expired blobs"),
                Err(e) => warn!("Blob sweep failed: {e}"),
            }
        }
    })
}

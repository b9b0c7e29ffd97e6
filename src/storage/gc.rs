//! Background sweep of abandoned multipart staging directories.
//!
//! Complete and Abort remove their own staging dirs; the sweeper only
//! reaps uploads whose clients went away. Removal of a directory that a
//! concurrent Complete is still touching simply fails and is retried on
//! the next sweep.

use super::paths::MULTIPART_DIR;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

/// Spawn the sweeper: one pass at startup, then one every `interval`.
/// Abort the returned handle on shutdown.
pub fn spawn(
    data_dir: std::path::PathBuf,
    interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            // First tick completes immediately, giving the startup sweep.
            tick.tick().await;
            sweep(&data_dir, max_age).await;
        }
    })
}

/// Remove every staging directory older than `max_age` across all buckets.
pub async fn sweep(data_dir: &Path, max_age: Duration) {
    let cutoff = SystemTime::now() - max_age;

    let mut buckets = match fs::read_dir(data_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Multipart GC cannot read data dir: {}", err);
            return;
        }
    };

    let mut reaped = 0usize;
    while let Ok(Some(bucket)) = buckets.next_entry().await {
        let staging_root = bucket.path().join(MULTIPART_DIR);
        let mut uploads = match fs::read_dir(&staging_root).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Ok(Some(upload)) = uploads.next_entry().await {
            let modified = match upload.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }
            match fs::remove_dir_all(upload.path()).await {
                Ok(()) => reaped += 1,
                Err(err) => {
                    warn!(
                        "Multipart GC failed to remove {:?} (will retry): {}",
                        upload.path(),
                        err
                    );
                }
            }
        }
    }

    if reaped > 0 {
        debug!("Multipart GC reaped {} abandoned upload(s)", reaped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_reaps_old_keeps_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("bucket").join(MULTIPART_DIR);
        let upload = staging.join("0123456789abcdef0123456789abcdef");
        std::fs::create_dir_all(&upload).unwrap();
        std::fs::write(upload.join("part-00001.tmp"), b"p").unwrap();

        // Everything is fresh against a 1h max-age.
        sweep(dir.path(), Duration::from_secs(3600)).await;
        assert!(upload.exists());

        // With a zero max-age the same dir counts as abandoned.
        sweep(dir.path(), Duration::ZERO).await;
        assert!(!upload.exists());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_staging() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("empty-bucket")).unwrap();
        // No .geckos3-multipart anywhere; sweep must not error or create one.
        sweep(dir.path(), Duration::ZERO).await;
        assert!(!dir.path().join("empty-bucket").join(MULTIPART_DIR).exists());
    }
}

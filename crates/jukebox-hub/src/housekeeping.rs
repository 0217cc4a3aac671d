//! Periodic cache sweep.
//!
//! Deletes room directories under the cache root that no live session owns,
//! plus loose files left at the root by interrupted downloads.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::acquisition::sanitize_component;
use crate::jukebox::Jukebox;

/// What one sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_dirs: usize,
    pub removed_files: usize,
    pub errors: usize,
}

/// Sweep `cache_root`, keeping the directories named in `active`.
///
/// `active` holds directory names, i.e. sanitized room ids.
pub async fn sweep(cache_root: &Path, active: &HashSet<String>) -> SweepReport {
    let mut report = SweepReport::default();
    let mut entries = match tokio::fs::read_dir(cache_root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return report,
        Err(err) => {
            tracing::warn!(dir = %cache_root.display(), error = %err, "read cache root failed");
            report.errors += 1;
            return report;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(dir = %cache_root.display(), error = %err, "list cache root failed");
                report.errors += 1;
                break;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "stat cache entry failed");
                report.errors += 1;
                continue;
            }
        };
        if file_type.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if active.contains(&name) {
                continue;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed stale room cache");
                    report.removed_dirs += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "remove room cache failed");
                    report.errors += 1;
                }
            }
        } else {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed loose cache file");
                    report.removed_files += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "remove cache file failed");
                    report.errors += 1;
                }
            }
        }
    }
    report
}

/// Sweep every `period` until `shutdown` fires.
pub fn spawn(
    jukebox: Arc<Jukebox>,
    cache_root: std::path::PathBuf,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let active: HashSet<String> = jukebox
                .active_rooms()
                .iter()
                .map(|room| sanitize_component(room))
                .collect();
            let report = sweep(&cache_root, &active).await;
            tracing::info!(
                removed_dirs = report.removed_dirs,
                removed_files = report.removed_files,
                errors = report.errors,
                "cache sweep finished"
            );
        }
        tracing::debug!("housekeeping stopped");
    })
}

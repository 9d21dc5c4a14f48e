use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::JobStore;
use crate::server::ProgressReporter;

/// Outcome of one progress sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Pushes offline watch positions of completed downloads to the origin server
#[derive(Debug, Clone)]
pub struct SyncReporter {
    reporter: Arc<dyn ProgressReporter>,
}

impl SyncReporter {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { reporter }
    }

    /// Report every completed job with a watch position as stopped at that
    /// position. Failures are logged and left for the next pass; the store
    /// is flushed afterwards, which also persists pending view offsets.
    pub async fn sync(&self, store: &JobStore) -> SyncSummary {
        let jobs = store.completed_with_offset();
        let mut summary = SyncSummary {
            attempted: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let offset = Duration::from_millis(job.view_offset_ms);
            let duration = Duration::from_millis(job.duration_ms);

            match self.reporter.report_stopped(&job.id, offset, duration).await {
                Ok(()) => {
                    debug!("Synced {} at {}ms", job.id, job.view_offset_ms);
                    store.mark_synced(&job.id, Utc::now());
                    summary.synced += 1;
                }
                Err(e) => {
                    warn!("Failed to sync progress for {}: {}", job.id, e);
                    summary.failed += 1;
                }
            }
        }

        store.persist();
        if summary.attempted > 0 {
            info!(
                "Progress sync: {} of {} reported, {} failed",
                summary.synced, summary.attempted, summary.failed
            );
        }
        summary
    }
}

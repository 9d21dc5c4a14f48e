use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::job::{DownloadJob, DownloadState, NewDownload};
use super::persistence::StateFile;
use crate::models::MediaItemId;

/// The list of download jobs and its persistence.
///
/// The jobs lock is held only while elements are inspected or mutated; file
/// deletion and state writes always happen after it is released.
#[derive(Debug)]
pub struct JobStore {
    jobs: Arc<Mutex<Vec<DownloadJob>>>,
    /// Serializes snapshot-and-write so the last write carries the newest state
    persist_lock: Arc<Mutex<()>>,
    state_file: StateFile,
    directory: PathBuf,
}

impl JobStore {
    pub fn new(directory: impl Into<PathBuf>, state_file: StateFile) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            persist_lock: Arc::new(Mutex::new(())),
            state_file,
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<DownloadJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new queued job. Returns false if the id is already present.
    pub fn enqueue(&self, request: NewDownload) -> bool {
        {
            let mut jobs = self.jobs();
            if jobs.iter().any(|job| job.id == request.id) {
                warn!("Download {} is already in the queue, ignoring", request.id);
                return false;
            }

            let job = DownloadJob::new(request, &self.directory);
            info!("Queued download {} ({})", job.id, job.display_name());
            jobs.push(job);
        }

        self.persist();
        true
    }

    /// Remove a job in any state and delete its local file.
    pub fn cancel(&self, id: &MediaItemId) -> bool {
        let Some(job) = self.remove(id) else {
            debug!("Cancel requested for unknown download {}", id);
            return false;
        };

        info!("Cancelled download {} (was {})", id, job.state);
        remove_file_best_effort(&job.local_path);
        self.persist();
        true
    }

    /// Remove an offline copy. Same effect as [`JobStore::cancel`].
    pub fn delete(&self, id: &MediaItemId) -> bool {
        let Some(job) = self.remove(id) else {
            debug!("Delete requested for unknown download {}", id);
            return false;
        };

        if job.state != DownloadState::Completed {
            debug!("Deleting download {} in state {}", id, job.state);
        }
        info!("Deleted offline copy of {}", id);
        remove_file_best_effort(&job.local_path);
        self.persist();
        true
    }

    fn remove(&self, id: &MediaItemId) -> Option<DownloadJob> {
        let mut jobs = self.jobs();
        let index = jobs.iter().position(|job| &job.id == id)?;
        Some(jobs.remove(index))
    }

    /// Snapshot of all jobs in queue order
    pub fn list(&self) -> Vec<DownloadJob> {
        self.jobs().clone()
    }

    /// Copy of one job as it is right now
    pub fn find(&self, id: &MediaItemId) -> Option<DownloadJob> {
        self.jobs().iter().find(|job| &job.id == id).cloned()
    }

    pub fn contains(&self, id: &MediaItemId) -> bool {
        self.jobs().iter().any(|job| &job.id == id)
    }

    pub fn is_complete(&self, id: &MediaItemId) -> bool {
        self.jobs()
            .iter()
            .any(|job| &job.id == id && job.state == DownloadState::Completed)
    }

    /// Local file of a completed job; None while it is still being written.
    pub fn local_path_for(&self, id: &MediaItemId) -> Option<PathBuf> {
        self.jobs()
            .iter()
            .find(|job| &job.id == id && job.state == DownloadState::Completed)
            .map(|job| job.local_path.clone())
    }

    /// Record the offline watch position. Not persisted here: the position
    /// changes every few seconds during playback, so callers flush with
    /// `save` or a progress sync.
    pub fn update_view_offset(&self, id: &MediaItemId, offset_ms: u64) -> bool {
        self.with_job(id, |job| job.view_offset_ms = offset_ms)
            .is_some()
    }

    /// Run `f` on the job under the lock. `f` must not block.
    pub fn with_job<R>(&self, id: &MediaItemId, f: impl FnOnce(&mut DownloadJob) -> R) -> Option<R> {
        let mut jobs = self.jobs();
        jobs.iter_mut().find(|job| &job.id == id).map(f)
    }

    pub fn has_queued(&self) -> bool {
        self.jobs()
            .iter()
            .any(|job| job.state == DownloadState::Queued)
    }

    /// Mark the first queued job as downloading and return a copy of it.
    pub fn claim_next_queued(&self) -> Option<DownloadJob> {
        let mut jobs = self.jobs();

        if let Some(active) = jobs
            .iter()
            .find(|job| job.state == DownloadState::Downloading)
        {
            warn!(
                "Download {} is still active, not starting another",
                active.id
            );
            return None;
        }

        let job = jobs
            .iter_mut()
            .find(|job| job.state == DownloadState::Queued)?;
        job.transition(DownloadState::Downloading);
        job.error = None;
        Some(job.clone())
    }

    /// Move the job to `to` if the state machine allows it. The caller
    /// persists.
    pub fn transition(&self, id: &MediaItemId, to: DownloadState) -> bool {
        self.with_job(id, |job| {
            let from = job.state;
            if job.transition(to) {
                debug!("Download {}: {} -> {}", id, from, to);
                true
            } else {
                debug!("Download {}: ignoring {} -> {}", id, from, to);
                false
            }
        })
        .unwrap_or(false)
    }

    /// Flip every downloading job to paused. Queued jobs are untouched.
    pub fn pause_active(&self) -> Vec<MediaItemId> {
        let paused: Vec<MediaItemId> = {
            let mut jobs = self.jobs();
            jobs.iter_mut()
                .filter(|job| job.state == DownloadState::Downloading)
                .map(|job| {
                    job.transition(DownloadState::Paused);
                    job.id.clone()
                })
                .collect()
        };

        if !paused.is_empty() {
            self.persist();
        }
        paused
    }

    /// Paused back to queued, keeping the partial file for a ranged resume.
    pub fn resume(&self, id: &MediaItemId) -> bool {
        let resumed = self
            .with_job(id, |job| {
                job.state == DownloadState::Paused && job.transition(DownloadState::Queued)
            })
            .unwrap_or(false);

        if resumed {
            info!("Resumed download {}", id);
            self.persist();
        }
        resumed
    }

    /// Failed back to queued with counters cleared.
    pub fn retry(&self, id: &MediaItemId) -> bool {
        let retried = self
            .with_job(id, |job| {
                if job.state == DownloadState::Failed && job.transition(DownloadState::Queued) {
                    job.reset_progress();
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if retried {
            info!("Retrying download {}", id);
            self.persist();
        }
        retried
    }

    /// Completed jobs that carry an offline watch position
    pub fn completed_with_offset(&self) -> Vec<DownloadJob> {
        self.jobs()
            .iter()
            .filter(|job| job.state == DownloadState::Completed && job.view_offset_ms > 0)
            .cloned()
            .collect()
    }

    pub fn mark_synced(&self, id: &MediaItemId, at: DateTime<Utc>) -> bool {
        self.with_job(id, |job| job.last_synced_at = Some(at))
            .is_some()
    }

    /// Bytes on disk held by completed downloads
    pub fn storage_used(&self) -> u64 {
        self.jobs()
            .iter()
            .filter(|job| job.state == DownloadState::Completed)
            .map(|job| job.downloaded_bytes)
            .sum()
    }

    /// Write the current jobs to the state file.
    pub fn save(&self) -> Result<()> {
        write_snapshot(&self.jobs, &self.persist_lock, &self.state_file)
    }

    /// Save, logging instead of failing; memory stays authoritative.
    pub fn persist(&self) {
        if let Err(e) = self.save() {
            error!("Failed to persist download queue: {:#}", e);
        }
    }

    /// [`JobStore::persist`] for async callers; the write runs on the
    /// blocking pool.
    pub async fn persist_async(&self) {
        let jobs = self.jobs.clone();
        let persist_lock = self.persist_lock.clone();
        let state_file = self.state_file.clone();

        let result = tokio::task::spawn_blocking(move || {
            write_snapshot(&jobs, &persist_lock, &state_file)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to persist download queue: {:#}", e),
            Err(e) => error!("Download queue persist task failed: {}", e),
        }
    }

    /// Replace the in-memory jobs with the state file's contents.
    ///
    /// Jobs caught mid-transfer come back paused, completed jobs whose file
    /// disappeared come back failed, and duplicate ids keep the first record.
    pub fn load(&self) -> Result<usize> {
        let stored = self.state_file.load()?;

        let mut seen = HashSet::new();
        let mut restored = Vec::with_capacity(stored.len());
        for mut job in stored {
            if !seen.insert(job.id.clone()) {
                warn!("Dropping duplicate download record for {}", job.id);
                continue;
            }

            match job.state {
                DownloadState::Downloading => {
                    debug!("Download {} was interrupted, restoring as paused", job.id);
                    job.state = DownloadState::Paused;
                }
                DownloadState::Completed if !job.local_path.exists() => {
                    warn!(
                        "Offline copy of {} is missing at {:?}, marking failed",
                        job.id, job.local_path
                    );
                    job.state = DownloadState::Failed;
                    job.error = Some("Local file missing".to_string());
                }
                _ => {}
            }
            restored.push(job);
        }

        let count = restored.len();
        *self.jobs() = restored;
        info!("Restored {} download jobs", count);
        Ok(count)
    }
}

/// Snapshot taken under the persist lock, so concurrent saves land in order.
fn write_snapshot(
    jobs: &Mutex<Vec<DownloadJob>>,
    persist_lock: &Mutex<()>,
    state_file: &StateFile,
) -> Result<()> {
    let _guard = persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
    let snapshot = jobs.lock().unwrap_or_else(PoisonError::into_inner).clone();
    state_file.save(&snapshot)
}

/// Delete a file, treating "already gone" as success.
fn remove_file_best_effort(path: &Path) {
    log_removal(path, std::fs::remove_file(path));
}

pub(crate) async fn remove_file_async(path: &Path) {
    log_removal(path, tokio::fs::remove_file(path).await);
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use std::fs;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JobStore {
        JobStore::new(
            dir.path(),
            StateFile::new(dir.path().join("downloads.json")),
        )
    }

    fn movie(id: &str) -> NewDownload {
        NewDownload::new(id, format!("Movie {}", id), format!("/parts/{}", id), 600_000, MediaKind::Movie)
    }

    #[test]
    fn test_enqueue_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.enqueue(movie("100")));
        assert!(!store.enqueue(movie("100")));
        assert!(store.enqueue(movie("101")));

        let ids: Vec<_> = store.list().into_iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![MediaItemId::new("100"), MediaItemId::new("101")]);
    }

    #[test]
    fn test_enqueue_persists() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.enqueue(movie("100"));

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.load().unwrap(), 1);
        assert!(reloaded.find(&MediaItemId::new("100")).is_some());
    }

    #[test]
    fn test_cancel_removes_job_and_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let id = MediaItemId::new("100");
        store.enqueue(movie("100"));

        let path = store.find(&id).unwrap().local_path;
        fs::write(&path, b"partial").unwrap();

        assert!(store.cancel(&id));
        assert!(store.find(&id).is_none());
        assert!(!path.exists());
        assert!(!store.cancel(&id));
    }

    #[test]
    fn test_claim_is_fifo_and_exclusive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.enqueue(movie("1"));
        store.enqueue(movie("2"));

        let first = store.claim_next_queued().unwrap();
        assert_eq!(first.id, MediaItemId::new("1"));
        assert_eq!(first.state, DownloadState::Downloading);

        // Second claim refused while the first is active
        assert!(store.claim_next_queued().is_none());

        store.transition(&first.id, DownloadState::Completed);
        let second = store.claim_next_queued().unwrap();
        assert_eq!(second.id, MediaItemId::new("2"));
    }

    #[test]
    fn test_pause_active_leaves_queued_alone() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.enqueue(movie("1"));
        store.enqueue(movie("2"));
        store.claim_next_queued();

        let paused = store.pause_active();
        assert_eq!(paused, vec![MediaItemId::new("1")]);
        assert_eq!(store.find(&MediaItemId::new("1")).unwrap().state, DownloadState::Paused);
        assert_eq!(store.find(&MediaItemId::new("2")).unwrap().state, DownloadState::Queued);
    }

    #[test]
    fn test_resume_and_retry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let id = MediaItemId::new("1");
        store.enqueue(movie("1"));

        assert!(!store.resume(&id), "queued job cannot be resumed");

        store.claim_next_queued();
        store.with_job(&id, |job| job.downloaded_bytes = 10);
        store.pause_active();
        assert!(store.resume(&id));
        let job = store.find(&id).unwrap();
        assert_eq!(job.state, DownloadState::Queued);
        assert_eq!(job.downloaded_bytes, 10);

        store.claim_next_queued();
        store.transition(&id, DownloadState::Failed);
        assert!(store.retry(&id));
        let job = store.find(&id).unwrap();
        assert_eq!(job.state, DownloadState::Queued);
        assert_eq!(job.downloaded_bytes, 0);
    }

    #[tokio::test]
    async fn test_persist_async_writes_current_jobs() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let id = MediaItemId::new("1");
        store.enqueue(movie("1"));
        store.update_view_offset(&id, 7_000);

        store.persist_async().await;

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.load().unwrap(), 1);
        assert_eq!(reloaded.find(&id).unwrap().view_offset_ms, 7_000);

        let path = dir.path().join("1.mp4");
        fs::write(&path, b"partial").unwrap();
        remove_file_async(&path).await;
        remove_file_async(&path).await;
        assert!(!path.exists());
    }

    #[test]
    fn test_view_offset_not_persisted_until_save() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let id = MediaItemId::new("1");
        store.enqueue(movie("1"));

        assert!(store.update_view_offset(&id, 5_000));
        assert!(!store.update_view_offset(&MediaItemId::new("nope"), 5_000));

        let reloaded = store_in(&dir);
        reloaded.load().unwrap();
        assert_eq!(reloaded.find(&id).unwrap().view_offset_ms, 0);

        store.save().unwrap();
        reloaded.load().unwrap();
        assert_eq!(reloaded.find(&id).unwrap().view_offset_ms, 5_000);
    }

    #[test]
    fn test_completed_queries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let id = MediaItemId::new("1");
        store.enqueue(movie("1"));

        assert!(!store.is_complete(&id));
        assert!(store.local_path_for(&id).is_none());

        store.claim_next_queued();
        store.with_job(&id, |job| {
            job.total_bytes = 42;
            job.downloaded_bytes = 42;
        });
        store.transition(&id, DownloadState::Completed);

        assert!(store.is_complete(&id));
        assert_eq!(store.local_path_for(&id), Some(dir.path().join("1.mp4")));
        assert_eq!(store.storage_used(), 42);
    }

    #[test]
    fn test_load_restores_interrupted_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.enqueue(movie("active"));
        store.enqueue(movie("done"));
        store.claim_next_queued();
        store.with_job(&MediaItemId::new("done"), |job| {
            job.state = DownloadState::Completed;
        });
        store.save().unwrap();

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.load().unwrap(), 2);
        assert_eq!(
            reloaded.find(&MediaItemId::new("active")).unwrap().state,
            DownloadState::Paused
        );
        // No file was ever written for "done"
        assert_eq!(
            reloaded.find(&MediaItemId::new("done")).unwrap().state,
            DownloadState::Failed
        );
    }
}

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::config::DownloadConfig;
use super::job::{DownloadJob, NewDownload};
use super::persistence::StateFile;
use super::progress::{DownloadProgress, ProgressCallback};
use super::request::TransferSettings;
use super::stats::DownloaderStats;
use super::store::JobStore;
use super::sync::{SyncReporter, SyncSummary};
use super::worker;
use crate::config::Config;
use crate::models::MediaItemId;
use crate::server::{OriginClient, ProgressReporter};
use crate::tasks::{TaskHandle, TaskSpawner};

/// State shared between the manager handles and the worker task
pub(super) struct Inner {
    pub(super) store: JobStore,
    pub(super) client: OriginClient,
    pub(super) settings: TransferSettings,
    pub(super) chunk_size: usize,
    /// Cleared by pause; the worker checks it between chunks
    pub(super) running: AtomicBool,
    /// Set while a worker task is draining the queue
    pub(super) worker_active: AtomicBool,
    pub(super) stats: DownloaderStats,
    worker: Mutex<Option<TaskHandle<()>>>,
    spawner: TaskSpawner,
    progress_callback: RwLock<Option<ProgressCallback>>,
    current: Mutex<Option<DownloadProgress>>,
    sync: SyncReporter,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("directory", &self.store.directory())
            .field("settings", &self.settings)
            .field("running", &self.running)
            .field("worker_active", &self.worker_active)
            .finish_non_exhaustive()
    }
}

impl Inner {
    pub(super) fn set_current(&self, progress: Option<DownloadProgress>) {
        *self.current_mut() = progress;
    }

    pub(super) fn current_mut(&self) -> MutexGuard<'_, Option<DownloadProgress>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn progress_callback(&self) -> Option<ProgressCallback> {
        self.progress_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Offline download manager.
///
/// Cheap to clone; every clone drives the same queue and worker. Must be
/// created inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Manager that reports watch progress to the configured origin server.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Self::build_client(config)?;
        let reporter: Arc<dyn ProgressReporter> = Arc::new(client.clone());
        Self::with_parts(config, client, reporter)
    }

    /// Manager with a custom progress reporter.
    pub fn with_reporter(config: &Config, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        let client = Self::build_client(config)?;
        Self::with_parts(config, client, reporter)
    }

    fn build_client(config: &Config) -> Result<OriginClient> {
        OriginClient::new(
            &config.server,
            config.client.clone(),
            config.downloads.connect_timeout(),
            config.downloads.read_timeout(),
        )
    }

    fn with_parts(
        config: &Config,
        client: OriginClient,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        let downloads: &DownloadConfig = &config.downloads;
        downloads.validate()?;

        let directory = downloads.directory()?;
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create download directory {:?}", directory))?;
        let state_file = StateFile::new(downloads.state_file()?);

        info!(
            "Download manager using {:?} (state: {:?}, quality: {})",
            directory,
            state_file.path(),
            downloads.quality
        );

        let inner = Inner {
            store: JobStore::new(directory, state_file),
            client,
            settings: TransferSettings {
                quality: downloads.quality,
                audio_bitrate_kbps: downloads.audio_bitrate_kbps,
            },
            chunk_size: downloads.chunk_size_bytes,
            running: AtomicBool::new(false),
            worker_active: AtomicBool::new(false),
            stats: DownloaderStats::new(),
            worker: Mutex::new(None),
            spawner: TaskSpawner::current()?,
            progress_callback: RwLock::new(None),
            current: Mutex::new(None),
            sync: SyncReporter::new(reporter),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Queue a download. Returns false, without changing anything, if the id
    /// is already known.
    pub fn queue_download(&self, request: NewDownload) -> bool {
        self.inner.store.enqueue(request)
    }

    /// Enable downloads and make sure a worker is draining the queue.
    /// Does nothing if a worker is already running.
    pub fn start_downloads(&self) {
        self.inner.running.store(true, Ordering::SeqCst);

        if self
            .inner
            .worker_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Download worker already running");
            return;
        }

        let inner = self.inner.clone();
        let handle = self
            .inner
            .spawner
            .spawn("download-worker", move |token| worker::run(inner, token));

        let mut slot = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle)
            && !previous.is_finished()
        {
            // The previous worker has already cleared its active flag and is
            // only logging its report
            debug!("Detaching finishing worker {}", previous.name());
        }
    }

    /// Stop after the current chunk and mark active downloads paused.
    /// Queued jobs stay queued.
    pub fn pause_downloads(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let paused = self.inner.store.pause_active();
        info!("Paused downloads ({} active)", paused.len());
    }

    /// Re-queue a paused job. Call [`DownloadManager::start_downloads`] to
    /// pick it up.
    pub fn resume_download(&self, id: &MediaItemId) -> bool {
        self.inner.store.resume(id)
    }

    /// Re-queue a failed job from scratch.
    pub fn retry_download(&self, id: &MediaItemId) -> bool {
        self.inner.store.retry(id)
    }

    /// Remove a job in any state, including the one being downloaded, and
    /// delete its file.
    pub fn cancel_download(&self, id: &MediaItemId) -> bool {
        self.inner.store.cancel(id)
    }

    /// Remove an offline copy and its file.
    pub fn delete_download(&self, id: &MediaItemId) -> bool {
        self.inner.store.delete(id)
    }

    pub fn list(&self) -> Vec<DownloadJob> {
        self.inner.store.list()
    }

    pub fn find(&self, id: &MediaItemId) -> Option<DownloadJob> {
        self.inner.store.find(id)
    }

    pub fn is_complete(&self, id: &MediaItemId) -> bool {
        self.inner.store.is_complete(id)
    }

    /// Playable local file, only for completed downloads
    pub fn local_path_for(&self, id: &MediaItemId) -> Option<PathBuf> {
        self.inner.store.local_path_for(id)
    }

    /// Record the offline watch position. Flushed by the next save or sync.
    pub fn update_view_offset(&self, id: &MediaItemId, offset_ms: u64) -> bool {
        self.inner.store.update_view_offset(id, offset_ms)
    }

    /// Install the global progress observer, replacing any previous one.
    ///
    /// Called on the worker task after every chunk with
    /// `(downloaded_bytes, total_bytes)`; it must not block.
    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        *self
            .inner
            .progress_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear_progress_callback(&self) {
        *self
            .inner
            .progress_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Progress and speed of the job currently downloading
    pub fn current_progress(&self) -> Option<DownloadProgress> {
        self.inner.current_mut().clone()
    }

    pub fn stats(&self) -> &DownloaderStats {
        &self.inner.stats
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Report offline watch positions of completed downloads.
    pub async fn sync_progress_to_server(&self) -> SyncSummary {
        self.inner.sync.sync(&self.inner.store).await
    }

    pub fn save_state(&self) -> Result<()> {
        self.inner.store.save()
    }

    /// Replace the queue with the persisted one. Returns the number of jobs.
    pub fn load_state(&self) -> Result<usize> {
        if self.inner.worker_active.load(Ordering::SeqCst) {
            warn!("Loading download state while the worker is running");
        }
        self.inner.store.load()
    }

    /// Bytes held by completed downloads
    pub fn storage_used(&self) -> u64 {
        self.inner.store.storage_used()
    }

    /// Wait for the current worker, if any, to go idle.
    pub async fn join_worker(&self) {
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.join().await;
        }
    }

    /// Stop the worker, leaving its job paused, and flush state.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.running.store(false, Ordering::SeqCst);

        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.cancel();
            handle.join().await;
        }

        self.inner.store.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::job::DownloadState;
    use crate::models::MediaKind;
    use crate::test_utils::common::wait_for;
    use crate::test_utils::test_config;
    use mockito::{Matcher, Server};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn movie(id: &str, path: &str) -> NewDownload {
        NewDownload::new(id, format!("Movie {}", id), path, 600_000, MediaKind::Movie)
    }

    #[tokio::test]
    async fn test_worker_drains_queue_in_order() {
        let mut server = Server::new_async().await;
        for path in ["/parts/1", "/parts/2"] {
            server
                .mock("GET", path)
                .match_query(Matcher::Any)
                .with_status(200)
                .with_body(vec![7u8; 10_000])
                .create_async()
                .await;
        }

        let (config, _dir) = test_config(&server.url(), 4_096);
        let manager = DownloadManager::new(&config).unwrap();
        manager.queue_download(movie("1", "/parts/1"));
        manager.queue_download(movie("2", "/parts/2"));

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        let observer = manager.clone();
        manager.set_progress_callback(move |_, _| {
            if let Some(progress) = observer.current_progress() {
                let mut seen = seen.lock().unwrap();
                if seen.last() != Some(&progress.id) {
                    seen.push(progress.id.clone());
                }
            }
        });

        manager.start_downloads();
        manager.start_downloads();
        manager.join_worker().await;
        manager.clear_progress_callback();

        assert_eq!(
            *order.lock().unwrap(),
            vec![MediaItemId::new("1"), MediaItemId::new("2")]
        );
        for id in ["1", "2"] {
            let job = manager.find(&MediaItemId::new(id)).unwrap();
            assert_eq!(job.state, DownloadState::Completed);
            assert_eq!(job.downloaded_bytes, 10_000);
            assert_eq!(job.total_bytes, 10_000);
        }
        assert_eq!(manager.storage_used(), 20_000);
        assert_eq!(manager.stats().completed(), 2);
        assert!(manager.current_progress().is_none());
    }

    #[tokio::test]
    async fn test_single_job_downloading_at_a_time() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/parts/".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(vec![1u8; 20_000])
            .expect(3)
            .create_async()
            .await;

        let (config, _dir) = test_config(&server.url(), 1_000);
        let manager = DownloadManager::new(&config).unwrap();
        for id in ["a", "b", "c"] {
            manager.queue_download(movie(id, &format!("/parts/{}", id)));
        }

        let max_active = Arc::new(AtomicUsize::new(0));
        let observed = max_active.clone();
        let observer = manager.clone();
        manager.set_progress_callback(move |_, _| {
            let active = observer
                .list()
                .iter()
                .filter(|job| job.state == DownloadState::Downloading)
                .count();
            observed.fetch_max(active, Ordering::SeqCst);
        });

        manager.start_downloads();
        manager.join_worker().await;
        manager.clear_progress_callback();

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(manager.list().iter().all(|job| job.state == DownloadState::Completed));
    }

    #[tokio::test]
    async fn test_shutdown_leaves_job_paused() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/parts/1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_chunked_body(|writer| {
                writer.write_all(&[0u8; 8_192])?;
                std::thread::sleep(Duration::from_secs(2));
                writer.write_all(&[0u8; 8_192])
            })
            .create_async()
            .await;

        let (config, _dir) = test_config(&server.url(), 4_096);
        let manager = DownloadManager::new(&config).unwrap();
        manager.queue_download(movie("1", "/parts/1"));
        manager.start_downloads();

        let id = MediaItemId::new("1");
        assert!(
            wait_for(
                || manager.find(&id).is_some_and(|job| job.downloaded_bytes > 0),
                Duration::from_secs(5)
            )
            .await
        );

        manager.shutdown().await.unwrap();
        assert_eq!(manager.find(&id).unwrap().state, DownloadState::Paused);
        assert!(!manager.is_running());
    }
}

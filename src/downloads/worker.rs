use futures::StreamExt;
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::job::{DownloadJob, DownloadState};
use super::manager::Inner;
use super::progress::{DownloadProgress, SpeedMeter};
use super::request::build_transfer_request;
use super::store::remove_file_async;
use crate::models::MediaItemId;

/// How a transfer that did not fail ended
#[derive(Debug, PartialEq, Eq)]
enum TransferOutcome {
    /// Whole body written, carries the final size
    Completed(u64),
    /// Paused, cancelled or shut down between chunks
    Interrupted,
}

/// Releases the worker slot if the task ends without reaching its normal exit,
/// e.g. when a progress callback panics.
struct ActiveWorker<'a> {
    inner: &'a Inner,
    released: bool,
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let paused = self.inner.store.pause_active();
        self.inner.set_current(None);
        self.inner.worker_active.store(false, Ordering::SeqCst);
        warn!(
            "Download worker ended abnormally, paused {} active job(s)",
            paused.len()
        );
    }
}

/// Body of the single download worker task.
///
/// Drains QUEUED jobs in FIFO order while downloads are enabled and returns
/// as soon as none is left.
pub(super) async fn run(inner: Arc<Inner>, token: CancellationToken) {
    info!("Download worker started");
    let mut slot = ActiveWorker {
        inner: &inner,
        released: false,
    };

    loop {
        while inner.running.load(Ordering::SeqCst) && !token.is_cancelled() {
            let Some(job) = inner.store.claim_next_queued() else {
                break;
            };
            inner.store.persist_async().await;
            inner.process(job, &token).await;
        }

        slot.released = true;
        inner.worker_active.store(false, Ordering::SeqCst);

        // A job queued after the scan above but before the flag was cleared
        // would otherwise wait for the next start.
        if !token.is_cancelled()
            && inner.running.load(Ordering::SeqCst)
            && inner.store.has_queued()
            && inner
                .worker_active
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            slot.released = false;
            continue;
        }
        break;
    }
    drop(slot);

    let queued = inner
        .store
        .list()
        .iter()
        .filter(|job| job.state == DownloadState::Queued)
        .count();
    info!("Download worker idle. {}", inner.stats.format_report(queued));
}

impl Inner {
    async fn process(&self, job: DownloadJob, token: &CancellationToken) {
        info!("Starting download {} ({})", job.id, job.display_name());
        self.stats.increment_started();
        self.set_current(Some(DownloadProgress::new(
            job.id.clone(),
            job.downloaded_bytes,
            job.total_bytes,
        )));

        let started = Instant::now();
        let outcome = self.transfer(&job, token).await;
        self.set_current(None);

        match outcome {
            Ok(TransferOutcome::Completed(bytes)) => {
                let completed = self
                    .store
                    .with_job(&job.id, |stored| {
                        let ok = stored.transition(DownloadState::Completed);
                        if ok {
                            stored.total_bytes = bytes;
                            stored.downloaded_bytes = bytes;
                        }
                        ok
                    })
                    .unwrap_or(false);

                if completed {
                    self.stats.increment_completed();
                    self.store.persist_async().await;
                    info!(
                        "Download {} completed: {} bytes in {:?}",
                        job.id,
                        bytes,
                        started.elapsed()
                    );
                } else {
                    self.settle_interrupted(&job).await;
                }
            }
            Ok(TransferOutcome::Interrupted) => self.settle_interrupted(&job).await,
            Err(e) => {
                error!("Download {} failed: {}", job.id, e);
                let failed = self
                    .store
                    .with_job(&job.id, |stored| {
                        let ok = stored.transition(DownloadState::Failed);
                        if ok {
                            stored.error = Some(e.to_string());
                        }
                        ok
                    });

                match failed {
                    // Paused while the failing request was in flight, keep the partial file
                    Some(false) => debug!("Download {} no longer active, not marking failed", job.id),
                    Some(true) | None => {
                        self.stats.increment_failed();
                        remove_file_async(&job.local_path).await;
                        self.store.persist_async().await;
                    }
                }
            }
        }
    }

    /// Resolve a transfer that stopped early: a removed job loses its file,
    /// anything still marked downloading becomes paused.
    async fn settle_interrupted(&self, job: &DownloadJob) {
        self.stats.increment_interrupted();

        match self.store.find(&job.id) {
            None => {
                info!("Download {} was cancelled", job.id);
                remove_file_async(&job.local_path).await;
            }
            Some(stored) => {
                // Pause already persisted the job; a stop from shutdown has not
                if self.store.transition(&job.id, DownloadState::Paused) {
                    self.store.persist_async().await;
                }
                info!(
                    "Download {} paused at {} bytes",
                    job.id,
                    stored.downloaded_bytes
                );
            }
        }
    }

    async fn transfer(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
    ) -> Result<TransferOutcome, TransferError> {
        let request = build_transfer_request(job, &self.settings, &self.client)?;
        debug!(
            "Download {} via {:?} ({}), session {}",
            job.id, request.mode, request.container, request.session
        );

        let mut resume_from = 0;
        if request.supports_resume() && job.downloaded_bytes > 0 {
            let on_disk = tokio::fs::metadata(&job.local_path)
                .await
                .map(|meta| meta.len())
                .unwrap_or(0);
            resume_from = on_disk.min(job.downloaded_bytes);
        }

        // Paused after the last chunk: nothing left to ask for
        if resume_from > 0 && resume_from >= job.total_bytes && job.total_bytes > 0 {
            debug!("Download {} already holds all {} bytes", job.id, resume_from);
            return Ok(TransferOutcome::Completed(resume_from));
        }

        let opened = tokio::select! {
            _ = token.cancelled() => return Ok(TransferOutcome::Interrupted),
            response = self.client.open_stream(&request.url, request.headers.clone(), resume_from) => response,
        };
        let response = match opened {
            Err(e) if resume_from > 0 && e.status() == Some(416) => {
                info!(
                    "Range from byte {} not satisfiable for {}, restarting from zero",
                    resume_from, job.id
                );
                resume_from = 0;
                tokio::select! {
                    _ = token.cancelled() => return Ok(TransferOutcome::Interrupted),
                    response = self.client.open_stream(&request.url, request.headers.clone(), 0) => response?,
                }
            }
            other => other?,
        };

        let resumed = resume_from > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        if resume_from > 0 && !resumed {
            info!("Server ignored range for {}, restarting from zero", job.id);
        }
        let start = if resumed { resume_from } else { 0 };
        let total = response
            .content_length()
            .map(|length| length + start)
            .unwrap_or(0);

        let active = self
            .store
            .with_job(&job.id, |stored| {
                if stored.state != DownloadState::Downloading {
                    return false;
                }
                stored.downloaded_bytes = start;
                stored.total_bytes = total;
                true
            })
            .unwrap_or(false);
        if !active {
            return Ok(TransferOutcome::Interrupted);
        }

        let path = job.local_path.as_path();
        let mut file = open_target(path, start).await?;

        // A cancel that ran before the file existed had nothing to delete
        if !self.store.contains(&job.id) {
            drop(file);
            return Ok(TransferOutcome::Interrupted);
        }

        let chunk_size = self.chunk_size;
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::with_capacity(chunk_size);
        let mut meter = SpeedMeter::new();
        let mut written = start;

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Ok(TransferOutcome::Interrupted),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(TransferError::Body(e.to_string())),
                None => break,
            }

            while buffer.len() >= chunk_size {
                let chunk: Vec<u8> = buffer.drain(..chunk_size).collect();
                if !self
                    .write_chunk(&job.id, path, &mut file, &chunk, &mut written, &mut meter)
                    .await?
                {
                    return Ok(TransferOutcome::Interrupted);
                }
            }
        }

        if !buffer.is_empty()
            && !self
                .write_chunk(&job.id, path, &mut file, &buffer, &mut written, &mut meter)
                .await?
        {
            return Ok(TransferOutcome::Interrupted);
        }

        file.flush()
            .await
            .map_err(|e| TransferError::io(path, e))?;
        file.sync_all()
            .await
            .map_err(|e| TransferError::io(path, e))?;

        if total > 0 && written < total {
            return Err(TransferError::Incomplete {
                received: written,
                expected: total,
            });
        }

        Ok(TransferOutcome::Completed(written))
    }

    /// Write one chunk for a job the store still has as downloading.
    ///
    /// Returns false, with nothing left on disk beyond the recorded byte
    /// count, if the job was paused or removed.
    async fn write_chunk(
        &self,
        id: &MediaItemId,
        path: &Path,
        file: &mut File,
        chunk: &[u8],
        written: &mut u64,
        meter: &mut SpeedMeter,
    ) -> Result<bool, TransferError> {
        if !self.should_continue(id) {
            return Ok(false);
        }

        file.write_all(chunk)
            .await
            .map_err(|e| TransferError::io(path, e))?;

        let len = chunk.len() as u64;
        let recorded = self
            .store
            .with_job(id, |job| {
                if job.state != DownloadState::Downloading {
                    return None;
                }
                job.downloaded_bytes += len;
                if job.total_bytes > 0 && job.downloaded_bytes > job.total_bytes {
                    job.total_bytes = job.downloaded_bytes;
                }
                Some((job.downloaded_bytes, job.total_bytes))
            })
            .flatten();

        let Some((downloaded, total)) = recorded else {
            // State changed while the chunk was being written
            file.set_len(*written)
                .await
                .map_err(|e| TransferError::io(path, e))?;
            return Ok(false);
        };

        *written = downloaded;
        self.stats.add_bytes_downloaded(len);

        let speed = meter.record(len);
        {
            let mut current = self.current_mut();
            if let Some(progress) = current.as_mut() {
                progress.update(downloaded, total, speed);
            }
        }

        let callback = self.progress_callback();
        if let Some(callback) = callback {
            callback(downloaded, total);
        }

        Ok(true)
    }

    fn should_continue(&self, id: &MediaItemId) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            debug!("Downloads stopped, interrupting {}", id);
            return false;
        }

        match self.store.with_job(id, |job| job.state) {
            Some(DownloadState::Downloading) => true,
            Some(state) => {
                debug!("Download {} is now {}, stopping", id, state);
                false
            }
            None => {
                debug!("Download {} was removed, stopping", id);
                false
            }
        }
    }
}

/// Open the destination for writing at `start`, truncating anything after it.
async fn open_target(path: &Path, start: u64) -> Result<File, TransferError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(start == 0)
        .open(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;

    if start > 0 {
        file.set_len(start)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| TransferError::io(path, e))?;
        debug!("Appending to partial file {:?} from byte {}", path, start);
    }

    Ok(file)
}

//! Offline download engine: job queue, single background worker, progress
//! accounting, persistence and watch-progress sync.

mod config;
mod error;
mod job;
mod manager;
mod persistence;
mod progress;
mod request;
mod stats;
mod store;
mod sync;
mod worker;

pub use config::DownloadConfig;
pub use error::TransferError;
pub use job::{DownloadJob, DownloadState, NewDownload, local_path_for};
pub use manager::DownloadManager;
pub use persistence::StateFile;
pub use progress::{DownloadProgress, ProgressCallback, SpeedMeter};
pub use request::{
    TransferMode, TransferRequest, TransferSettings, build_transfer_request, build_with_session,
};
pub use stats::DownloaderStats;
pub use store::JobStore;
pub use sync::{SyncReporter, SyncSummary};

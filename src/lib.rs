// Offline download engine for the Reel media client

pub mod config;
pub mod downloads;
pub mod models;
pub mod server;
pub mod tasks;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use downloads::{DownloadJob, DownloadManager, DownloadState, NewDownload};
pub use models::{MediaItemId, MediaKind, Quality};

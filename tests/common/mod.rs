use reel_offline::config::{Config, ServerConfig};
use reel_offline::downloads::{DownloadConfig, DownloadManager, NewDownload};
use reel_offline::models::{MediaKind, Quality};
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestContext {
    pub config: Config,
    _temp_dir: TempDir,
}

impl TestContext {
    /// Downloads and state under a fresh temp dir, fetching originals from
    /// `server_url`.
    pub fn new(server_url: &str, chunk_size_bytes: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let config = Config {
            server: ServerConfig {
                url: server_url.to_string(),
                auth_token: Some("test_token".to_string()),
            },
            downloads: DownloadConfig {
                directory: Some(temp_dir.path().join("downloads")),
                state_file: Some(temp_dir.path().join("downloads.json")),
                chunk_size_bytes,
                connect_timeout_secs: 5,
                read_timeout_secs: 10,
                quality: Quality::Original,
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            config,
            _temp_dir: temp_dir,
        }
    }

    pub fn manager(&self) -> DownloadManager {
        DownloadManager::new(&self.config).expect("Failed to create manager")
    }

    pub fn state_file(&self) -> PathBuf {
        self.config
            .downloads
            .state_file()
            .expect("state file path")
    }
}

pub fn movie(id: &str, remote_path: &str) -> NewDownload {
    NewDownload::new(id, format!("Movie {}", id), remote_path, 600_000, MediaKind::Movie)
}

pub fn episode(id: &str, remote_path: &str) -> NewDownload {
    NewDownload::new(id, "Pilot", remote_path, 1_800_000, MediaKind::Episode)
        .with_parent("Test Show")
        .with_episode(1, 1)
}

#![cfg(test)]

use tempfile::TempDir;

use crate::config::{Config, ServerConfig};
use crate::downloads::DownloadConfig;
use crate::models::Quality;

/// Config pointing at `server_url` with downloads inside a fresh temp dir.
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn test_config(server_url: &str, chunk_size_bytes: usize) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = Config {
        server: ServerConfig {
            url: server_url.to_string(),
            auth_token: Some("test-token".to_string()),
        },
        downloads: DownloadConfig {
            directory: Some(temp_dir.path().join("media")),
            state_file: Some(temp_dir.path().join("state").join("downloads.json")),
            chunk_size_bytes,
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
            quality: Quality::Original,
            ..Default::default()
        },
        ..Default::default()
    };
    (config, temp_dir)
}

/// Common test utilities
pub mod common {
    use std::future::Future;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Wait for an async condition to become true
    pub async fn wait_for_async<F, Fut>(mut condition: F, max_wait: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }

    /// Synchronous variant for conditions that need no awaiting
    pub async fn wait_for(mut condition: impl FnMut() -> bool, max_wait: Duration) -> bool {
        wait_for_async(|| std::future::ready(condition()), max_wait).await
    }
}

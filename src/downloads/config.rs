use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Quality;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory holding downloaded media files
    pub directory: Option<PathBuf>,

    /// Queue state file, defaults to `downloads.json` inside `directory`
    pub state_file: Option<PathBuf>,

    /// Write granularity in bytes. Pause and cancel are noticed between
    /// chunks, so this also bounds their latency.
    pub chunk_size_bytes: usize,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum silence on an open transfer before it fails, in seconds
    pub read_timeout_secs: u64,

    /// Quality used when building transfer requests
    pub quality: Quality,

    /// Bitrate for audio transcodes in kbps
    pub audio_bitrate_kbps: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: None, // Will be set to platform-specific default
            state_file: None,
            chunk_size_bytes: 256 * 1024,
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            quality: Quality::default(),
            audio_bitrate_kbps: 320,
        }
    }
}

impl DownloadConfig {
    /// Get the download directory, using platform-specific defaults if not set
    pub fn directory(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.directory {
            Ok(dir.clone())
        } else {
            Self::default_directory()
        }
    }

    /// Get platform-specific default download directory
    pub fn default_directory() -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to get data directory"))?;
        Ok(data_dir.join("reel-offline").join("downloads"))
    }

    pub fn state_file(&self) -> Result<PathBuf> {
        match self.state_file {
            Some(ref path) => Ok(path.clone()),
            None => Ok(self.directory()?.join("downloads.json")),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("chunk_size_bytes must be greater than 0"));
        }

        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeouts must be greater than 0"));
        }

        if self.audio_bitrate_kbps == 0 {
            return Err(anyhow::anyhow!("audio_bitrate_kbps must be greater than 0"));
        }

        Ok(())
    }
}

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::{MediaItemId, MediaKind};

/// Characters kept verbatim when turning an id into a file name
const FILENAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Lifecycle state of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadState {
    /// Waiting for the worker
    Queued,
    /// Transfer in progress, at most one job at a time
    Downloading,
    /// Interrupted by the user, partial file kept
    Paused,
    /// File fully written
    Completed,
    /// Transfer failed, partial file removed
    Failed,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Downloading => "DOWNLOADING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Check if a state transition is valid
    pub fn can_transition_to(&self, to: DownloadState) -> bool {
        use DownloadState::*;

        match (self, to) {
            (Queued, Downloading) => true,

            (Downloading, Completed) => true,
            (Downloading, Failed) => true,
            (Downloading, Paused) => true,

            // Resume
            (Paused, Queued) => true,

            // Retry
            (Failed, Queued) => true,

            _ => false,
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller supplies to queue a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownload {
    pub id: MediaItemId,
    pub title: String,
    pub remote_path: String,
    pub duration_ms: u64,
    pub media_kind: MediaKind,
    pub parent_title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
}

impl NewDownload {
    pub fn new(
        id: impl Into<MediaItemId>,
        title: impl Into<String>,
        remote_path: impl Into<String>,
        duration_ms: u64,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            remote_path: remote_path.into(),
            duration_ms,
            media_kind,
            parent_title: None,
            season_number: None,
            episode_number: None,
        }
    }

    /// Show or artist name
    pub fn with_parent(mut self, parent_title: impl Into<String>) -> Self {
        self.parent_title = Some(parent_title.into());
        self
    }

    pub fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.season_number = Some(season);
        self.episode_number = Some(episode);
        self
    }
}

/// One requested offline copy of a media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: MediaItemId,
    pub title: String,
    #[serde(default)]
    pub parent_title: Option<String>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    pub media_kind: MediaKind,

    /// Server-relative path of the media part
    pub remote_path: String,
    /// Only guaranteed to exist while `state` is `Completed`
    pub local_path: PathBuf,

    /// 0 until the transfer declares its length
    pub total_bytes: u64,
    pub downloaded_bytes: u64,

    pub duration_ms: u64,
    /// Offline watch position, written by the player
    pub view_offset_ms: u64,

    pub state: DownloadState,
    /// Last failure, cleared when the job is queued again
    #[serde(default)]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    /// Last successful progress push to the origin server
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl DownloadJob {
    pub fn new(request: NewDownload, directory: &Path) -> Self {
        let local_path = local_path_for(directory, &request.id, request.media_kind);

        Self {
            id: request.id,
            title: request.title,
            parent_title: request.parent_title,
            season_number: request.season_number,
            episode_number: request.episode_number,
            media_kind: request.media_kind,
            remote_path: request.remote_path,
            local_path,
            total_bytes: 0,
            downloaded_bytes: 0,
            duration_ms: request.duration_ms,
            view_offset_ms: 0,
            state: DownloadState::Queued,
            error: None,
            created_at: Utc::now(),
            last_synced_at: None,
        }
    }

    /// Human readable name, e.g. "Show - S01E02 - Title"
    pub fn display_name(&self) -> String {
        match (&self.parent_title, self.season_number, self.episode_number) {
            (Some(parent), Some(season), Some(episode)) => {
                format!("{} - S{:02}E{:02} - {}", parent, season, episode, self.title)
            }
            (Some(parent), _, _) => format!("{} - {}", parent, self.title),
            _ => self.title.clone(),
        }
    }

    /// Apply a transition, rejecting ones the state machine does not allow
    pub(crate) fn transition(&mut self, to: DownloadState) -> bool {
        if !self.state.can_transition_to(to) {
            return false;
        }
        self.state = to;
        true
    }

    /// Back to `Queued` with the counters cleared.
    pub(crate) fn reset_progress(&mut self) {
        self.downloaded_bytes = 0;
        self.total_bytes = 0;
        self.error = None;
    }
}

/// Deterministic local file path for an item
pub fn local_path_for(directory: &Path, id: &MediaItemId, kind: MediaKind) -> PathBuf {
    let stem = utf8_percent_encode(id.as_str(), FILENAME_SAFE).to_string();
    directory.join(format!("{}.{}", stem, kind.container()))
}

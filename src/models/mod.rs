mod identifiers;

pub use identifiers::{MediaItemId, SessionId};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of catalog item a download was requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    Track,
}

impl MediaKind {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Track)
    }

    /// Container produced by a transcode for this kind, also used as the
    /// local file extension.
    pub fn container(&self) -> &'static str {
        match self {
            Self::Movie | Self::Episode => "mp4",
            Self::Track => "mp3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
            Self::Track => "track",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Download quality setting chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Quality {
    /// Fetch the original media part without transcoding
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "1080p")]
    Full1080,
    #[default]
    #[serde(rename = "720p")]
    High720,
    #[serde(rename = "480p")]
    Medium480,
    #[serde(rename = "360p")]
    Low360,
}

impl Quality {
    /// Target resolution and video bitrate (kbps) for transcoded qualities.
    pub fn video_profile(&self) -> Option<(Resolution, u32)> {
        let (width, height, bitrate) = match self {
            Self::Original => return None,
            Self::Full1080 => (1920, 1080, 8000),
            Self::High720 => (1280, 720, 4000),
            Self::Medium480 => (854, 480, 2000),
            Self::Low360 => (640, 360, 1000),
        };
        Some((Resolution { width, height }, bitrate))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Original => "original",
            Self::Full1080 => "1080p",
            Self::High720 => "720p",
            Self::Medium480 => "480p",
            Self::Low360 => "360p",
        };
        f.write_str(name)
    }
}

use reqwest::header::HeaderMap;
use url::Url;

use super::job::DownloadJob;
use crate::models::{MediaKind, Quality, SessionId};
use crate::server::{ApiError, OriginClient, header_map};

const VIDEO_TRANSCODE_PATH: &str = "/video/:/transcode/universal/start.mp4";
const AUDIO_TRANSCODE_PATH: &str = "/music/:/transcode/universal/start.mp3";

/// How the bytes are produced on the server side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Original media part, byte-addressable so it can be resumed
    Direct,
    /// Server re-encodes on the fly, always fetched from the start
    Transcode,
}

/// Quality inputs for building a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub quality: Quality,
    pub audio_bitrate_kbps: u32,
}

/// A concrete transfer ready to be sent
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: Url,
    pub headers: HeaderMap,
    /// Expected container of the response body
    pub container: &'static str,
    pub mode: TransferMode,
    pub session: SessionId,
}

impl TransferRequest {
    pub fn supports_resume(&self) -> bool {
        self.mode == TransferMode::Direct
    }
}

/// Build the transfer for a job with a freshly generated session.
pub fn build_transfer_request(
    job: &DownloadJob,
    settings: &TransferSettings,
    client: &OriginClient,
) -> Result<TransferRequest, ApiError> {
    build_with_session(job, settings, client, SessionId::generate())
}

/// Build the transfer for a job. Deterministic for a given session.
pub fn build_with_session(
    job: &DownloadJob,
    settings: &TransferSettings,
    client: &OriginClient,
    session: SessionId,
) -> Result<TransferRequest, ApiError> {
    let (path, mode) = match (job.media_kind, settings.quality.video_profile()) {
        (MediaKind::Track, _) => (AUDIO_TRANSCODE_PATH, TransferMode::Transcode),
        (_, Some(_)) => (VIDEO_TRANSCODE_PATH, TransferMode::Transcode),
        (_, None) => (job.remote_path.as_str(), TransferMode::Direct),
    };

    let mut url = Url::parse(&format!("{}{}", client.base_url(), path))
        .map_err(|e| ApiError::InvalidRequest(format!("Bad transfer URL for {}: {}", job.id, e)))?;

    {
        let mut query = url.query_pairs_mut();
        match mode {
            TransferMode::Direct => {
                query.append_pair("download", "1");
            }
            TransferMode::Transcode => {
                let metadata_path = format!("/library/metadata/{}", job.id);
                query
                    .append_pair("path", &metadata_path)
                    .append_pair("mediaIndex", "0")
                    .append_pair("partIndex", "0")
                    .append_pair("protocol", "http")
                    .append_pair("offset", "0")
                    .append_pair("directPlay", "0")
                    .append_pair("directStream", "0")
                    .append_pair("session", session.as_str());

                if job.media_kind.is_audio() {
                    query.append_pair("audioBitrate", &settings.audio_bitrate_kbps.to_string());
                } else if let Some((resolution, bitrate)) = settings.quality.video_profile() {
                    query
                        .append_pair("videoResolution", &resolution.to_string())
                        .append_pair("maxVideoBitrate", &bitrate.to_string())
                        .append_pair("videoQuality", "100");
                }
            }
        }

        if let Some(token) = client.auth_token() {
            query.append_pair("X-Plex-Token", token);
        }
    }

    let mut pairs = client.identity().header_pairs();
    pairs.push(("X-Plex-Session-Identifier", session.as_str().to_string()));
    let headers = header_map(pairs.iter().map(|(name, value)| (*name, value.as_str())));

    let container = match mode {
        TransferMode::Direct => job.media_kind.container(),
        TransferMode::Transcode if job.media_kind.is_audio() => "mp3",
        TransferMode::Transcode => "mp4",
    };

    Ok(TransferRequest {
        url,
        headers,
        container,
        mode,
        session,
    })
}

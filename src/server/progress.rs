use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::client::OriginClient;
use super::errors::ApiError;
use super::traits::ProgressReporter;
use crate::models::MediaItemId;

/// Playback state string understood by the timeline endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OriginClient {
    /// Report a playback position through the timeline endpoint
    pub async fn update_timeline(
        &self,
        media_id: &MediaItemId,
        position: Duration,
        duration: Duration,
        state: PlaybackState,
    ) -> Result<(), ApiError> {
        let position_ms = position.as_millis().to_string();
        let duration_ms = duration.as_millis().to_string();
        let timeline_url = self.build_url("/:/timeline");

        debug!(
            "Updating timeline - media_id: {}, position: {}ms, state: {}",
            media_id, position_ms, state
        );

        let response = self
            .client
            .get(&timeline_url)
            .headers(self.standard_headers())
            .query(&[
                ("ratingKey", media_id.as_str()),
                ("key", &format!("/library/metadata/{}", media_id)),
                ("identifier", "com.plexapp.plugins.library"),
                ("state", state.as_str()),
                ("time", &position_ms),
                ("duration", &duration_ms),
                ("playbackTime", &position_ms),
            ])
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Timeline update response: {} - {}", status, body);
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        debug!("Timeline update successful for media_id: {}", media_id);
        Ok(())
    }
}

#[async_trait]
impl ProgressReporter for OriginClient {
    async fn report_stopped(
        &self,
        media_id: &MediaItemId,
        offset: Duration,
        duration: Duration,
    ) -> Result<(), ApiError> {
        self.update_timeline(media_id, offset, duration, PlaybackState::Stopped)
            .await
    }
}

use async_trait::async_trait;
use std::time::Duration;

use super::errors::ApiError;
use crate::models::MediaItemId;

/// Receiver of offline watch progress, normally the origin server
#[async_trait]
pub trait ProgressReporter: Send + Sync + std::fmt::Debug {
    /// Report that playback of `media_id` stopped at `offset` of `duration`.
    async fn report_stopped(
        &self,
        media_id: &MediaItemId,
        offset: Duration,
        duration: Duration,
    ) -> Result<(), ApiError>;
}

use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use tracing::{debug, warn};

use super::client::OriginClient;
use super::errors::ApiError;

impl OriginClient {
    /// Open a byte stream for a transfer.
    ///
    /// A non-zero `resume_from` asks for the remainder of the resource with a
    /// `Range` header; the caller must check for `206 Partial Content` since
    /// servers are free to ignore it.
    pub async fn open_stream(
        &self,
        url: &url::Url,
        headers: HeaderMap,
        resume_from: u64,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.client.get(url.clone()).headers(headers);
        if resume_from > 0 {
            let range = format!("bytes={}-", resume_from);
            let value = HeaderValue::from_str(&range)
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            request = request.header(RANGE, value);
            debug!("Requesting range {} from {}", range, url.path());
        }

        let response = request.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Transfer request for {} failed: {}", url.path(), status);
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        debug!(
            "Transfer response {} for {} (length: {:?})",
            status,
            url.path(),
            response.content_length()
        );
        Ok(response)
    }
}

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ServerConfig;

pub const DEFAULT_PRODUCT: &str = "Reel";
pub const DEFAULT_PLATFORM: &str = "Linux";
pub const DEFAULT_CLIENT_IDENTIFIER: &str = "reel-media-player";

/// Client identification stamped on every request to the origin server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    pub product: String,
    pub version: String,
    pub platform: String,
    pub device: String,
    pub client_identifier: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            product: DEFAULT_PRODUCT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            device: "Desktop".to_string(),
            client_identifier: DEFAULT_CLIENT_IDENTIFIER.to_string(),
        }
    }
}

impl ClientIdentity {
    /// Header name/value pairs identifying this client
    pub fn header_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-Plex-Client-Identifier", self.client_identifier.clone()),
            ("X-Plex-Product", self.product.clone()),
            ("X-Plex-Version", self.version.clone()),
            ("X-Plex-Platform", self.platform.clone()),
            ("X-Plex-Device", self.device.clone()),
        ]
    }
}

/// Build a header map from name/value pairs, dropping any value that is not a
/// legal header value.
pub fn header_map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header {}", name),
        }
    }
    headers
}

/// Standard headers for requests that are not transfers: JSON accept,
/// client identification and the auth token when present.
pub fn standard_headers(identity: &ClientIdentity, auth_token: Option<&str>) -> HeaderMap {
    let pairs = identity.header_pairs();
    let mut headers = header_map(pairs.iter().map(|(name, value)| (*name, value.as_str())));
    headers.insert("Accept", HeaderValue::from_static("application/json"));

    if let Some(token) = auth_token {
        match HeaderValue::from_str(token) {
            Ok(value) => {
                headers.insert("X-Plex-Token", value);
            }
            Err(_) => warn!("Auth token is not a valid header value, sending without it"),
        }
    }

    headers
}

/// HTTP client for the origin media server
#[derive(Debug, Clone)]
pub struct OriginClient {
    pub(super) client: reqwest::Client,
    pub(super) base_url: String,
    pub(super) auth_token: Option<String>,
    pub(super) identity: ClientIdentity,
}

impl OriginClient {
    pub fn new(
        server: &ServerConfig,
        identity: ClientIdentity,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        debug!("Origin client for {} ({})", server.url, identity.device);

        Ok(Self {
            client,
            base_url: server.url.trim_end_matches('/').to_string(),
            auth_token: server.auth_token.clone(),
            identity,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub(super) fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(super) fn standard_headers(&self) -> HeaderMap {
        standard_headers(&self.identity, self.auth_token.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_headers_include_identity_and_token() {
        let identity = ClientIdentity::default();
        let headers = standard_headers(&identity, Some("abc"));

        assert_eq!(headers["X-Plex-Product"], "Reel");
        assert_eq!(headers["X-Plex-Client-Identifier"], "reel-media-player");
        assert_eq!(headers["X-Plex-Token"], "abc");
        assert_eq!(headers["Accept"], "application/json");
    }

    #[test]
    fn test_invalid_token_is_dropped() {
        let headers = standard_headers(&ClientIdentity::default(), Some("bad\ntoken"));
        assert!(headers.get("X-Plex-Token").is_none());
        assert!(headers.get("X-Plex-Platform").is_some());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let server = ServerConfig {
            url: "http://nas:32400/".to_string(),
            auth_token: None,
        };
        let client = OriginClient::new(
            &server,
            ClientIdentity::default(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.build_url("/identity"), "http://nas:32400/identity");
    }
}

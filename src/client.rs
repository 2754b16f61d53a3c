use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use thiserror::Error;
use url::Url;

use super::config::{ConfigError, UpstreamSettings};
use super::protocol::{TreeEntry, TreeResponse};

/// Failure to obtain the upstream tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network, timeout or decoding failure; no upstream status available.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl FetchError {
    /// HTTP status to mirror towards our own callers.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Transport(_) => 502,
            FetchError::Status { status, .. } => *status,
        }
    }

    /// Diagnostic payload: the upstream body, or the transport message.
    pub fn detail(&self) -> &str {
        match self {
            FetchError::Transport(message) => message,
            FetchError::Status { body, .. } => body,
        }
    }
}

/// Anything that can produce a full tree listing.
#[async_trait]
pub trait TreeSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<TreeEntry>, FetchError>;
}

/// Stateless client for the upstream recursive tree endpoint.
#[derive(Debug)]
pub struct RemoteTreeClient {
    http: reqwest::Client,
    url: Url,
}

impl RemoteTreeClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = &settings.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ConfigError::Token)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            log::info!("No upstream token configured, using unauthenticated requests");
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("modelcat/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            http,
            url: settings.url.clone(),
        })
    }
}

#[async_trait]
impl TreeSource for RemoteTreeClient {
    async fn fetch(&self) -> Result<Vec<TreeEntry>, FetchError> {
        // Make the request
        log::debug!("Fetching tree listing from {}", self.url);
        let resp = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        // Surface non-success statuses with the upstream body
        let status = resp.status();
        if !status.is_success() {
            let body = body_or_read_error(resp.text().await);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Decode listing
        let listing = resp
            .json::<TreeResponse>()
            .await
            .map_err(|e| FetchError::Transport(format!("invalid tree listing: {}", e)))?;
        if listing.truncated {
            log::warn!("Upstream tree listing is truncated");
        }
        log::debug!("Fetched {} tree entries", listing.tree.len());
        Ok(listing.tree)
    }
}

/// Upstream body for diagnostics; a failed read is reported in its place.
fn body_or_read_error<E: std::fmt::Display>(read: Result<String, E>) -> String {
    read.unwrap_or_else(|e| format!("failed to read upstream body: {}", e))
}

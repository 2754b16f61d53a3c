use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_UPSTREAM_URL: &str =
    "https://api.github.com/repos/eclipse-tractusx/sldt-semantic-models/git/trees/main?recursive=1";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid upstream url {url:?}: {source}")]
    UpstreamUrl { url: String, source: url::ParseError },

    #[error("invalid base url {url:?}: {source}")]
    BaseUrl { url: String, source: url::ParseError },

    #[error("base url {0:?} cannot carry a path")]
    BaseUrlNotABase(String),

    #[error("bearer token is not a valid header value")]
    Token,

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Where and how the tree listing is fetched. Read once at startup.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl UpstreamSettings {
    pub fn new(
        url: &str,
        token: Option<String>,
        timeout_secs: u64,
        cache_ttl_secs: u64,
    ) -> Result<Self, ConfigError> {
        let url = Url::parse(url).map_err(|source| ConfigError::UpstreamUrl {
            url: url.to_string(),
            source,
        })?;
        // An empty token means "unauthenticated", same as an absent one
        let token = token.filter(|t| !t.trim().is_empty());
        Ok(Self {
            url,
            token,
            timeout: Duration::from_secs(timeout_secs),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
        })
    }
}

/// Settings of the HTTP frontend.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub web_dir: PathBuf,
    pub base_url: Option<Url>,
    pub api_fallback: bool,
}

impl SiteSettings {
    pub fn new(
        web_dir: PathBuf,
        base_url: Option<&str>,
        api_fallback: bool,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url
            .map(|raw| {
                let url = Url::parse(raw).map_err(|source| ConfigError::BaseUrl {
                    url: raw.to_string(),
                    source,
                })?;
                if url.cannot_be_a_base() {
                    return Err(ConfigError::BaseUrlNotABase(raw.to_string()));
                }
                Ok(url)
            })
            .transpose()?;
        Ok(Self {
            web_dir,
            base_url,
            api_fallback,
        })
    }

    /// Base prefix for absolute links, without a trailing slash.
    pub fn base_prefix(&self, host: Option<&str>, secure: bool) -> String {
        match &self.base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => {
                let scheme = if secure { "https" } else { "http" };
                format!("{}://{}", scheme, host.unwrap_or("localhost"))
            }
        }
    }
}

//! Datafile sources
//!
//! Where the Sync Controller gets raw datafile bytes from. The HTTP source is
//! used in production; tests plug in scripted sources.

use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use tkt_common::{Error, Result};
use tracing::debug;

/// User-Agent sent with datafile requests
const USER_AGENT: &str = concat!("tkt-xp/", env!("CARGO_PKG_VERSION"));

/// Anything that can produce the latest raw datafile
#[async_trait]
pub trait DatafileSource: Send + Sync {
    /// Fetch the current datafile payload
    async fn fetch(&self) -> Result<Vec<u8>>;

    /// Human-readable origin for logs and status
    fn describe(&self) -> String;
}

/// Fetches the datafile over HTTP(S)
pub struct HttpDatafileSource {
    http_client: Client,
    url: String,
}

impl HttpDatafileSource {
    /// Create a source for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DatafileSource for HttpDatafileSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        debug!(url = %self.url, "Fetching datafile");

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("GET {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("GET {} returned {}", self.url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("Reading body from {} failed: {}", self.url, e)))?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Source used when no datafile URL is configured
///
/// Every fetch fails, so the service keeps serving the bundled datafile and
/// the failure shows up in sync status.
pub struct UnconfiguredSource;

#[async_trait]
impl DatafileSource for UnconfiguredSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        Err(Error::Config(
            "no datafile_url or sdk_key configured".to_string(),
        ))
    }

    fn describe(&self) -> String {
        "unconfigured".to_string()
    }
}

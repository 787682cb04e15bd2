//! Data sources for the Client Sync Agent

use crate::attributes::UserId;
use crate::homescreen::{decode_catalog, decode_modules_value, Event, HomescreenModule};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tkt_common::{Error, Result};
use tracing::{debug, warn};

/// Homescreen decision as seen by a client
#[derive(Debug, Clone, PartialEq)]
pub struct HomescreenPayload {
    pub modules: Vec<HomescreenModule>,
    pub variation_key: String,
    pub enabled: bool,
}

/// What a client needs to build its homescreen
#[async_trait]
pub trait HomescreenBackend: Send + Sync + 'static {
    async fn fetch_catalog(&self) -> Result<Vec<Event>>;

    async fn fetch_homescreen(
        &self,
        user_id: &UserId,
        operating_system: &str,
    ) -> Result<HomescreenPayload>;
}

/// Backend talking to this service (decisions) and the catalog service over HTTP
pub struct HttpBackend {
    http_client: Client,
    base_url: String,
    catalog_url: String,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        catalog_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            catalog_url: catalog_url.into(),
        })
    }

    async fn get_json(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("{} request failed: {}", what, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned {}", what, status)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Parse(format!("{} body: {}", what, e)))
    }
}

#[async_trait]
impl HomescreenBackend for HttpBackend {
    async fn fetch_catalog(&self) -> Result<Vec<Event>> {
        debug!(url = %self.catalog_url, "Fetching event catalog");
        let body = self
            .get_json(self.http_client.get(&self.catalog_url), "catalog")
            .await?;
        // Accept a bare list or a `{ data: [...] }` envelope
        let list = match body {
            Value::Object(mut obj) => obj.remove("data").unwrap_or(Value::Null),
            other => other,
        };
        // An error envelope is a failed fetch, not an empty catalog
        if !list.is_array() {
            return Err(Error::Parse(
                "catalog body is neither a list nor a { data: [...] } envelope".to_string(),
            ));
        }
        Ok(decode_catalog(&list))
    }

    async fn fetch_homescreen(
        &self,
        user_id: &UserId,
        operating_system: &str,
    ) -> Result<HomescreenPayload> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Base URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .push("homescreen")
            .push(user_id.as_str());
        let request = self
            .http_client
            .get(url)
            .query(&[("operating_system", operating_system)]);
        let mut body = self.get_json(request, "homescreen").await?;

        let data = body.get_mut("data").map(Value::take).unwrap_or(Value::Null);
        let modules = decode_modules_value(data);
        if let Some(reason) = modules.reason() {
            warn!("Homescreen response unusable, using default modules: {}", reason);
        }
        Ok(HomescreenPayload {
            modules: modules.into_inner(),
            variation_key: body["variationKey"].as_str().unwrap_or("off").to_string(),
            enabled: body["enabled"].as_bool().unwrap_or(false),
        })
    }
}

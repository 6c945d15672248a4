//! Notable-events API client.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use pinsync_common::{Error, EventDomain, Result};

use crate::source::{EventPage, EventSource, SortOrder};

/// Default API root.
const DEFAULT_BASE_URL: &str = "https://webapi.prod.humane.cloud/";
/// Path of the per-domain event listing, relative to the API root.
const EVENTS_PATH: &str = "notable-events/mydata";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    concat!("PinSync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// HTTP source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// API root; must end in `/` for relative joins to keep its path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// User agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Bearer token. Obtaining it is the caller's business.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Event source backed by the remote REST API.
pub struct HttpEventSource {
    http: Client,
    events_url: Url,
    access_token: Option<String>,
}

impl HttpEventSource {
    /// Create a new HTTP source.
    ///
    /// # Errors
    /// - `Config` if the base URL does not parse
    /// - `Network` if the HTTP client cannot be built
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let events_url = Self::events_url(&config.base_url)?;

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            events_url,
            access_token: config.access_token,
        })
    }

    /// Resolve the event listing URL against a base URL.
    fn events_url(base_url: &str) -> Result<Url> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|url| url.join(EVENTS_PATH))
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base_url, e)))
    }

    /// Handle API response and map errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))?;
            decode_body(&body)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }
}

/// Error for a non-success response.
fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound("Resource not found".to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Authentication("Invalid or expired token".to_string())
        }
        _ => Error::Network(format!("API error: {} - {}", status, body)),
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::Decode(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl EventSource for HttpEventSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_events(
        &self,
        domain: EventDomain,
        page: u64,
        size: u64,
        sort: SortOrder,
    ) -> Result<EventPage> {
        debug!("GET {} domain={} page={} size={}", self.events_url, domain, page, size);

        let page = page.to_string();
        let size = size.to_string();
        let mut request = self.http.get(self.events_url.clone()).query(&[
            ("domain", domain.as_wire_str()),
            ("page", page.as_str()),
            ("size", size.as_str()),
            ("sort", sort.as_query()),
        ]);

        if let Some(token) = &self.access_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch events: {}", e)))?;

        self.handle_response(response).await
    }
}

/// Factory function for HTTP source.
pub fn create_http_source(config: serde_json::Value) -> Result<Arc<dyn EventSource>> {
    let http_config: HttpSourceConfig = if config.is_null() {
        HttpSourceConfig::default()
    } else {
        serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid HTTP source config: {}", e)))?
    };

    Ok(Arc::new(HttpEventSource::new(http_config)?))
}

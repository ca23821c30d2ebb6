//! HTTP client for the remote payment facilitator.
//!
//! The facilitator is an opaque external service; this client covers the two
//! endpoints the gate needs: `POST ./verify` and `GET ./health`.
//!
//! ## Example
//!
//! ```rust
//! use denlabs_x402_axum::facilitator_client::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example").unwrap();
//! ```
//!
//! ## Error Handling
//!
//! Custom error types capture detailed failure contexts, including
//! - URL construction
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Unexpected HTTP status responses

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use denlabs_x402_types::wire::{VerifyOutcome, VerifyRequest};

/// Errors that can occur while interacting with the facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// A client for the facilitator's `./verify` and `./health` endpoints.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL for `POST /verify` requests
    verify_url: Url,
    /// Full URL for `GET /health` probes
    health_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Bound on the verify call
    verify_timeout: Duration,
    /// Bound on the health probe
    health_timeout: Duration,
}

impl FacilitatorClient {
    /// Default bound on the verify call.
    ///
    /// A slow facilitator must not stall a gated request indefinitely, so
    /// the verify call carries an explicit timeout just like the probe.
    pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default bound on the health probe.
    pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_millis(2000);

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// This sets up `./verify` and `./health` endpoint URLs relative to the base.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let client = Client::new();
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        let health_url =
            base_url
                .join("./health")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./health URL",
                    source: e,
                })?;
        Ok(Self {
            client,
            base_url,
            verify_url,
            health_url,
            headers: HeaderMap::new(),
            verify_timeout: Self::DEFAULT_VERIFY_TIMEOUT,
            health_timeout: Self::DEFAULT_HEALTH_TIMEOUT,
        })
    }

    /// Returns the base URL used by this client.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./health` URL relative to [`FacilitatorClient::base_url`].
    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    /// Attaches custom headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    /// Sets the bound on the verify call.
    pub fn with_verify_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.verify_timeout = timeout;
        this
    }

    /// Sets the bound on the health probe.
    pub fn with_health_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.health_timeout = timeout;
        this
    }

    /// Sends a `POST /verify` request to the facilitator.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyOutcome, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Probes `GET /health`, bounded by the configured probe timeout.
    ///
    /// `Ok(true)` only on a 200 status; any other status is unhealthy.
    /// Transport failures and timeouts surface as `Err`, which callers
    /// treat as unhealthy.
    pub async fn health(&self) -> Result<bool, FacilitatorClientError> {
        let mut req = self
            .client
            .get(self.health_url.clone())
            .timeout(self.health_timeout);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        let http_response = req.send().await.map_err(|e| FacilitatorClientError::Http {
            context: "GET /health",
            source: e,
        })?;
        Ok(http_response.status() == StatusCode::OK)
    }

    /// Generic POST helper that handles JSON serialization, error mapping,
    /// and timeout application.
    ///
    /// `context` is a human-readable identifier used in error messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self
            .client
            .post(url.clone())
            .json(payload)
            .timeout(self.verify_timeout);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

/// Converts a String URL into a `FacilitatorClient`.
impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}

//! Session layer for the SciCrunch/InterLex API.
//!
//! Owns the transport: API-key injection, retry/backoff, response
//! classification, and bounded concurrent batch dispatch. Knows nothing
//! about entity semantics.
//!
//! The registry reads authentication and parameters from the JSON request
//! body on GET as well as POST — never from headers or the query string —
//! so every outbound call serializes a body with the key injected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::error::{InterlexError, Result, ValidationError};
use crate::types::value_to_string;

pub const DEFAULT_BASE_URL: &str = "https://scicrunch.org/api/1/";

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;
const DEFAULT_RETRY_STATUSES: &[u16] = &[429, 500, 502, 504];
const DEFAULT_BATCH_LIMIT: usize = 3;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A prepared wire request: full URL plus serialized JSON body.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub body: String,
}

/// Raw wire response before classification.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below HTTP status semantics: connect, timeout, TLS.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
}

/// The transport seam. Production uses [`HttpTransport`]; tests script
/// responses through their own implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: WireRequest) -> std::result::Result<WireResponse, TransportFailure>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> std::result::Result<Self, TransportFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportFailure {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: WireRequest) -> std::result::Result<WireResponse, TransportFailure> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let response = builder
            .header("Content-Type", "application/json")
            .body(request.body)
            .send()
            .await
            .map_err(|e| TransportFailure {
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportFailure {
            message: e.to_string(),
        })?;
        Ok(WireResponse { status, body })
    }
}

/// Retry and dispatch policy for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    /// Additional attempts after the first; 3 retries means 4 requests max.
    pub retries: u32,
    /// Seconds; delay before retry n is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
    /// Status codes that trigger a retry. 401 is always fatal regardless.
    pub retry_statuses: Vec<u16>,
    /// Fan-out limit for batch dispatch.
    pub batch_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retries: DEFAULT_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_retry_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retry_statuses = statuses;
        self
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }
}

/// Classified 2xx response. Callers read `status` where the registry
/// signals semantics through it (200 duplicate echo vs 201 created).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// Extract the `data` payload, consuming the envelope.
    pub fn into_data(self) -> Value {
        match self.body {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// One authenticated session against the registry. Cheap to share: the
/// key and policy are immutable and the transport pools connections.
pub struct Session {
    key: String,
    api: Url,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api", &self.api)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(key: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new().map_err(|failure| InterlexError::Transport {
            attempts: 0,
            source: Box::new(failure),
        })?;
        Self::with_transport(key, config, Arc::new(transport))
    }

    /// Build a session over an explicit transport (the test seam).
    pub fn with_transport(
        key: impl Into<String>,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ValidationError::NoApiKey.into());
        }
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api = Url::parse(&base).map_err(|_| ValidationError::BadBaseUrl {
            value: config.base_url.clone(),
        })?;
        Ok(Self {
            key,
            api,
            config,
            transport,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Validate the key against `user/info` and return the caller's user
    /// id. Run once at client construction.
    pub async fn validate_key(&self) -> Result<String> {
        let response = self.get("user/info", None).await?;
        let data = response.into_data();
        value_to_string(data.get("id")).ok_or_else(|| {
            InterlexError::UnexpectedResponse("user/info response missing id".to_string())
        })
    }

    pub async fn get(&self, endpoint: &str, params: Option<Value>) -> Result<ApiResponse> {
        self.request(Method::Get, endpoint, params).await
    }

    pub async fn post(&self, endpoint: &str, data: Option<Value>) -> Result<ApiResponse> {
        self.request(Method::Post, endpoint, data).await
    }

    /// Issue one request with key injection, retry/backoff, and response
    /// classification.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<Value>,
    ) -> Result<ApiResponse> {
        let url = self.endpoint_url(endpoint)?;
        let body = self.prepare_body(payload)?;
        let request = WireRequest { method, url, body };
        let max_attempts = self.config.retries + 1;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.transport.send(request.clone()).await {
                Ok(response) => {
                    if response.status == 401 {
                        return Err(InterlexError::Authentication);
                    }
                    if self.config.retry_statuses.contains(&response.status) {
                        if attempt >= max_attempts {
                            return Err(InterlexError::Transport {
                                attempts: attempt,
                                source: Box::new(TransportFailure {
                                    message: format!(
                                        "registry returned status {} (retry budget exhausted)",
                                        response.status
                                    ),
                                }),
                            });
                        }
                        let delay = self.backoff_delay(attempt);
                        debug!(
                            endpoint,
                            status = response.status,
                            attempt,
                            delay_s = delay.as_secs_f64(),
                            "retrying request"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return self.classify(endpoint, response);
                }
                Err(failure) => {
                    if attempt >= max_attempts {
                        return Err(InterlexError::Transport {
                            attempts: attempt,
                            source: Box::new(failure),
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        endpoint,
                        attempt,
                        delay_s = delay.as_secs_f64(),
                        error = %failure,
                        "transport failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Dispatch GETs concurrently, bounded by the batch limit. Results are
    /// positionally ordered; one failure never aborts siblings. Dropping
    /// the returned future stops issuing new requests.
    pub async fn get_batch(&self, requests: Vec<(String, Value)>) -> Vec<Result<ApiResponse>> {
        self.batch(Method::Get, requests).await
    }

    /// POST counterpart of [`Session::get_batch`].
    pub async fn post_batch(&self, requests: Vec<(String, Value)>) -> Vec<Result<ApiResponse>> {
        self.batch(Method::Post, requests).await
    }

    async fn batch(
        &self,
        method: Method,
        requests: Vec<(String, Value)>,
    ) -> Vec<Result<ApiResponse>> {
        let limit = self.config.batch_limit.max(1);
        stream::iter(requests.into_iter().map(|(endpoint, payload)| async move {
            self.request(method, &endpoint, Some(payload)).await
        }))
        .buffered(limit)
        .collect()
        .await
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<String> {
        let url = self.api.join(endpoint).map_err(|e| {
            InterlexError::UnexpectedResponse(format!("invalid endpoint {endpoint}: {e}"))
        })?;
        Ok(url.into())
    }

    /// Serialize the payload with the access key injected as a body field.
    fn prepare_body(&self, payload: Option<Value>) -> Result<String> {
        let mut body = payload.unwrap_or_else(|| json!({}));
        let object = body
            .as_object_mut()
            .ok_or(ValidationError::PayloadNotObject)?;
        object.insert("key".to_string(), Value::String(self.key.clone()));
        Ok(serde_json::to_string(&body)?)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        Duration::from_secs_f64(self.config.backoff_factor * f64::powi(2.0, exponent))
    }

    fn classify(&self, endpoint: &str, response: WireResponse) -> Result<ApiResponse> {
        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            InterlexError::UnexpectedResponse(format!("{endpoint}: body is not JSON: {e}"))
        })?;
        if let Some(message) = body.get("errormsg").and_then(Value::as_str) {
            if !message.trim().is_empty() {
                return Err(InterlexError::ServerRejected {
                    status: response.status,
                    message: message.to_string(),
                });
            }
        }
        if !(200..300).contains(&response.status) {
            let message: String = response.body.chars().take(200).collect();
            return Err(InterlexError::ServerRejected {
                status: response.status,
                message,
            });
        }
        Ok(ApiResponse {
            status: response.status,
            body,
        })
    }
}

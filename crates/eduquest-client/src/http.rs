//! HTTP transport
//!
//! This module owns the reqwest client and the request/response types that
//! flow between it and [`ApiClient`](crate::ApiClient). It knows nothing about
//! sessions: the bearer token is handed in per call.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::{ClientConfig, EnvelopeMode};
use crate::{ApiError, Result};

// =============================================================================
// Request Types
// =============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// PATCH request
    Patch,
    /// DELETE request
    Delete,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request relative to the configured base URL
///
/// # Examples
/// ```
/// use eduquest_client::{ApiRequest, HttpMethod};
/// use serde_json::json;
///
/// let request = ApiRequest::post("/cursos/")
///     .param("page", "2")
///     .json(json!({"nombre": "Álgebra"}));
///
/// assert_eq!(request.method, HttpMethod::Post);
/// assert_eq!(request.params, vec![("page".to_string(), "2".to_string())]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the base URL
    pub path: String,
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// Per-request headers
    pub headers: BTreeMap<String, String>,
    /// JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a request
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Create a POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add every entry of a query map, in key order
    pub fn params(mut self, params: &HashMap<String, String>) -> Self {
        let mut entries: Vec<_> = params.iter().collect();
        entries.sort();
        self.params
            .extend(entries.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a JSON body from any serializable value
    pub fn json_body<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_value(value)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not JSON-serializable: {}", e)))?;
        Ok(self.json(body))
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// A received response, body already decoded
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded body
    pub body: Value,
}

impl ApiResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the backend rejected the credentials
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Convert a non-2xx response into an error
    pub fn into_error(self) -> ApiError {
        ApiError::from_response(self.status, &self.body)
    }
}

/// Decode a response body
///
/// Empty bodies become `null`, non-JSON text becomes a JSON string.
pub fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Strip one optional `{data: ...}` envelope
pub fn unwrap_envelope(body: Value, mode: EnvelopeMode) -> Value {
    if mode == EnvelopeMode::Raw {
        return body;
    }
    match body {
        Value::Object(mut map) if map.get("data").is_some_and(|data| !data.is_null()) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// =============================================================================
// Transport
// =============================================================================

/// reqwest-backed transport bound to one base URL
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub(crate) fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (key, value) in &config.default_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ApiError::Configuration(format!("invalid header name {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::Configuration(format!("invalid value for {}: {}", key, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config: config.clone() })
    }

    /// Send one request, with the bearer token if one is given
    ///
    /// Only a missing response is an error here; every status code comes
    /// back as an [`ApiResponse`].
    pub(crate) async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse> {
        let url = self.config.endpoint(&request.path);

        let mut req = self.client.request(request.method.into(), &url);

        if !request.params.is_empty() {
            req = req.query(&request.params);
        }

        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| {
            tracing::warn!(method = %request.method, %url, error = %e, "request failed without response");
            ApiError::Connection(e.to_string())
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Connection(format!("failed to read response body: {}", e)))?;

        tracing::trace!(method = %request.method, %url, status, "response received");

        Ok(ApiResponse { status, body: decode_body(&text) })
    }
}

// =============================================================================
// Tests
// =============================================================================

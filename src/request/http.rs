//! HTTP client seam for the polling transport.
//!
//! [`RetryingRequest`](super::RetryingRequest) only needs "perform one
//! attempt"; which client performs it is an implementation detail behind
//! [`HttpClient`]. [`ReqwestHttpClient`] is the production implementation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

// ============================================================================
// Method
// ============================================================================

/// HTTP method used by the polling endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`.
    Get,
    /// `POST`.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

// ============================================================================
// HttpRequest / HttpResponse
// ============================================================================

/// One attempt's worth of request data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body; empty for none.
    pub body: String,
}

/// A completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body text.
    pub body: String,
    /// Response headers, lowercase names.
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Looks up a header by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == lower)
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// HttpClient
// ============================================================================

/// Performs a single HTTP attempt.
///
/// An `Err` is a network-level failure and is treated as status `0`.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Executes one request.
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

// ============================================================================
// ReqwestHttpClient
// ============================================================================

/// A [`reqwest`]-backed [`HttpClient`].
///
/// Timeouts are enforced by the retrying layer, not by the client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.inner.get(request.url.clone()),
            Method::Post => self.inner.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.to_string(), "POST");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut response = HttpResponse::new(200, "");
        response
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.header("x-missing"), None);
    }
}

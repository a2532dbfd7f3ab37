use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Value;
use thiserror::Error;

use crate::constants::USER_AGENT;

/// Error types that can occur when interacting with HTTP clients
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request error: {0}")]
    RequestError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Empty response from server")]
    EmptyResponse,
}

/// Status and body of an HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<Value, HttpClientError> {
        if self.body.trim().is_empty() {
            return Err(HttpClientError::EmptyResponse);
        }
        serde_json::from_str(&self.body).map_err(|e| {
            debug!("Response text: {}", self.body);
            HttpClientError::ParseError(e.to_string())
        })
    }
}

/// A trait for HTTP client implementations.
/// Non-2xx responses are returned as responses, not errors, so callers can
/// react to specific status codes.
#[async_trait]
pub trait HttpClient: Send + Sync + std::fmt::Debug {
    /// Send a GET request
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, HttpClientError>;

    /// Send a POST request with a form-encoded body
    async fn post_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpClientError>;
}

/// An HTTP client implementation using reqwest
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with the specified timeout
    pub fn new(timeout_secs: u64) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            }
        };
        Self { client }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse, HttpClientError> {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => Ok(HttpResponse { status, body }),
            Err(e) => {
                error!("Failed to read response body: {}", e);
                Err(HttpClientError::ParseError(format!("Failed to read response body: {}", e)))
            }
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, HttpClientError> {
        debug!("GET request to {}", url);

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            error!("GET request failed: {}", e);
            HttpClientError::RequestError(e.to_string())
        })?;

        Self::into_response(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpClientError> {
        debug!("POST request to {}", url);

        let mut request = self.client.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            error!("POST request failed: {}", e);
            HttpClientError::RequestError(e.to_string())
        })?;

        Self::into_response(response).await
    }
}

/// Create a new HTTP client using the default implementation
pub fn new_http_client(timeout_secs: u64) -> std::sync::Arc<dyn HttpClient> {
    std::sync::Arc::new(ReqwestHttpClient::new(timeout_secs))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_helpers() {
        assert!(HttpResponse::new(200, "{}").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
        assert!(HttpResponse::new(429, "").is_rate_limited());
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse::new(200, r#"{"lyrics": "la la"}"#);
        assert_eq!(response.json().unwrap()["lyrics"], "la la");

        assert!(matches!(HttpResponse::new(200, "  ").json(), Err(HttpClientError::EmptyResponse)));
        assert!(matches!(HttpResponse::new(200, "<html>").json(), Err(HttpClientError::ParseError(_))));
    }
}

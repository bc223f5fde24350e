//! Raw HTTP exchange with the cluster API.

use armada_perf_core::PerfConfig;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::auth::{Authenticator, Tokens};
use crate::error::ClientResult;
use crate::route::ApiCall;

/// Status, content type and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status, "application/json", value.to_string())
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/html", body.into())
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, "", Bytes::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type.contains("application/json")
    }
}

/// Sends API calls and (re)acquires credentials.
///
/// An `Err` from [`send`](Transport::send) means no HTTP response was
/// received at all; any status code, good or bad, is an `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: &ApiCall) -> ClientResult<RawResponse>;

    async fn authenticate(&self) -> ClientResult<()>;
}

/// reqwest-backed transport for a live cluster API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    authenticator: Authenticator,
    tokens: RwLock<Tokens>,
}

impl HttpTransport {
    /// Build the transport. Credentials are not fetched until
    /// [`authenticate`](Transport::authenticate) is called.
    pub fn new(config: &PerfConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api.base_url(),
            authenticator: Authenticator::from_config(config),
            tokens: RwLock::new(Tokens::default()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, call: &ApiCall) -> ClientResult<RawResponse> {
        let url = call.url(&self.base_url);
        let tokens = self.tokens.read().clone();

        let mut request = self
            .client
            .request(call.method(), &url)
            .header(AUTHORIZATION, tokens.iam_token)
            .header("X-Auth-Refresh-Token", tokens.refresh_token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = call.body() {
            tracing::debug!(url = %url, body = %body, "Request body");
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    async fn authenticate(&self) -> ClientResult<()> {
        let tokens = self.authenticator.fetch(&self.client).await?;
        *self.tokens.write() = tokens;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_helpers() {
        let ok = RawResponse::json(201, serde_json::json!({"id": "abc"}));
        assert!(ok.is_success());
        assert!(ok.is_json());

        let html = RawResponse::text(502, "<html>cloudflare</html>");
        assert!(!html.is_success());
        assert!(!html.is_json());
    }

    #[test]
    fn test_base_url_from_config() {
        let transport = HttpTransport::new(&PerfConfig::default()).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:6969/v1");
    }
}

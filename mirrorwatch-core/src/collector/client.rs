//! HTTP transport for the collector endpoint
//!
//! Reports are POSTed as `application/x-www-form-urlencoded` bodies. The
//! [`Transport`] trait is the seam the agent sends through; [`HttpTransport`]
//! is the `reqwest` implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::error::{Error, Result};

/// Future returned by [`Transport::post_form`], resolving to the HTTP status
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<u16>> + Send + 'static>>;

/// Sends an encoded form body to a collector URL
pub trait Transport: Send + Sync {
    fn post_form(&self, url: &str, body: String) -> TransportFuture;
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout` (zero disables the limit)
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("mirrorwatch/", env!("CARGO_PKG_VERSION")));
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }

        let http_client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

impl Transport for HttpTransport {
    fn post_form(&self, url: &str, body: String) -> TransportFuture {
        let request = self.http_client.post(url).body(body);

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;
            Ok(response.status().as_u16())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds() {
        assert!(HttpTransport::new(Duration::from_millis(1000)).is_ok());
        assert!(HttpTransport::new(Duration::ZERO).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        let err = transport
            .post_form("not a url", "a=b".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}

//! Forwarding of unmatched requests to a real upstream.

use super::response::{header_map, MockBody};
use crate::matcher::RequestParts;
use crate::mock::ProxyConfig;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::Response;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Bound on establishing the upstream connection; the exchange itself has no deadline
const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("proxy request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build proxied response: {0}")]
    Response(#[from] hyper::http::Error),
}

/// Sends one attempt per request to the configured upstream, without retries
#[derive(Clone)]
pub struct ProxyForwarder {
    client: reqwest::Client,
    /// Used when the upstream certificate must not be verified
    insecure_client: reqwest::Client,
}

impl ProxyForwarder {
    pub fn new() -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(PROXY_CONNECT_TIMEOUT)
            .build()
            .map_err(ProxyError::Client)?;
        let insecure_client = reqwest::Client::builder()
            .connect_timeout(PROXY_CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self {
            client,
            insecure_client,
        })
    }

    /// Target URL: upstream host plus the request's path and query
    pub fn target_url(config: &ProxyConfig, request: &RequestParts) -> String {
        format!(
            "{}{}{}",
            config.host.trim_end_matches('/'),
            request.path(),
            request.query().map(|q| format!("?{q}")).unwrap_or_default()
        )
    }

    pub async fn forward(
        &self,
        config: &ProxyConfig,
        request: &RequestParts,
    ) -> Result<Response<MockBody>, ProxyError> {
        let url = Self::target_url(config, request);
        let client = if config.insecure_skip_verify {
            &self.insecure_client
        } else {
            &self.client
        };

        let mut headers = request.headers.clone();
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        headers.extend(header_map(&config.request_headers));

        debug!("Proxying {} {} to {}", request.method, request.url(), url);
        let start = Instant::now();

        let upstream = client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|source| ProxyError::Request {
                url: url.clone(),
                source,
            })?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();

        debug!(
            "Upstream {} answered {} in {}ms",
            url,
            status,
            start.elapsed().as_millis()
        );

        // The body is re-framed by hyper, so upstream framing headers do not apply
        for hop in [TRANSFER_ENCODING, CONNECTION, CONTENT_LENGTH] {
            response_headers.remove(hop);
        }
        response_headers.remove("keep-alive");
        for (name, value) in header_map(&config.response_headers) {
            if let Some(name) = name {
                response_headers.append(name, value);
            }
        }

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(std::io::Error::other);
        let body = StreamBody::new(stream).boxed_unsync();

        let mut response = Response::builder().status(status).body(body)?;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hyper::{HeaderMap, Method};

    #[test]
    fn test_target_url() {
        let config = ProxyConfig {
            enabled: true,
            host: "https://api.example.com/".to_string(),
            ..Default::default()
        };
        let request = RequestParts::new(
            Method::GET,
            "/v1/users?page=2".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        );
        assert_eq!(
            ProxyForwarder::target_url(&config, &request),
            "https://api.example.com/v1/users?page=2"
        );
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_error() {
        let forwarder = ProxyForwarder::new().unwrap();
        let config = ProxyConfig {
            enabled: true,
            host: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let request = RequestParts::new(
            Method::GET,
            "/x".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        );
        let err = forwarder.forward(&config, &request).await.unwrap_err();
        assert!(matches!(err, ProxyError::Request { .. }));
    }
}

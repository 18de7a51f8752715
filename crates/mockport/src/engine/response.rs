//! HTTP response builders shared by the engine and the proxy.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::warn;

/// Body type of every response served by a mock
pub type MockBody = UnsyncBoxBody<Bytes, std::io::Error>;

pub fn full_body(body: impl Into<Bytes>) -> MockBody {
    Full::new(body.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// Build an HTTP response with the given status and body.
///
/// Falls back to a bare 500 in the unlikely case the builder fails.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<MockBody> {
    Response::builder()
        .status(status)
        .body(full_body(body))
        .unwrap_or_else(|_| internal_error())
}

/// Build an HTTP response with headers.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<MockBody> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(full_body(body))
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> Response<MockBody> {
    let mut response = Response::new(full_body("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Status code of a configured response, 500 if it is out of range
pub fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or_else(|_| {
        warn!("Invalid status code {}, responding with 500", status);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Convert configured headers, skipping (and logging) names or values HTTP rejects
pub fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!("Skipping invalid response header {}: {}", name, value),
        }
    }
    map
}

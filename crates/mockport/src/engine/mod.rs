//! MockEngine - request dispatch for one mock definition.
//!
//! For every request the engine reloads the definition from the store, walks the
//! routes in order and writes the first selected response. Requests no route
//! answers fall back to CORS preflight, the upstream proxy, or 404.

mod proxy;
mod response;
mod static_file;

pub use proxy::{ProxyError, ProxyForwarder};
pub use response::{
    build_response, build_response_with_headers, full_body, header_map, status_code, MockBody,
};
pub use static_file::{file_response, resolve_path, sniff_content_type};

use crate::matcher::{MatchContext, RequestParts, RouteMatcher};
use crate::mock::{MockDefinition, Response as MockResponse};
use crate::store::{Store, StoreError};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{
    HeaderName, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    ORIGIN,
};
use hyper::{Method, Request, Response, StatusCode};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const PAUSED_BODY: &str = "Mock server is paused";
pub const NOT_MATCHED_BODY: &str = "No route matched";

const CORS_DEFAULT_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Paused flag and last loaded definition, guarded together
#[derive(Default)]
struct EngineState {
    paused: bool,
    mock: Option<Arc<MockDefinition>>,
}

/// Serves requests for a single mock definition held in a [`Store`]
pub struct MockEngine {
    mock_id: String,
    store: Arc<dyn Store>,
    matcher: RouteMatcher,
    proxy: ProxyForwarder,
    state: Mutex<EngineState>,
}

impl MockEngine {
    pub fn new(mock_id: impl Into<String>, store: Arc<dyn Store>) -> Result<Self, EngineError> {
        Ok(Self {
            mock_id: mock_id.into(),
            matcher: RouteMatcher::new(Arc::clone(&store)),
            store,
            proxy: ProxyForwarder::new()?,
            state: Mutex::new(EngineState::default()),
        })
    }

    pub fn mock_id(&self) -> &str {
        &self.mock_id
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Fetch the current definition, caching it for the fallback path.
    ///
    /// Returns `None` when the store fails or no longer holds the mock.
    async fn reload(&self) -> Option<Arc<MockDefinition>> {
        match self.store.get_mock(&self.mock_id).await {
            Ok(Some(mock)) => {
                self.state.lock().mock = Some(Arc::clone(&mock));
                Some(mock)
            }
            Ok(None) => {
                warn!("Mock {} is no longer in the store", self.mock_id);
                None
            }
            Err(e) => {
                warn!("Failed to reload mock {}: {}", self.mock_id, e);
                None
            }
        }
    }

    fn cached(&self) -> Option<Arc<MockDefinition>> {
        self.state.lock().mock.clone()
    }

    async fn context(&self) -> MatchContext {
        let session_id = match self.store.get_active_session(&self.mock_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to read active session of mock {}: {}", self.mock_id, e);
                String::new()
            }
        };
        MatchContext::new(self.mock_id.clone(), session_id)
    }

    /// Run the routes of `mock` in order; errors skip the route
    async fn match_routes(
        &self,
        mock: &MockDefinition,
        request: &RequestParts,
    ) -> Option<MockResponse> {
        let context = self.context().await;
        for route in &mock.routes {
            match self.matcher.matches(route, request, &context).await {
                Ok(Some(response)) => {
                    debug!(
                        "Mock {}: {} {} -> route {} response {}",
                        self.mock_id, request.method, request.url(), route.id, response.id
                    );
                    return Some(response);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "Mock {}: skipping route {} {}: {}",
                        self.mock_id,
                        route.effective_method(),
                        route.path,
                        e
                    );
                }
            }
        }
        None
    }

    /// Reload the definition and select a response without writing anything
    pub async fn match_request(&self, request: &RequestParts) -> Option<MockResponse> {
        let mock = self.reload().await?;
        self.match_routes(&mock, request).await
    }

    /// Handle one HTTP request end to end
    pub async fn handle<B>(&self, request: Request<B>) -> Result<Response<MockBody>, Infallible>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        if self.is_paused() {
            debug!("Mock {} is paused, rejecting {}", self.mock_id, request.uri());
            return Ok(build_response(StatusCode::SERVICE_UNAVAILABLE, PAUSED_BODY));
        }

        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return Ok(build_response(
                    StatusCode::BAD_REQUEST,
                    "Failed to read request body",
                ));
            }
        };
        let request = RequestParts::new(parts.method, parts.uri, parts.headers, body);

        let fresh = self.reload().await;
        let selected = match &fresh {
            Some(mock) => self.match_routes(mock, &request).await,
            None => None,
        };
        let mock = fresh.or_else(|| self.cached());

        if let Some(selected) = selected {
            return Ok(self.write_response(mock.as_deref(), &selected).await);
        }
        Ok(self.fallback(mock.as_deref(), &request).await)
    }

    async fn write_response(
        &self,
        mock: Option<&MockDefinition>,
        response: &MockResponse,
    ) -> Response<MockBody> {
        let status = status_code(response.status);
        let headers = header_map(&response.headers);

        let delay = response.delay.duration();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !response.file_path.is_empty() {
            let path = resolve_path(
                &response.file_path,
                mock.and_then(|m| m.source_path.as_deref()),
            );
            return match file_response(status, headers, &path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!("Cannot serve file {}: {}", path.display(), e);
                    not_found()
                }
            };
        }

        let mut reply = build_response(status, Bytes::from(response.body.clone()));
        *reply.headers_mut() = headers;
        reply
    }

    async fn fallback(
        &self,
        mock: Option<&MockDefinition>,
        request: &RequestParts,
    ) -> Response<MockBody> {
        let Some(mock) = mock else {
            return not_found();
        };

        if request.method == Method::OPTIONS && mock.auto_cors {
            return cors_response(request);
        }

        if let Some(proxy) = mock.proxy.as_ref().filter(|p| p.enabled) {
            match self.proxy.forward(proxy, request).await {
                Ok(response) => return response,
                Err(e) => warn!("Mock {}: {}", self.mock_id, e),
            }
        }

        debug!(
            "Mock {}: no route matched {} {}",
            self.mock_id,
            request.method,
            request.url()
        );
        not_found()
    }
}

fn not_found() -> Response<MockBody> {
    build_response(StatusCode::NOT_FOUND, NOT_MATCHED_BODY)
}

/// Permissive preflight answer, echoing what the client asked for
fn cors_response(request: &RequestParts) -> Response<MockBody> {
    let echo = |name: HeaderName| {
        request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };

    build_response_with_headers(
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, echo(ORIGIN).unwrap_or("*")),
            (
                ACCESS_CONTROL_ALLOW_METHODS,
                echo(ACCESS_CONTROL_REQUEST_METHOD).unwrap_or(CORS_DEFAULT_METHODS),
            ),
            (
                ACCESS_CONTROL_ALLOW_HEADERS,
                echo(ACCESS_CONTROL_REQUEST_HEADERS).unwrap_or("*"),
            ),
        ],
        Bytes::new(),
    )
}

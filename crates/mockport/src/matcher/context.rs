use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri};

/// An incoming request with its body already collected.
///
/// The body is read once per request and shared by every rule that targets it.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestParts {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path plus query, as seen on the request line
    pub fn url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }
}

/// Mock and session scope a request is matched in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchContext {
    pub mock_id: String,
    pub session_id: String,
}

impl MatchContext {
    pub fn new(mock_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            mock_id: mock_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Key of the request counter for this request in this session
    pub fn count_key(&self, request: &RequestParts) -> String {
        format!("{}-count", self.scope(request))
    }

    /// Key of the sequential cursor for this request in this session
    pub fn sequence_key(&self, request: &RequestParts) -> String {
        format!("{}-sequence", self.scope(request))
    }

    fn scope(&self, request: &RequestParts) -> String {
        format!(
            "{}-{}-{}-{}",
            self.mock_id,
            request.method,
            request.url(),
            self.session_id
        )
    }
}

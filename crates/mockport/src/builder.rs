//! Fluent construction of mock definitions for in-process tests.
//!
//! ```no_run
//! # async fn run() -> Result<(), mockport::builder::BuildError> {
//! use mockport::builder::MockBuilder;
//! use mockport::mock::{Operator, Target};
//!
//! let server = MockBuilder::new()
//!     .get("/hello")
//!     .response(200, "hello")
//!     .when(Target::Header, "x-type", Operator::Equal, "x-men")
//!     .and(Target::Cookie, "name", Operator::Equal, "Jack")
//!     .start()
//!     .await?;
//! println!("{}/hello", server.url());
//! # Ok(())
//! # }
//! ```

use crate::mock::{
    Delay, MockDefinition, Operator, Response, ResponseMode, Route, Rule, RuleAggregation, Target,
    ValidationError,
};
use crate::server::{ServerError, ServerManager, ServerState};
use crate::store::{MemoryStore, Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Session every builder-started mock counts requests under
const SESSION_ID: &str = "session-id";

/// Errors raised while building or starting a mock
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0} called before any route was declared")]
    NoRoute(&'static str),

    #[error("{0} called before any response was declared")]
    NoResponse(&'static str),

    #[error("a response cannot combine and() and or() rules")]
    MixedAggregation,

    #[error("invalid mock definition: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Builds a [`MockDefinition`] route by route.
///
/// Responses attach to the last declared route and rules to the last declared
/// response. Misuse is remembered and reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct MockBuilder {
    mock: MockDefinition,
    route: Option<Route>,
    response: Option<Response>,
    /// Picked by the first `and` or `or` of the pending response
    aggregation: Option<RuleAggregation>,
    error: Option<BuildError>,
}

impl MockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on a fixed port instead of an OS-assigned one
    pub fn port(mut self, port: u16) -> Self {
        self.mock.port = (port != 0).then_some(port);
        self
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.route("GET", path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.route("POST", path)
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.route("PUT", path)
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.route("PATCH", path)
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.route("DELETE", path)
    }

    pub fn options(self, path: impl Into<String>) -> Self {
        self.route("OPTIONS", path)
    }

    /// Start a new route, closing the pending one
    pub fn route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.flush();
        self.route = Some(Route {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        });
        self
    }

    /// How the pending route picks among its matching responses
    pub fn mode(mut self, mode: ResponseMode) -> Self {
        match self.route.as_mut() {
            Some(route) => route.response_mode = mode,
            None => self.fail(BuildError::NoRoute("mode")),
        }
        self
    }

    /// Add a response to the pending route
    pub fn response(mut self, status: u16, body: impl Into<String>) -> Self {
        if self.route.is_none() {
            self.fail(BuildError::NoRoute("response"));
            return self;
        }
        self.flush_response();
        self.response = Some(Response {
            status,
            body: body.into(),
            ..Default::default()
        });
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        match self.response.as_mut() {
            Some(response) => {
                response.headers.insert(name.into(), value.into());
            }
            None => self.fail(BuildError::NoResponse("header")),
        }
        self
    }

    /// Delay the pending response by a random duration in `[min_ms, max_ms]`
    pub fn delay(mut self, min_ms: u64, max_ms: u64) -> Self {
        match self.response.as_mut() {
            Some(response) => {
                response.delay = Delay {
                    min: min_ms,
                    max: max_ms,
                }
            }
            None => self.fail(BuildError::NoResponse("delay")),
        }
        self
    }

    /// First rule of the pending response
    pub fn when(
        self,
        target: Target,
        modifier: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        self.rule("when", None, target, modifier.into(), operator, value.into())
    }

    /// Another rule that must hold too
    pub fn and(
        self,
        target: Target,
        modifier: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        let aggregation = Some(RuleAggregation::And);
        self.rule("and", aggregation, target, modifier.into(), operator, value.into())
    }

    /// Another rule, any one of which is enough
    pub fn or(
        self,
        target: Target,
        modifier: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        let aggregation = Some(RuleAggregation::Or);
        self.rule("or", aggregation, target, modifier.into(), operator, value.into())
    }

    fn rule(
        mut self,
        call: &'static str,
        aggregation: Option<RuleAggregation>,
        target: Target,
        modifier: String,
        operator: Operator,
        value: String,
    ) -> Self {
        let Some(response) = self.response.as_mut() else {
            self.fail(BuildError::NoResponse(call));
            return self;
        };

        if let Some(wanted) = aggregation {
            match self.aggregation {
                Some(current) if current != wanted => {
                    self.error.get_or_insert(BuildError::MixedAggregation);
                    return self;
                }
                _ => {
                    self.aggregation = Some(wanted);
                    response.rule_aggregation = wanted;
                }
            }
        }

        response.rules.push(Rule {
            id: String::new(),
            target,
            modifier,
            value,
            operator,
        });
        self
    }

    fn fail(&mut self, error: BuildError) {
        self.error.get_or_insert(error);
    }

    fn flush_response(&mut self) {
        if let (Some(response), Some(route)) = (self.response.take(), self.route.as_mut()) {
            route.responses.push(response);
        }
        self.aggregation = None;
    }

    fn flush(&mut self) {
        self.flush_response();
        if let Some(route) = self.route.take() {
            self.mock.routes.push(route);
        }
    }

    /// Close the pending route and return the validated definition with ids filled in
    pub fn build(mut self) -> Result<MockDefinition, BuildError> {
        self.flush();
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut mock = self.mock;
        mock.apply_defaults();
        let mock = mock.with_generated_ids();
        mock.validate()?;
        Ok(mock)
    }

    /// Build the definition and serve it from a fresh in-memory store
    pub async fn start(self) -> Result<MockServer, BuildError> {
        let mock = self.build()?;
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.set_active_session(&mock.id, SESSION_ID).await?;

        let manager = ServerManager::new(store);
        let state = manager.new_mock_server(mock).await?;
        debug!("Builder mock {} started on {}", state.mock_id, state.url);
        Ok(MockServer { manager, state })
    }
}

/// A running mock started by [`MockBuilder::start`].
///
/// The listener closes when this is dropped or [`stop`](Self::stop) is awaited.
pub struct MockServer {
    manager: ServerManager,
    state: ServerState,
}

impl MockServer {
    /// Base URL, `http://127.0.0.1:<port>`
    pub fn url(&self) -> &str {
        &self.state.url
    }

    pub fn mock_id(&self) -> &str {
        &self.state.mock_id
    }

    pub fn manager(&self) -> &ServerManager {
        &self.manager
    }

    /// Stop serving and wait until the port is released
    pub async fn stop(self) -> Result<ServerState, ServerError> {
        self.manager.stop_mock_server(&self.state.mock_id).await
    }
}

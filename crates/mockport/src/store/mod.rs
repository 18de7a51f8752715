//! Storage contract for mock definitions and per-session counters.
//!
//! The engine never touches counters directly; route matching goes through
//! [`Store::increment`] and [`Store::next_cursor`], which implementations must make
//! atomic with respect to concurrent handlers of the same mock.

mod memory;

pub use memory::MemoryStore;

use crate::mock::MockDefinition;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by a [`Store`] backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("value under key {key} is not an integer: {value}")]
    NotAnInteger { key: String, value: String },

    #[error("mock {0} not found")]
    MockNotFound(String),

    #[error("route {route_id} not found in mock {mock_id}")]
    RouteNotFound { mock_id: String, route_id: String },

    #[error("response {response_id} not found in route {route_id}")]
    ResponseNotFound {
        route_id: String,
        response_id: String,
    },

    #[error("route {route_id} already exists in mock {mock_id}")]
    RouteExists { mock_id: String, route_id: String },

    #[error("mock definition has no id")]
    MissingId,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Backend-agnostic persistence for mock definitions and counters.
///
/// Keys passed to the generic counter operations are already scoped by session,
/// method and URL (see `MatchContext`), so backends treat them as opaque strings.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a mock definition, `None` if it was never stored
    async fn get_mock(&self, mock_id: &str) -> Result<Option<Arc<MockDefinition>>, StoreError>;

    /// Insert or replace a mock definition
    async fn set_mock(&self, mock: MockDefinition) -> Result<(), StoreError>;

    async fn get_mocks(&self) -> Result<Vec<Arc<MockDefinition>>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Read a counter; missing or non-numeric values read as 0
    async fn get_int(&self, key: &str) -> Result<i64, StoreError>;

    /// Increment a counter and return the new value
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Return the current cursor for a list of `len` items and advance it,
    /// wrapping to 0 after the last index. An out-of-range cursor reads as 0.
    async fn next_cursor(&self, key: &str, len: usize) -> Result<usize, StoreError>;

    /// Session currently used to key counters of a mock, empty if none was set
    async fn get_active_session(&self, mock_id: &str) -> Result<String, StoreError>;

    async fn set_active_session(&self, mock_id: &str, session_id: &str) -> Result<(), StoreError>;
}

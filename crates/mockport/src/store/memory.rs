use super::{Store, StoreError};
use crate::mock::{MockDefinition, Response, ResponsePatch, Route, RoutePatch};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    mocks: HashMap<String, Arc<MockDefinition>>,
    /// Counters are kept as strings so `get`/`set` and `increment` share one keyspace
    values: HashMap<String, String>,
}

/// In-memory implementation of [`Store`]
///
/// A single lock covers definitions and counters, which makes `increment` and
/// `next_cursor` atomic read-modify-write operations. Definitions are stored behind
/// `Arc` and replaced copy-on-write, so readers never observe a half-applied edit.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_key(mock_id: &str) -> String {
        format!("{mock_id}-active-session")
    }

    /// Clone the stored definition, apply `edit` and store the result
    fn update_mock<T>(
        &self,
        mock_id: &str,
        edit: impl FnOnce(&mut MockDefinition) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.lock();
        let current = inner
            .mocks
            .get(mock_id)
            .ok_or_else(|| StoreError::MockNotFound(mock_id.to_string()))?;

        let mut updated = MockDefinition::clone(current);
        let result = edit(&mut updated)?;
        inner.mocks.insert(mock_id.to_string(), Arc::new(updated));
        Ok(result)
    }

    /// Append a route to a stored mock, assigning missing IDs
    pub fn create_route(&self, mock_id: &str, mut route: Route) -> Result<Route, StoreError> {
        if route.id.is_empty() {
            route.id = Uuid::new_v4().to_string();
        }
        for response in &mut route.responses {
            if response.id.is_empty() {
                response.id = Uuid::new_v4().to_string();
            }
        }

        self.update_mock(mock_id, |mock| {
            if mock.route(&route.id).is_some() {
                return Err(StoreError::RouteExists {
                    mock_id: mock_id.to_string(),
                    route_id: route.id.clone(),
                });
            }
            mock.routes.push(route.clone());
            Ok(route)
        })
    }

    pub fn patch_route(
        &self,
        mock_id: &str,
        route_id: &str,
        patch: RoutePatch,
    ) -> Result<Route, StoreError> {
        self.update_mock(mock_id, |mock| {
            let route = find_route(mock, mock_id, route_id)?;
            patch.apply(route);
            Ok(route.clone())
        })
    }

    pub fn delete_route(&self, mock_id: &str, route_id: &str) -> Result<Route, StoreError> {
        self.update_mock(mock_id, |mock| {
            let index = mock
                .routes
                .iter()
                .position(|r| r.id == route_id)
                .ok_or_else(|| StoreError::RouteNotFound {
                    mock_id: mock_id.to_string(),
                    route_id: route_id.to_string(),
                })?;
            Ok(mock.routes.remove(index))
        })
    }

    pub fn patch_response(
        &self,
        mock_id: &str,
        route_id: &str,
        response_id: &str,
        patch: ResponsePatch,
    ) -> Result<Response, StoreError> {
        self.update_mock(mock_id, |mock| {
            let route = find_route(mock, mock_id, route_id)?;
            let response = route
                .responses
                .iter_mut()
                .find(|r| r.id == response_id)
                .ok_or_else(|| StoreError::ResponseNotFound {
                    route_id: route_id.to_string(),
                    response_id: response_id.to_string(),
                })?;
            patch.apply(response);
            Ok(response.clone())
        })
    }
}

fn find_route<'a>(
    mock: &'a mut MockDefinition,
    mock_id: &str,
    route_id: &str,
) -> Result<&'a mut Route, StoreError> {
    mock.routes
        .iter_mut()
        .find(|r| r.id == route_id)
        .ok_or_else(|| StoreError::RouteNotFound {
            mock_id: mock_id.to_string(),
            route_id: route_id.to_string(),
        })
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_mock(&self, mock_id: &str) -> Result<Option<Arc<MockDefinition>>, StoreError> {
        Ok(self.inner.lock().mocks.get(mock_id).cloned())
    }

    async fn set_mock(&self, mock: MockDefinition) -> Result<(), StoreError> {
        if mock.id.is_empty() {
            return Err(StoreError::MissingId);
        }
        self.inner
            .lock()
            .mocks
            .insert(mock.id.clone(), Arc::new(mock));
        Ok(())
    }

    async fn get_mocks(&self) -> Result<Vec<Arc<MockDefinition>>, StoreError> {
        Ok(self.inner.lock().mocks.values().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.inner.lock().values.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_int(&self, key: &str) -> Result<i64, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .values
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        let current = match inner.values.get(key) {
            Some(value) => value.parse::<i64>().map_err(|_| StoreError::NotAnInteger {
                key: key.to_string(),
                value: value.clone(),
            })?,
            None => 0,
        };
        let next = current + 1;
        inner.values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn next_cursor(&self, key: &str, len: usize) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let cursor = inner
            .values
            .get(key)
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|c| *c < len)
            .unwrap_or(0);
        let next = if cursor + 1 >= len { 0 } else { cursor + 1 };
        inner.values.insert(key.to_string(), next.to_string());
        Ok(cursor)
    }

    async fn get_active_session(&self, mock_id: &str) -> Result<String, StoreError> {
        let key = Self::session_key(mock_id);
        Ok(self
            .inner
            .lock()
            .values
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_active_session(&self, mock_id: &str, session_id: &str) -> Result<(), StoreError> {
        let key = Self::session_key(mock_id);
        self.inner.lock().values.insert(key, session_id.to_string());
        Ok(())
    }
}

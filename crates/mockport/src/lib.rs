//! Mockport - programmable HTTP stub server.
//!
//! Mock definitions describe routes, conditional responses and an optional upstream
//! proxy. Each definition is served on its own listener by a [`MockEngine`], and a
//! [`ServerManager`] starts, stops, pauses and resumes those listeners. Tests can
//! declare and serve a mock in one expression with [`MockBuilder`].

pub mod builder;
pub mod engine;
pub mod matcher;
pub mod mock;
pub mod server;
pub mod store;

pub use builder::{BuildError, MockBuilder, MockServer};
pub use engine::{EngineError, MockEngine};
pub use matcher::{MatchContext, MatchError, RequestParts, RouteMatcher};
pub use mock::{LoadError, MockDefinition, ValidationError};
pub use server::{ServerError, ServerManager, ServerState, ServerStatus};
pub use store::{MemoryStore, Store, StoreError};

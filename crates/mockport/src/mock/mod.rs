//! Mock definitions: routes, responses, rules and their loading.

mod delay;
mod loader;
mod patch;
mod types;

pub use delay::{Delay, DelayError, MAX_DELAY_MS};
pub use loader::{LoadError, ValidationError};
pub use patch::{ResponsePatch, RoutePatch};
pub use types::{
    MockDefinition, Operator, ProxyConfig, Response, ResponseMode, Route, Rule, RuleAggregation,
    Target, TlsConfig,
};

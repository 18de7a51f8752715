//! Request matching: routes, rule evaluation and response selection.
//!
//! Matching runs in three layers:
//! - [`RouteMatcher`] checks method and path, then bumps the request counter
//! - [`ResponseSelector`] keeps the responses whose rules hold
//! - [`RuleEvaluator`] extracts one target value and compares it

mod context;
mod route;
mod rule;
mod selector;
pub mod targets;

pub use context::{MatchContext, RequestParts};
pub use route::{path_matches, template_to_globs, RouteMatcher};
pub use rule::RuleEvaluator;
pub use selector::ResponseSelector;

use crate::store::StoreError;
use thiserror::Error;

/// Errors that make a route be skipped during matching
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot evaluate body query '{query}': {reason}")]
    BodyQuery { query: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

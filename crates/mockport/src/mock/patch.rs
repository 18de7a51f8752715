//! Allow-listed partial updates for routes and responses.
//!
//! Each patch carries one `Option` per field that may change. Unknown fields are
//! rejected at deserialization, so a patch can never touch identifiers or nested
//! collections it does not name.

use super::delay::Delay;
use super::types::{Response, ResponseMode, Route, Rule, RuleAggregation};
use serde::Deserialize;
use std::collections::HashMap;

/// Partial update of a [`Route`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutePatch {
    pub method: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
    pub response_mode: Option<ResponseMode>,
    pub disabled: Option<bool>,
}

impl RoutePatch {
    pub fn apply(self, route: &mut Route) {
        if let Some(method) = self.method {
            route.method = method;
        }
        if let Some(path) = self.path {
            route.path = path;
        }
        if let Some(description) = self.description {
            route.description = description;
        }
        if let Some(mode) = self.response_mode {
            route.response_mode = mode;
        }
        if let Some(disabled) = self.disabled {
            route.disabled = disabled;
        }
    }
}

/// Partial update of a [`Response`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponsePatch {
    pub status: Option<u16>,
    pub delay: Option<Delay>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub file_path: Option<String>,
    pub rule_aggregation: Option<RuleAggregation>,
    pub rules: Option<Vec<Rule>>,
    pub is_default: Option<bool>,
}

impl ResponsePatch {
    pub fn apply(self, response: &mut Response) {
        if let Some(status) = self.status {
            response.status = status;
        }
        if let Some(delay) = self.delay {
            response.delay = delay;
        }
        if let Some(headers) = self.headers {
            response.headers = headers;
        }
        if let Some(body) = self.body {
            response.body = body;
        }
        if let Some(file_path) = self.file_path {
            response.file_path = file_path;
        }
        if let Some(aggregation) = self.rule_aggregation {
            response.rule_aggregation = aggregation;
        }
        if let Some(rules) = self.rules {
            response.rules = rules;
        }
        if let Some(is_default) = self.is_default {
            response.is_default = is_default;
        }
    }
}

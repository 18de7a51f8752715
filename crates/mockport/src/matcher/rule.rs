use super::context::{MatchContext, RequestParts};
use super::targets;
use super::MatchError;
use crate::mock::{Operator, Route, Rule, Target};
use crate::store::Store;
use hyper::header::CONTENT_TYPE;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Evaluates single rules against one request on one route
pub struct RuleEvaluator<'a> {
    pub(crate) route: &'a Route,
    pub(crate) request: &'a RequestParts,
    pub(crate) context: &'a MatchContext,
    pub(crate) store: &'a dyn Store,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(
        route: &'a Route,
        request: &'a RequestParts,
        context: &'a MatchContext,
        store: &'a dyn Store,
    ) -> Self {
        Self {
            route,
            request,
            context,
            store,
        }
    }

    /// Extract the value a rule compares against
    pub async fn target_value(&self, rule: &Rule) -> Result<String, MatchError> {
        let value = match rule.target {
            Target::Header => targets::header_value(&self.request.headers, &rule.modifier),
            Target::Cookie => targets::cookie_value(&self.request.headers, &rule.modifier),
            Target::QueryString => targets::query_value(self.request.query(), &rule.modifier),
            Target::RouteParam => {
                targets::route_param(&self.route.path, self.request.path(), &rule.modifier)
            }
            Target::Body => targets::body_value(&self.request.body, &rule.modifier)?,
            Target::RequestNumber => {
                let key = self.context.count_key(self.request);
                self.store.get_int(&key).await?.to_string()
            }
            Target::Unknown => String::new(),
        };
        Ok(value)
    }

    pub async fn evaluate(&self, rule: &Rule) -> Result<bool, MatchError> {
        let actual = self.target_value(rule).await?;

        let matched = match rule.operator {
            Operator::Equal => {
                if rule.target == Target::Body && self.is_json_request() {
                    json_equal(&actual, &rule.value)
                } else {
                    actual == rule.value
                }
            }
            Operator::Regex => {
                let re = Regex::new(&rule.value).map_err(|source| MatchError::Regex {
                    pattern: rule.value.clone(),
                    source,
                })?;
                re.is_match(&actual)
            }
            Operator::Unknown => false,
        };

        debug!(
            "Rule {:?}({}) {:?} '{}' -> {}",
            rule.target, rule.modifier, rule.operator, rule.value, matched
        );
        Ok(matched)
    }

    fn is_json_request(&self) -> bool {
        self.request
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
    }
}

/// Structural JSON equality; either side failing to parse is a non-match
fn json_equal(actual: &str, expected: &str) -> bool {
    match (
        serde_json::from_str::<Value>(actual),
        serde_json::from_str::<Value>(expected),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

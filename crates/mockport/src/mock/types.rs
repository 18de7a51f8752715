//! Type definitions for mock definitions.
//!
//! A [`MockDefinition`] is the full configuration of one simulated API: its routes,
//! the candidate responses of each route, the rules gating each response, plus the
//! optional proxy and TLS blocks.

use super::delay::Delay;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// Mock Definition
// ============================================================================

/// Full configuration for one simulated API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Listening port. Absent, empty or zero means an OS-assigned port.
    #[serde(
        default,
        deserialize_with = "deserialize_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<u16>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// All OPTIONS requests without a matching route are answered with 200
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_cors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// File this definition was loaded from, used to resolve relative static files
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl MockDefinition {
    pub fn proxy_enabled(&self) -> bool {
        self.proxy.as_ref().is_some_and(|p| p.enabled)
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.as_ref().is_some_and(|t| t.enabled)
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == route_id)
    }
}

/// Deserialize a port from a number, a numeric string or an empty string
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(|p| (p != 0).then_some(p))
            .ok_or_else(|| D::Error::custom(format!("invalid port number: {n}"))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u16>()
            .map(|p| (p != 0).then_some(p))
            .map_err(|_| D::Error::custom(format!("invalid port string: {s}"))),
        Some(_) => Err(D::Error::custom("port must be a number or string")),
    }
}

// ============================================================================
// Route Types
// ============================================================================

/// Policy for picking among multiple rule-matched responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    #[serde(alias = "")]
    Default,
    Sequential,
    Random,
}

impl ResponseMode {
    fn is_default(&self) -> bool {
        *self == ResponseMode::Default
    }
}

/// One method + path pattern with its candidate responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// HTTP method, empty means GET
    #[serde(default)]
    pub method: String,
    /// Path template, may contain `:name` segments and a trailing `*`
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "ResponseMode::is_default")]
    pub response_mode: ResponseMode,
    #[serde(default)]
    pub responses: Vec<Response>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl Route {
    /// Method to match against, defaulting to GET
    pub fn effective_method(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Combination policy across the rules of one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAggregation {
    #[default]
    #[serde(alias = "")]
    And,
    Or,
}

impl RuleAggregation {
    fn is_and(&self) -> bool {
        *self == RuleAggregation::And
    }
}

/// One possible reply of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Delay::is_zero")]
    pub delay: Delay,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Static file served instead of `body`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
    #[serde(default, skip_serializing_if = "RuleAggregation::is_and")]
    pub rule_aggregation: RuleAggregation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_default: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            id: String::new(),
            status: default_status(),
            delay: Delay::default(),
            headers: HashMap::new(),
            body: String::new(),
            file_path: String::new(),
            rule_aggregation: RuleAggregation::And,
            rules: Vec::new(),
            is_default: false,
        }
    }
}

pub(crate) fn default_status() -> u16 {
    200
}

// ============================================================================
// Rule Types
// ============================================================================

/// Part of the request a rule reads its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Header,
    Cookie,
    QueryString,
    Body,
    RouteParam,
    RequestNumber,
    #[serde(other)]
    Unknown,
}

/// Comparison applied between the target value and the expected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Equal,
    Regex,
    #[serde(other)]
    Unknown,
}

/// A single predicate over a named target of the incoming request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub target: Target,
    /// Field name, JSON path, or nothing depending on the target
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub modifier: String,
    #[serde(default)]
    pub value: String,
    pub operator: Operator,
}

// ============================================================================
// Proxy & TLS
// ============================================================================

/// Upstream used for requests no route matched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub request_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub response_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_verify: bool,
}

/// TLS listener configuration. Without both paths a default self-signed pair is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_cert_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_key_path: Option<String>,
}

impl TlsConfig {
    /// Explicit certificate and key paths, when both are set
    pub fn pem_paths(&self) -> Option<(&str, &str)> {
        let cert = self.pem_cert_path.as_deref().filter(|p| !p.is_empty())?;
        let key = self.pem_key_path.as_deref().filter(|p| !p.is_empty())?;
        Some((cert, key))
    }
}

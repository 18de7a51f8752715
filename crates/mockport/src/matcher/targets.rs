//! Extraction of rule target values from a request.
//!
//! Every extractor returns an empty string when the value is absent, so rules
//! comparing against a missing field simply fail to match.

use super::MatchError;
use hyper::header::COOKIE;
use hyper::HeaderMap;
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

/// Header value by case-insensitive name
pub fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Cookie value by name, searching every `Cookie` header
pub fn cookie_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .unwrap_or_default()
}

/// First query parameter value by name, percent-decoded
pub fn query_value(query: Option<&str>, name: &str) -> String {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| decode_component(key) == name)
        .map(|(_, value)| decode_component(value))
        .unwrap_or_default()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Request path segment at the position of `:name` in the route template.
///
/// Templates and paths with a different number of segments yield nothing.
pub fn route_param(template: &str, path: &str, name: &str) -> String {
    let template_segments: Vec<&str> = template.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if template_segments.len() != path_segments.len() {
        return String::new();
    }

    template_segments
        .iter()
        .zip(path_segments)
        .find(|(segment, _)| segment.strip_prefix(':') == Some(name))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// Value of the body, or of a JSON path into it.
///
/// An empty modifier returns the raw body text. A body that is not JSON cannot be
/// queried and is an error; a path that does not parse yields an empty string.
pub fn body_value(body: &[u8], modifier: &str) -> Result<String, MatchError> {
    if body.is_empty() {
        return Ok(String::new());
    }
    if modifier.is_empty() {
        return Ok(String::from_utf8_lossy(body).into_owned());
    }

    let json: Value = serde_json::from_slice(body).map_err(|e| MatchError::BodyQuery {
        query: modifier.to_string(),
        reason: e.to_string(),
    })?;

    let expression = normalize_json_path(modifier);
    let path = match JsonPath::parse(&expression) {
        Ok(path) => path,
        Err(e) => {
            debug!("Ignoring unparseable body path '{}': {}", modifier, e);
            return Ok(String::new());
        }
    };

    Ok(path
        .query(&json)
        .first()
        .map(render_json)
        .unwrap_or_default())
}

/// Accept jq-style `.a.b` and bare `a.b` in addition to `$.a.b`
fn normalize_json_path(modifier: &str) -> String {
    let trimmed = modifier.trim();
    if trimmed.starts_with('$') {
        trimmed.to_string()
    } else if trimmed == "." {
        "$".to_string()
    } else if trimmed.starts_with('.') || trimmed.starts_with('[') {
        format!("${trimmed}")
    } else {
        format!("$.{trimmed}")
    }
}

fn render_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

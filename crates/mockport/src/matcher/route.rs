use super::context::{MatchContext, RequestParts};
use super::rule::RuleEvaluator;
use super::selector::ResponseSelector;
use super::MatchError;
use crate::mock::{Response, Route};
use crate::store::Store;
use globset::{GlobBuilder, GlobSetBuilder};
use std::sync::Arc;
use tracing::{debug, warn};

/// Matches requests against routes and selects the response to send
pub struct RouteMatcher {
    store: Arc<dyn Store>,
}

impl RouteMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Match one route against a request.
    ///
    /// Returns `Ok(None)` when method, path or rules do not match. The request counter
    /// is incremented as soon as method and path match, before any rule runs.
    pub async fn matches(
        &self,
        route: &Route,
        request: &RequestParts,
        context: &MatchContext,
    ) -> Result<Option<Response>, MatchError> {
        if route.disabled {
            return Ok(None);
        }
        if !route
            .effective_method()
            .eq_ignore_ascii_case(request.method.as_str())
        {
            return Ok(None);
        }
        if !path_matches(&route.path, request.path()) {
            return Ok(None);
        }

        let count = self.store.increment(&context.count_key(request)).await?;
        debug!(
            "Route {} {} matched request #{} for {}",
            route.effective_method(),
            route.path,
            count,
            request.url()
        );

        let selector = ResponseSelector::new(RuleEvaluator::new(
            route,
            request,
            context,
            self.store.as_ref(),
        ));
        let candidates = selector.filter(&route.responses).await?;
        let picked = selector.pick(route.response_mode, &candidates).await?;
        Ok(picked.cloned())
    }
}

/// Convert a route template into glob patterns.
///
/// `:name` segments become a single-segment `*`. Literal text is escaped except for
/// `*` and `?`, which keep their wildcard meaning. A trailing `*` covers the rest of
/// the path, so a template that ends in `*` outside a `/*` segment yields a second
/// pattern for the deeper paths.
pub fn template_to_globs(template: &str) -> Vec<String> {
    let glob = template
        .split('/')
        .map(|segment| {
            if segment.starts_with(':') {
                "*".to_string()
            } else {
                escape_literal(segment)
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    if !template.ends_with('*') || glob.ends_with("**") {
        return vec![glob];
    }
    match glob.strip_suffix("/*") {
        Some(prefix) => vec![format!("{prefix}/**")],
        None => {
            let deeper = format!("{glob}/**");
            vec![glob, deeper]
        }
    }
}

/// Escape glob metacharacters other than `*` and `?` as single-character classes
fn escape_literal(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '[' | ']' | '{' | '}' | '\\' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Segment-aware glob match of a request path against a route template
pub fn path_matches(template: &str, path: &str) -> bool {
    let mut builder = GlobSetBuilder::new();
    for pattern in template_to_globs(template) {
        match GlobBuilder::new(&pattern)
            .literal_separator(true)
            .backslash_escape(false)
            .build()
        {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                warn!("Invalid route path '{}': {}", template, e);
                return false;
            }
        }
    }

    match builder.build() {
        Ok(set) => set.is_match(path),
        Err(e) => {
            warn!("Invalid route path '{}': {}", template, e);
            false
        }
    }
}

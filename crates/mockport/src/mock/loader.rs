//! Loading and validating mock definitions from YAML or JSON.

use super::delay::DelayError;
use super::types::{default_status, MockDefinition};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors raised while reading a definition file
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse mock definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid mock definition: {0}")]
    Invalid(#[from] ValidationError),
}

/// Structural problems in a parsed definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("mock has no routes")]
    NoRoutes,

    #[error("route #{index} has no path")]
    MissingPath { index: usize },

    #[error("route {path} has no responses")]
    NoResponses { path: String },

    #[error("response #{index} of route {path}: {source}")]
    InvalidDelay {
        path: String,
        index: usize,
        #[source]
        source: DelayError,
    },

    #[error("response #{index} of route {path} sets both body and file_path")]
    BodyAndFile { path: String, index: usize },

    #[error("rule #{rule} of response #{index} on route {path} has no value")]
    MissingRuleValue {
        path: String,
        index: usize,
        rule: usize,
    },

    #[error("proxy is enabled but has no host")]
    MissingProxyHost,
}

impl MockDefinition {
    /// Parse a definition from YAML text. JSON parses too since it is a YAML subset.
    pub fn from_yaml(text: &str) -> Result<Self, LoadError> {
        let mut mock: MockDefinition = serde_yaml::from_str(text)?;
        mock.apply_defaults();
        Ok(mock)
    }

    /// Read, parse and validate a definition file, remembering where it came from
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut mock = Self::from_yaml(&text)?.with_generated_ids();
        mock.validate()?;
        mock.source_path = Some(path.to_path_buf());

        debug!(
            "Loaded mock {} with {} routes from {}",
            mock.id,
            mock.routes.len(),
            path.display()
        );
        Ok(mock)
    }

    /// Fill in the implicit method and status values
    pub fn apply_defaults(&mut self) {
        for route in &mut self.routes {
            if route.method.is_empty() {
                route.method = "GET".to_string();
            }
            for response in &mut route.responses {
                if response.status == 0 {
                    response.status = default_status();
                }
            }
        }
    }

    /// Assign a fresh UUID to every mock, route, response and rule without one
    pub fn with_generated_ids(mut self) -> Self {
        fn fill(id: &mut String) {
            if id.is_empty() {
                *id = Uuid::new_v4().to_string();
            }
        }

        fill(&mut self.id);
        for route in &mut self.routes {
            fill(&mut route.id);
            for response in &mut route.responses {
                fill(&mut response.id);
                for rule in &mut response.rules {
                    fill(&mut rule.id);
                }
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.routes.is_empty() {
            return Err(ValidationError::NoRoutes);
        }

        for (route_index, route) in self.routes.iter().enumerate() {
            if route.path.is_empty() {
                return Err(ValidationError::MissingPath { index: route_index });
            }
            if route.responses.is_empty() {
                return Err(ValidationError::NoResponses {
                    path: route.path.clone(),
                });
            }

            for (index, response) in route.responses.iter().enumerate() {
                response
                    .delay
                    .validate()
                    .map_err(|source| ValidationError::InvalidDelay {
                        path: route.path.clone(),
                        index,
                        source,
                    })?;

                if !response.body.is_empty() && !response.file_path.is_empty() {
                    return Err(ValidationError::BodyAndFile {
                        path: route.path.clone(),
                        index,
                    });
                }

                if let Some(rule) = response.rules.iter().position(|r| r.value.is_empty()) {
                    return Err(ValidationError::MissingRuleValue {
                        path: route.path.clone(),
                        index,
                        rule,
                    });
                }
            }
        }

        if let Some(proxy) = &self.proxy {
            if proxy.enabled && proxy.host.trim().is_empty() {
                return Err(ValidationError::MissingProxyHost);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Delay, Operator, ResponseMode, RuleAggregation, Target};
    use std::io::Write;

    const SAMPLE: &str = r#"
name: users api
port: "4010"
routes:
  - path: /users/:id
    response_mode: sequential
    responses:
      - status: 0
        body: first
        delay: 20
      - body: second
        rule_aggregation: or
        rules:
          - target: header
            modifier: X-Tenant
            value: acme
            operator: equal
          - target: cookie_jar
            value: x
            operator: like
  - method: POST
    path: /orders
    responses:
      - status: 201
        delay:
          min: 10
          max: 40
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let mock = MockDefinition::from_yaml(SAMPLE).unwrap();
        assert_eq!(mock.name, "users api");
        assert_eq!(mock.port, Some(4010));

        let users = &mock.routes[0];
        assert_eq!(users.method, "GET");
        assert_eq!(users.response_mode, ResponseMode::Sequential);
        assert_eq!(users.responses[0].status, 200);
        assert_eq!(users.responses[0].delay, Delay::fixed(20));
        assert_eq!(users.responses[1].status, 200);
        assert_eq!(users.responses[1].rule_aggregation, RuleAggregation::Or);

        let rules = &users.responses[1].rules;
        assert_eq!(rules[0].target, Target::Header);
        assert_eq!(rules[0].operator, Operator::Equal);
        assert_eq!(rules[1].target, Target::Unknown);
        assert_eq!(rules[1].operator, Operator::Unknown);

        let orders = &mock.routes[1];
        assert_eq!(orders.method, "POST");
        assert_eq!(orders.responses[0].status, 201);
        assert_eq!(orders.responses[0].delay, Delay { min: 10, max: 40 });
    }

    #[test]
    fn test_port_variants() {
        let empty = MockDefinition::from_yaml("port: ''\nroutes: []").unwrap();
        assert_eq!(empty.port, None);

        let numeric = MockDefinition::from_yaml(r#"{"port": 8081, "routes": []}"#).unwrap();
        assert_eq!(numeric.port, Some(8081));

        let zero = MockDefinition::from_yaml("port: 0").unwrap();
        assert_eq!(zero.port, None);

        assert!(MockDefinition::from_yaml("port: not-a-port").is_err());
        assert!(MockDefinition::from_yaml("port: 70000").is_err());
    }

    #[test]
    fn test_generated_ids_fill_only_empty() {
        let yaml = r#"
id: fixed
routes:
  - path: /a
    responses:
      - rules:
          - target: query_string
            modifier: q
            value: x
            operator: equal
"#;
        let mock = MockDefinition::from_yaml(yaml).unwrap().with_generated_ids();
        assert_eq!(mock.id, "fixed");

        let route = &mock.routes[0];
        assert!(Uuid::parse_str(&route.id).is_ok());
        assert!(Uuid::parse_str(&route.responses[0].id).is_ok());
        assert!(Uuid::parse_str(&route.responses[0].rules[0].id).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_definitions() {
        let no_routes = MockDefinition::from_yaml("name: x").unwrap();
        assert_eq!(no_routes.validate(), Err(ValidationError::NoRoutes));

        let no_path = MockDefinition::from_yaml("routes:\n  - responses:\n      - body: x").unwrap();
        assert_eq!(
            no_path.validate(),
            Err(ValidationError::MissingPath { index: 0 })
        );

        let no_responses = MockDefinition::from_yaml("routes:\n  - path: /x").unwrap();
        assert!(matches!(
            no_responses.validate(),
            Err(ValidationError::NoResponses { .. })
        ));

        let slow = MockDefinition::from_yaml(
            "routes:\n  - path: /x\n    responses:\n      - delay: 90000",
        )
        .unwrap();
        assert!(matches!(
            slow.validate(),
            Err(ValidationError::InvalidDelay {
                source: DelayError::MinTooLarge(90000),
                ..
            })
        ));

        let both = MockDefinition::from_yaml(
            "routes:\n  - path: /x\n    responses:\n      - body: x\n        file_path: y.json",
        )
        .unwrap();
        assert!(matches!(
            both.validate(),
            Err(ValidationError::BodyAndFile { .. })
        ));

        let valueless = MockDefinition::from_yaml(
            "routes:\n  - path: /x\n    responses:\n      - rules:\n          - target: header\n            modifier: a\n            operator: equal",
        )
        .unwrap();
        assert!(matches!(
            valueless.validate(),
            Err(ValidationError::MissingRuleValue { rule: 0, .. })
        ));

        let proxy = MockDefinition::from_yaml(
            "proxy:\n  enabled: true\nroutes:\n  - path: /x\n    responses:\n      - body: ok",
        )
        .unwrap();
        assert_eq!(proxy.validate(), Err(ValidationError::MissingProxyHost));
    }

    #[test]
    fn test_from_file_records_source_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "routes:\n  - path: /hello\n    responses:\n      - body: world"
        )
        .unwrap();

        let mock = MockDefinition::from_file(file.path()).unwrap();
        assert_eq!(mock.source_path.as_deref(), Some(file.path()));
        assert!(!mock.id.is_empty());
        assert_eq!(mock.routes[0].responses[0].body, "world");
    }

    #[test]
    fn test_from_file_missing() {
        let err = MockDefinition::from_file("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}

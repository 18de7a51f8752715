//! Response filtering by rules and picking by response mode.

use super::rule::RuleEvaluator;
use super::MatchError;
use crate::mock::{Response, ResponseMode, RuleAggregation};
use rand::Rng;

/// Filters a route's responses by their rules and picks one according to the
/// route's response mode
pub struct ResponseSelector<'a> {
    evaluator: RuleEvaluator<'a>,
}

impl<'a> ResponseSelector<'a> {
    pub fn new(evaluator: RuleEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    /// Whether every (and) or any (or) rule of a response holds
    pub async fn response_matches(&self, response: &Response) -> Result<bool, MatchError> {
        if response.rules.is_empty() {
            return Ok(true);
        }

        match response.rule_aggregation {
            RuleAggregation::And => {
                for rule in &response.rules {
                    if !self.evaluator.evaluate(rule).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RuleAggregation::Or => {
                for rule in &response.rules {
                    if self.evaluator.evaluate(rule).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Responses whose rules match, in definition order
    pub async fn filter<'r>(
        &self,
        responses: &'r [Response],
    ) -> Result<Vec<&'r Response>, MatchError> {
        let mut candidates = Vec::new();
        for response in responses {
            if self.response_matches(response).await? {
                candidates.push(response);
            }
        }
        Ok(candidates)
    }

    /// Pick one candidate according to `mode`; `None` when there are no candidates
    pub async fn pick<'r>(
        &self,
        mode: ResponseMode,
        candidates: &[&'r Response],
    ) -> Result<Option<&'r Response>, MatchError> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let picked = match mode {
            ResponseMode::Default => candidates
                .iter()
                .find(|r| r.is_default)
                .unwrap_or(&candidates[0]),
            ResponseMode::Sequential => {
                let key = self
                    .evaluator
                    .context
                    .sequence_key(self.evaluator.request);
                let cursor = self
                    .evaluator
                    .store
                    .next_cursor(&key, candidates.len())
                    .await?;
                &candidates[cursor.min(candidates.len() - 1)]
            }
            ResponseMode::Random => {
                let index = rand::thread_rng().gen_range(0..candidates.len());
                &candidates[index]
            }
        };
        Ok(Some(*picked))
    }
}

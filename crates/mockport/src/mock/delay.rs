//! Response delay bounds.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for both delay fields, in milliseconds
pub const MAX_DELAY_MS: u64 = 60_000;

/// Delay applied before writing a matched response, in milliseconds.
///
/// Accepts either `{min: 100, max: 500}` or a bare integer meaning a fixed delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDelay")]
pub struct Delay {
    pub min: u64,
    pub max: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDelay {
    Fixed(u64),
    Range {
        #[serde(default)]
        min: u64,
        #[serde(default)]
        max: u64,
    },
}

impl From<RawDelay> for Delay {
    fn from(raw: RawDelay) -> Self {
        match raw {
            RawDelay::Fixed(ms) => Delay { min: ms, max: ms },
            RawDelay::Range { min, max } => Delay { min, max },
        }
    }
}

/// Reasons a delay is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelayError {
    #[error("delay min {0}ms exceeds the 60000ms limit")]
    MinTooLarge(u64),
    #[error("delay max {0}ms exceeds the 60000ms limit")]
    MaxTooLarge(u64),
    #[error("delay min {min}ms is greater than max {max}ms")]
    MinAboveMax { min: u64, max: u64 },
}

impl Delay {
    pub fn fixed(ms: u64) -> Self {
        Delay { min: ms, max: ms }
    }

    pub fn is_zero(&self) -> bool {
        self.min == 0 && self.max == 0
    }

    /// Pick the delay for one response in milliseconds
    pub fn value(&self) -> u64 {
        if self.min >= self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.value())
    }

    pub fn validate(&self) -> Result<(), DelayError> {
        if self.min > MAX_DELAY_MS {
            return Err(DelayError::MinTooLarge(self.min));
        }
        if self.max > MAX_DELAY_MS {
            return Err(DelayError::MaxTooLarge(self.max));
        }
        if self.min > self.max {
            return Err(DelayError::MinAboveMax {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

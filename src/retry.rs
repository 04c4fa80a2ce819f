// src/retry.rs
//! Bounded retry for unresolved locations.
//!
//! Each failure increments the counter. The failure that reaches `max_attempts`
//! resets it to 0 and asks the caller to switch to manual emergency contacts;
//! the next failure starts a fresh cycle.

use serde::Serialize;

use crate::config::RetryConfig;
use crate::slots::{SlotMutation, SlotName, SlotValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryOutcome {
    pub retry_count: u32,
    pub escalate_to_manual: bool,
}

impl RetryOutcome {
    /// Slot writes that record this outcome.
    pub fn mutations(&self) -> Vec<SlotMutation> {
        let mut out = vec![SlotMutation::new(
            SlotName::LocationRetryCount,
            SlotValue::Count(self.retry_count),
        )];
        if self.escalate_to_manual {
            out.push(SlotMutation::flag(SlotName::LocationValidated, false));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn on_location_failure(&self, retry_count: u32) -> RetryOutcome {
        let attempts = retry_count.saturating_add(1);
        if attempts >= self.max_attempts {
            RetryOutcome {
                retry_count: 0,
                escalate_to_manual: true,
            }
        } else {
            RetryOutcome {
                retry_count: attempts,
                escalate_to_manual: false,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

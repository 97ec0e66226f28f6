//! Escalation policy — the ordered chain of notification steps.
//!
//! Wait convention: each step's `wait_minutes` is relative to the previous
//! step's fire time, not cumulative from alert creation. Step 0 always
//! fires immediately. The last step holds the alert for
//! `final_ack_window_minutes` before it is exhausted.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::{Channel, RecipientTier};

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid policy document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid policy: {0}")]
    Invalid(String),
}

/// One step of the chain: who to notify, how, and how long after the
/// previous step fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    pub wait_minutes: u32,
    pub recipient_tier: RecipientTier,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EscalationPolicy {
    version: u32,
    /// Acknowledgment window for the last step before exhaustion.
    final_ack_window_minutes: u32,
    steps: Vec<EscalationStep>,
}

impl EscalationPolicy {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let policy: EscalationPolicy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The policy shipped with the binary.
    pub fn builtin() -> Self {
        Self::from_json(include_str!("../resources/escalation_policy.json"))
            .expect("embedded escalation policy is valid")
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.steps.is_empty() {
            return Err(PolicyError::Invalid("policy must have at least one step".into()));
        }
        if self.steps[0].wait_minutes != 0 {
            return Err(PolicyError::Invalid(
                "step 0 must fire immediately (wait_minutes = 0)".into(),
            ));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.channels.is_empty() {
                return Err(PolicyError::Invalid(format!("step {i} has no channels")));
            }
        }
        if self.final_ack_window_minutes == 0 {
            return Err(PolicyError::Invalid("final_ack_window_minutes must be > 0".into()));
        }
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Step definition by index; `None` means the chain is exhausted.
    pub fn step(&self, index: u32) -> Option<&EscalationStep> {
        self.steps.get(index as usize)
    }

    /// How long an alert sits in step `index` before its timer fires:
    /// the next step's wait, or the final acknowledgment window when
    /// `index` is the last step.
    pub fn ack_window(&self, index: u32) -> Option<Duration> {
        self.step(index)?;
        let minutes = match self.step(index + 1) {
            Some(next) => next.wait_minutes,
            None => self.final_ack_window_minutes,
        };
        Some(Duration::minutes(minutes as i64))
    }
}

use serde::{Deserialize, Serialize};

use super::enums::Severity;
use super::threshold::ThresholdRule;

/// Outcome of classifying one lab result. Created fresh per classification
/// call and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalityVerdict {
    pub is_critical: bool,
    pub severity: Severity,
    /// The rule the value was evaluated against, when one matched.
    pub matched_rule: Option<ThresholdRule>,
    /// True when no threshold exists for the test code. Not critical by
    /// policy, but callers should surface it for catalog maintenance.
    pub rule_missing: bool,
    pub reason: String,
}

impl CriticalityVerdict {
    /// Not-critical verdict for a test code absent from the catalog.
    pub fn not_evaluated(test_code: &str) -> Self {
        Self {
            is_critical: false,
            severity: Severity::None,
            matched_rule: None,
            rule_missing: true,
            reason: format!("no threshold defined for test code {test_code}"),
        }
    }
}

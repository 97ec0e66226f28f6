//! Criticality classifier — pure evaluation of a lab result against the
//! threshold catalog. No I/O, no side effects.
//!
//! Policy decisions (documented, tested):
//! - Bounds are exclusive: a value equal to a bound is not critical.
//! - A test code with no catalog rule is never critical; the verdict
//!   carries `rule_missing` so callers can surface the gap.
//! - Unit mismatch is a hard error, never a silent conversion.

use thiserror::Error;

use crate::catalog::ThresholdCatalog;
use crate::models::enums::Severity;
use crate::models::{CriticalityVerdict, LabResult};

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Unit mismatch for {test_code}: result has '{actual}', rule expects '{expected}'")]
    UnitMismatch {
        test_code: String,
        expected: String,
        actual: String,
    },

    #[error("Result {result_id} has empty unit")]
    MissingUnit { result_id: String },

    #[error("Result {result_id} has non-finite value")]
    NonFiniteValue { result_id: String },
}

/// Knobs for the severity split.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Relative deviation beyond the violated bound above which a critical
    /// value is graded severe instead of moderate. 0.10 means "more than
    /// 10% past the bound".
    pub severe_deviation_margin: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { severe_deviation_margin: 0.10 }
    }
}

/// Classify one lab result against the catalog.
pub fn classify(
    result: &LabResult,
    catalog: &ThresholdCatalog,
    config: &ClassifierConfig,
) -> Result<CriticalityVerdict, ClassifyError> {
    if result.unit.trim().is_empty() {
        return Err(ClassifyError::MissingUnit { result_id: result.id.clone() });
    }
    if !result.value.is_finite() {
        return Err(ClassifyError::NonFiniteValue { result_id: result.id.clone() });
    }

    let Some(rule) = catalog.rule_for(&result.test_code, result.patient_age) else {
        return Ok(CriticalityVerdict::not_evaluated(&result.test_code));
    };

    if !rule.unit.eq_ignore_ascii_case(result.unit.trim()) {
        return Err(ClassifyError::UnitMismatch {
            test_code: result.test_code.clone(),
            expected: rule.unit.clone(),
            actual: result.unit.clone(),
        });
    }

    // Exclusive bounds: strictly beyond the bound is critical.
    let violated_bound = match (rule.low, rule.high) {
        (Some(low), _) if result.value < low => Some(low),
        (_, Some(high)) if result.value > high => Some(high),
        _ => None,
    };

    let Some(bound) = violated_bound else {
        return Ok(CriticalityVerdict {
            is_critical: false,
            severity: Severity::None,
            matched_rule: Some(rule.clone()),
            rule_missing: false,
            reason: format!(
                "{} {} {} within critical bounds",
                result.test_code, result.value, result.unit
            ),
        });
    };

    let deviation = (result.value - bound).abs() / bound.abs();
    let severity = if deviation > config.severe_deviation_margin {
        Severity::Severe
    } else {
        Severity::Moderate
    };

    Ok(CriticalityVerdict {
        is_critical: true,
        severity,
        matched_rule: Some(rule.clone()),
        rule_missing: false,
        reason: format!(
            "{} {} {} beyond critical bound {} ({})",
            result.test_code, result.value, result.unit, bound, rule.description
        ),
    })
}

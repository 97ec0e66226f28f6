//! Threshold catalog — versioned critical-value bounds per test code.
//!
//! Loaded once at process start from a JSON document (embedded default or a
//! file in the data dir) and immutable afterwards. A reload builds a whole
//! new catalog; rules are never mutated in place.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::models::ThresholdRule;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rule for {test_code}: {reason}")]
    InvalidRule { test_code: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    version: u32,
    rules: Vec<ThresholdRule>,
}

/// Immutable lookup table of threshold rules, keyed by test code.
#[derive(Debug, Clone)]
pub struct ThresholdCatalog {
    version: u32,
    rules: HashMap<String, Vec<ThresholdRule>>,
}

impl ThresholdCatalog {
    /// Parse and validate a catalog document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;

        let mut rules: HashMap<String, Vec<ThresholdRule>> = HashMap::new();
        for rule in doc.rules {
            validate_rule(&rule)?;
            rules.entry(rule.test_code.clone()).or_default().push(rule);
        }

        Ok(Self { version: doc.version, rules })
    }

    /// Load from a file on disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Self {
        Self::from_json(include_str!("../resources/thresholds.json"))
            .expect("embedded threshold catalog is valid")
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Rule applicable to a test code and patient age.
    ///
    /// An age-band rule matching the patient's age takes precedence over the
    /// generic rule for the same test code.
    pub fn rule_for(&self, test_code: &str, age: u32) -> Option<&ThresholdRule> {
        let candidates = self.rules.get(test_code)?;

        candidates
            .iter()
            .filter(|r| r.applies_to_age(age))
            .max_by_key(|r| r.is_age_specific())
    }
}

fn validate_rule(rule: &ThresholdRule) -> Result<(), CatalogError> {
    if rule.low.is_none() && rule.high.is_none() {
        return Err(CatalogError::InvalidRule {
            test_code: rule.test_code.clone(),
            reason: "at least one of low/high bound required".into(),
        });
    }
    if let (Some(low), Some(high)) = (rule.low, rule.high) {
        if low >= high {
            return Err(CatalogError::InvalidRule {
                test_code: rule.test_code.clone(),
                reason: format!("low bound {low} must be below high bound {high}"),
            });
        }
    }
    if let (Some(min), Some(max)) = (rule.age_min, rule.age_max) {
        if min > max {
            return Err(CatalogError::InvalidRule {
                test_code: rule.test_code.clone(),
                reason: format!("age_min {min} above age_max {max}"),
            });
        }
    }
    if rule.unit.trim().is_empty() {
        return Err(CatalogError::InvalidRule {
            test_code: rule.test_code.clone(),
            reason: "unit must not be empty".into(),
        });
    }
    Ok(())
}

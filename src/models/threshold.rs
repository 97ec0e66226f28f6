use serde::{Deserialize, Serialize};

/// One critical boundary for one test code, optionally restricted to an
/// age band. Loaded from the threshold catalog document and immutable for
/// the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub test_code: String,
    /// Unit the bounds are expressed in; must match the incoming result.
    pub unit: String,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    /// Inclusive age band in whole years. Absent on generic rules.
    #[serde(default)]
    pub age_min: Option<u32>,
    #[serde(default)]
    pub age_max: Option<u32>,
    pub severity_label: String,
    pub description: String,
}

impl ThresholdRule {
    /// Whether this rule carries an age band.
    pub fn is_age_specific(&self) -> bool {
        self.age_min.is_some() || self.age_max.is_some()
    }

    /// Whether the rule applies to a patient of the given age.
    /// Generic rules (no band) apply to everyone.
    pub fn applies_to_age(&self, age: u32) -> bool {
        if let Some(min) = self.age_min {
            if age < min {
                return false;
            }
        }
        if let Some(max) = self.age_max {
            if age > max {
                return false;
            }
        }
        true
    }
}

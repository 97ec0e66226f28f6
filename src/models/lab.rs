use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A normalized lab result handed in by the ingestion boundary.
///
/// Format normalization (HL7/JSON/XML/CSV) happens upstream; by the time a
/// result reaches the engine it carries one numeric value and one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    /// Result identifier assigned by the laboratory system (e.g. "RES-001").
    pub id: String,
    pub patient_id: String,
    /// Patient age in whole years at collection time.
    pub patient_age: u32,
    pub test_code: String,
    pub value: f64,
    pub unit: String,
    pub collected_at: NaiveDateTime,
}

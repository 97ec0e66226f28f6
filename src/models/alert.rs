use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertState, Channel, DeliveryStatus, RecipientTier, Severity};

/// One escalation episode for one critical result.
///
/// Owned by the alert state machine; all mutation goes through engine
/// operations, never direct field writes. Retained indefinitely for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// Identifier of the originating lab result.
    pub result_id: String,
    pub state: AlertState,
    /// Severity of the originating verdict, carried into every notice.
    pub severity: Severity,
    /// Human-readable danger description from classification.
    pub reason: String,
    /// Current escalation step. Monotonically non-decreasing.
    pub step_index: u32,
    /// Optimistic-concurrency version of the persisted row.
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub last_transition_at: NaiveDateTime,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<NaiveDateTime>,
}

impl Alert {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// One notification attempt in an alert's escalation history (audit trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAttempt {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub step_index: u32,
    pub recipient_tier: RecipientTier,
    pub channel: Channel,
    pub dispatched_at: NaiveDateTime,
    pub outcome: DeliveryStatus,
    /// Failure detail from the channel sender, when delivery failed.
    pub detail: Option<String>,
}

/// A pending escalation timer row: fire `advance_on_timeout(alert_id,
/// expected_step)` at `fire_at`. One per alert; arming the next step
/// replaces the previous row.
#[derive(Debug, Clone)]
pub struct EscalationTimer {
    pub alert_id: Uuid,
    pub expected_step: u32,
    pub fire_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

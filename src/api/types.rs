//! Request/response DTOs for the ingestion and acknowledgment endpoints.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{AlertState, Channel, DeliveryStatus, RecipientTier, Severity};
use crate::models::{Alert, CriticalityVerdict, EscalationAttempt};

/// Response to an ingested result: the verdict, plus the alert handle when
/// the result was critical.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub verdict: CriticalityVerdict,
    pub alert_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    /// Identity of the acknowledging clinician.
    pub acknowledged_by: String,
}

/// Alert projection returned by the query/acknowledge endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertView {
    pub id: Uuid,
    pub result_id: String,
    pub state: AlertState,
    pub severity: Severity,
    pub reason: String,
    pub step_index: u32,
    pub created_at: NaiveDateTime,
    pub last_transition_at: NaiveDateTime,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub history: Vec<AttemptView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptView {
    pub step_index: u32,
    pub recipient_tier: RecipientTier,
    pub channel: Channel,
    pub dispatched_at: NaiveDateTime,
    pub outcome: DeliveryStatus,
    pub detail: Option<String>,
}

impl AlertView {
    pub fn from_alert(alert: Alert, attempts: Vec<EscalationAttempt>) -> Self {
        Self {
            id: alert.id,
            result_id: alert.result_id,
            state: alert.state,
            severity: alert.severity,
            reason: alert.reason,
            step_index: alert.step_index,
            created_at: alert.created_at,
            last_transition_at: alert.last_transition_at,
            acknowledged_by: alert.acknowledged_by,
            acknowledged_at: alert.acknowledged_at,
            history: attempts
                .into_iter()
                .map(|a| AttemptView {
                    step_index: a.step_index,
                    recipient_tier: a.recipient_tier,
                    channel: a.channel,
                    dispatched_at: a.dispatched_at,
                    outcome: a.outcome,
                    detail: a.detail,
                })
                .collect(),
        }
    }
}

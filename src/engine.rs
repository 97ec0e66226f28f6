//! Alert state machine — owns the lifecycle of one escalation episode.
//!
//! States: created -> step_active(N) -> acknowledged | exhausted.
//! Terminal states accept no further transitions; repeated acknowledgments
//! succeed idempotently. Transitions are serialized per alert through the
//! optimistic version column on the persisted row, so a timer firing and an
//! acknowledgment racing each other resolve to exactly one outcome.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{
    acknowledge_alert, arm_timer, cancel_timer, cancel_timer_for_step,
    find_active_alert_by_result, get_alert, insert_alert, insert_attempt, transition_alert,
};
use crate::db::DatabaseError;
use crate::dispatch::{AlertNotice, NotificationDispatcher};
use crate::models::enums::AlertState;
use crate::models::{Alert, CriticalityVerdict, EscalationAttempt, EscalationTimer};
use crate::policy::EscalationPolicy;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Result {result_id} is not critical; no alert created")]
    NotCritical { result_id: String },

    #[error("Alert not found: {alert_id}")]
    AlertNotFound { alert_id: Uuid },

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for EngineError {
    fn from(err: DatabaseError) -> Self {
        EngineError::Database(err)
    }
}

/// What a timer firing did once the current state was re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Escalated to the given step.
    Advanced(u32),
    /// The chain ran out; the alert is now exhausted.
    Exhausted,
    /// The alert had already moved on (acknowledged or re-advanced); the
    /// firing was stale and nothing happened.
    Stale,
}

/// Drives alert transitions against the persisted store.
///
/// Stateless apart from configuration: each operation opens with a fresh
/// read of the alert row, so concurrent callers on separate connections
/// stay consistent through the version guard.
pub struct AlertEngine {
    policy: EscalationPolicy,
    dispatcher: Arc<NotificationDispatcher>,
}

impl AlertEngine {
    pub fn new(policy: EscalationPolicy, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { policy, dispatcher }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Open an escalation episode for a critical result.
    ///
    /// Idempotent per result: while an alert for `result_id` is active, the
    /// existing alert id is returned and nothing is re-dispatched. Otherwise
    /// the alert enters `step_active(0)` immediately: step 0 is dispatched
    /// and its timer armed before this returns.
    pub fn create_alert(
        &self,
        conn: &Connection,
        result_id: &str,
        verdict: &CriticalityVerdict,
    ) -> Result<Uuid, EngineError> {
        if !verdict.is_critical {
            return Err(EngineError::NotCritical { result_id: result_id.to_string() });
        }

        if let Some(existing) = find_active_alert_by_result(conn, result_id)? {
            tracing::info!(
                alert_id = %existing.id,
                result_id,
                "Active alert already exists for result; returning it"
            );
            return Ok(existing.id);
        }

        let now = chrono::Utc::now().naive_utc();
        let alert = Alert {
            id: Uuid::new_v4(),
            result_id: result_id.to_string(),
            state: AlertState::Created,
            severity: verdict.severity,
            reason: verdict.reason.clone(),
            step_index: 0,
            version: 1,
            created_at: now,
            last_transition_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
        };

        if let Err(err) = insert_alert(conn, &alert) {
            // Lost a creation race: the partial unique index rejected the
            // second row. Surface the winner instead.
            if let Some(existing) = find_active_alert_by_result(conn, result_id)? {
                tracing::debug!(
                    alert_id = %existing.id,
                    result_id,
                    "Concurrent alert creation; returning winner"
                );
                return Ok(existing.id);
            }
            return Err(err.into());
        }

        tracing::info!(
            alert_id = %alert.id,
            result_id,
            severity = alert.severity.as_str(),
            "Critical alert created"
        );

        self.enter_step(conn, &alert, 0, &now)?;
        Ok(alert.id)
    }

    /// Record a recipient's acknowledgment and stop escalation.
    ///
    /// Idempotent on terminal alerts: re-acknowledging succeeds without
    /// error and without any new notification. Unknown ids are a distinct
    /// `AlertNotFound`, never conflated with "already resolved".
    pub fn acknowledge(
        &self,
        conn: &Connection,
        alert_id: &Uuid,
        acknowledged_by: &str,
        acknowledged_at: &NaiveDateTime,
    ) -> Result<Alert, EngineError> {
        let mut alert = self.fetch(conn, alert_id)?;

        // A timer may advance the step while we hold an older version;
        // acknowledgment still wins, so re-read and try again.
        loop {
            if alert.is_terminal() {
                tracing::debug!(
                    alert_id = %alert.id,
                    state = alert.state.as_str(),
                    "Acknowledgment on terminal alert; idempotent no-op"
                );
                return Ok(alert);
            }

            match acknowledge_alert(conn, alert_id, alert.version, acknowledged_by, acknowledged_at)
            {
                Ok(()) => break,
                Err(DatabaseError::StaleVersion { .. }) => {
                    alert = self.fetch(conn, alert_id)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Best-effort: a late firing is harmless either way because of the
        // expected-step re-check in advance_on_timeout.
        cancel_timer(conn, alert_id)?;

        tracing::info!(alert_id = %alert_id, acknowledged_by, "Alert acknowledged");
        self.fetch(conn, alert_id)
    }

    /// Timer-driven escalation. Called only by the scheduler.
    ///
    /// Re-reads current state and acts only when the alert is still in
    /// `step_active(expected_step)`; any other state means an acknowledgment
    /// or another firing got there first and this call is a safe no-op.
    pub fn advance_on_timeout(
        &self,
        conn: &Connection,
        alert_id: &Uuid,
        expected_step: u32,
    ) -> Result<AdvanceOutcome, EngineError> {
        let alert = self.fetch(conn, alert_id)?;

        if alert.state != AlertState::StepActive || alert.step_index != expected_step {
            tracing::debug!(
                alert_id = %alert_id,
                expected_step,
                state = alert.state.as_str(),
                current_step = alert.step_index,
                "Stale timer firing ignored"
            );
            cancel_timer_for_step(conn, alert_id, expected_step)?;
            return Ok(AdvanceOutcome::Stale);
        }

        let now = chrono::Utc::now().naive_utc();
        let next_step = expected_step + 1;

        if self.policy.step(next_step).is_none() {
            match transition_alert(conn, alert_id, alert.version, AlertState::Exhausted,
                expected_step, &now)
            {
                Ok(()) => {}
                Err(DatabaseError::StaleVersion { .. }) => {
                    cancel_timer_for_step(conn, alert_id, expected_step)?;
                    return Ok(AdvanceOutcome::Stale);
                }
                Err(err) => return Err(err.into()),
            }
            cancel_timer(conn, alert_id)?;
            tracing::warn!(
                alert_id = %alert_id,
                steps = self.policy.step_count(),
                "Escalation chain exhausted with no acknowledgment"
            );
            return Ok(AdvanceOutcome::Exhausted);
        }

        match self.enter_step(conn, &alert, next_step, &now) {
            Ok(()) => Ok(AdvanceOutcome::Advanced(next_step)),
            Err(EngineError::Database(DatabaseError::StaleVersion { .. })) => {
                cancel_timer_for_step(conn, alert_id, expected_step)?;
                Ok(AdvanceOutcome::Stale)
            }
            Err(err) => Err(err),
        }
    }

    /// Full alert lookup for the query surface.
    pub fn get(&self, conn: &Connection, alert_id: &Uuid) -> Result<Alert, EngineError> {
        self.fetch(conn, alert_id)
    }

    /// Commit the transition into `step_index`, dispatch its notifications,
    /// and arm the step's timer.
    fn enter_step(
        &self,
        conn: &Connection,
        alert: &Alert,
        step_index: u32,
        now: &NaiveDateTime,
    ) -> Result<(), EngineError> {
        transition_alert(conn, &alert.id, alert.version, AlertState::StepActive, step_index, now)?;

        // Dispatch after the transition commits. Delivery failure never
        // blocks the state machine; outcomes land in the audit history.
        let step = self
            .policy
            .step(step_index)
            .expect("enter_step called with a configured step");

        let notice = AlertNotice {
            alert_id: alert.id,
            result_id: alert.result_id.clone(),
            step_index,
            recipient_tier: step.recipient_tier,
            severity: alert.severity,
            message: alert.reason.clone(),
        };

        let outcomes = self.dispatcher.dispatch(&notice, step);
        for outcome in &outcomes {
            insert_attempt(
                conn,
                &EscalationAttempt {
                    id: Uuid::new_v4(),
                    alert_id: alert.id,
                    step_index,
                    recipient_tier: step.recipient_tier,
                    channel: outcome.channel,
                    dispatched_at: *now,
                    outcome: outcome.status,
                    detail: outcome.detail.clone(),
                },
            )?;
        }

        let window = self
            .policy
            .ack_window(step_index)
            .expect("configured step has an ack window");
        arm_timer(
            conn,
            &EscalationTimer {
                alert_id: alert.id,
                expected_step: step_index,
                fire_at: *now + window,
                created_at: *now,
            },
        )?;

        tracing::info!(
            alert_id = %alert.id,
            step = step_index,
            tier = step.recipient_tier.as_str(),
            fire_at = %(*now + window),
            "Escalation step active"
        );
        Ok(())
    }

    fn fetch(&self, conn: &Connection, alert_id: &Uuid) -> Result<Alert, EngineError> {
        match get_alert(conn, alert_id) {
            Ok(alert) => Ok(alert),
            Err(DatabaseError::NotFound { .. }) => {
                Err(EngineError::AlertNotFound { alert_id: *alert_id })
            }
            Err(err) => Err(err.into()),
        }
    }
}

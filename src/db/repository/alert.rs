use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_ts, parse_ts};
use crate::db::DatabaseError;
use crate::models::enums::{AlertState, Channel, DeliveryStatus, RecipientTier, Severity};
use crate::models::{Alert, EscalationAttempt};

const ALERT_COLUMNS: &str = "id, result_id, state, severity, reason, step_index, version,
     created_at, last_transition_at, acknowledged_by, acknowledged_at";

pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO alerts (id, result_id, state, severity, reason, step_index, version,
         created_at, last_transition_at, acknowledged_by, acknowledged_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            alert.id.to_string(),
            alert.result_id,
            alert.state.as_str(),
            alert.severity.as_str(),
            alert.reason,
            alert.step_index,
            alert.version,
            fmt_ts(&alert.created_at),
            fmt_ts(&alert.last_transition_at),
            alert.acknowledged_by,
            alert.acknowledged_at.as_ref().map(fmt_ts),
        ],
    )?;
    Ok(())
}

pub fn get_alert(conn: &Connection, alert_id: &Uuid) -> Result<Alert, DatabaseError> {
    let query = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1");
    conn.query_row(&query, params![alert_id.to_string()], |row| {
        Ok(alert_row_from_rusqlite(row))
    })
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "alert".into(),
        id: alert_id.to_string(),
    })
    .and_then(|row| alert_from_row(row?))
}

/// Find the non-terminal alert for a result, if one exists.
/// The partial unique index guarantees at most one.
pub fn find_active_alert_by_result(
    conn: &Connection,
    result_id: &str,
) -> Result<Option<Alert>, DatabaseError> {
    let query = format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE result_id = ?1 AND state IN ('created', 'step_active')"
    );
    let row = conn
        .query_row(&query, params![result_id], |row| Ok(alert_row_from_rusqlite(row)))
        .optional()?;
    match row {
        Some(row) => Ok(Some(alert_from_row(row?)?)),
        None => Ok(None),
    }
}

/// Advance an alert to a new state/step, guarded by the expected version.
///
/// Returns `StaleVersion` when another transition committed first; the
/// caller must re-read and decide whether its transition still applies.
pub fn transition_alert(
    conn: &Connection,
    alert_id: &Uuid,
    expected_version: i64,
    new_state: AlertState,
    new_step: u32,
    now: &chrono::NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE alerts SET state = ?1, step_index = ?2, version = version + 1,
         last_transition_at = ?3
         WHERE id = ?4 AND version = ?5",
        params![
            new_state.as_str(),
            new_step,
            fmt_ts(now),
            alert_id.to_string(),
            expected_version,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::StaleVersion {
            alert_id: alert_id.to_string(),
            expected: expected_version,
        });
    }
    Ok(())
}

/// Record an acknowledgment and move the alert to its terminal state,
/// guarded by the expected version.
pub fn acknowledge_alert(
    conn: &Connection,
    alert_id: &Uuid,
    expected_version: i64,
    acknowledged_by: &str,
    acknowledged_at: &chrono::NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE alerts SET state = ?1, version = version + 1,
         last_transition_at = ?2, acknowledged_by = ?3, acknowledged_at = ?4
         WHERE id = ?5 AND version = ?6",
        params![
            AlertState::Acknowledged.as_str(),
            fmt_ts(acknowledged_at),
            acknowledged_by,
            fmt_ts(acknowledged_at),
            alert_id.to_string(),
            expected_version,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::StaleVersion {
            alert_id: alert_id.to_string(),
            expected: expected_version,
        });
    }
    Ok(())
}

pub fn insert_attempt(conn: &Connection, attempt: &EscalationAttempt) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO escalation_attempts
         (id, alert_id, step_index, recipient_tier, channel, dispatched_at, outcome, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            attempt.id.to_string(),
            attempt.alert_id.to_string(),
            attempt.step_index,
            attempt.recipient_tier.as_str(),
            attempt.channel.as_str(),
            fmt_ts(&attempt.dispatched_at),
            attempt.outcome.as_str(),
            attempt.detail,
        ],
    )?;
    Ok(())
}

/// Escalation history for one alert, oldest first.
pub fn get_attempts(conn: &Connection, alert_id: &Uuid) -> Result<Vec<EscalationAttempt>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, alert_id, step_index, recipient_tier, channel, dispatched_at, outcome, detail
         FROM escalation_attempts WHERE alert_id = ?1
         ORDER BY dispatched_at ASC, step_index ASC",
    )?;

    let rows = stmt.query_map(params![alert_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, u32>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut attempts = Vec::new();
    for row in rows {
        let (id, alert_id, step_index, tier, channel, dispatched_at, outcome, detail) = row?;
        attempts.push(EscalationAttempt {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            alert_id: Uuid::parse_str(&alert_id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            step_index,
            recipient_tier: RecipientTier::from_str(&tier)?,
            channel: Channel::from_str(&channel)?,
            dispatched_at: parse_ts(&dispatched_at)?,
            outcome: DeliveryStatus::from_str(&outcome)?,
            detail,
        });
    }
    Ok(attempts)
}

// Internal row type for Alert mapping
struct AlertRow {
    id: String,
    result_id: String,
    state: String,
    severity: String,
    reason: String,
    step_index: u32,
    version: i64,
    created_at: String,
    last_transition_at: String,
    acknowledged_by: Option<String>,
    acknowledged_at: Option<String>,
}

fn alert_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<AlertRow, rusqlite::Error> {
    Ok(AlertRow {
        id: row.get(0)?,
        result_id: row.get(1)?,
        state: row.get(2)?,
        severity: row.get(3)?,
        reason: row.get(4)?,
        step_index: row.get(5)?,
        version: row.get(6)?,
        created_at: row.get(7)?,
        last_transition_at: row.get(8)?,
        acknowledged_by: row.get(9)?,
        acknowledged_at: row.get(10)?,
    })
}

fn alert_from_row(row: AlertRow) -> Result<Alert, DatabaseError> {
    Ok(Alert {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        result_id: row.result_id,
        state: AlertState::from_str(&row.state)?,
        severity: Severity::from_str(&row.severity)?,
        reason: row.reason,
        step_index: row.step_index,
        version: row.version,
        created_at: parse_ts(&row.created_at)?,
        last_transition_at: parse_ts(&row.last_transition_at)?,
        acknowledged_by: row.acknowledged_by,
        acknowledged_at: row.acknowledged_at.as_deref().map(parse_ts).transpose()?,
    })
}

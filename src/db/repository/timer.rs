use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_ts, parse_ts};
use crate::db::DatabaseError;
use crate::models::EscalationTimer;

/// Arm (or re-arm) the timer for an alert. One row per alert; arming the
/// next step's timer replaces the previous one.
pub fn arm_timer(conn: &Connection, timer: &EscalationTimer) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO escalation_timers (alert_id, expected_step, fire_at, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            timer.alert_id.to_string(),
            timer.expected_step,
            fmt_ts(&timer.fire_at),
            fmt_ts(&timer.created_at),
        ],
    )?;
    Ok(())
}

/// Best-effort timer cancellation. Missing rows are fine: the expected-step
/// guard in the engine makes a late firing harmless.
pub fn cancel_timer(conn: &Connection, alert_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM escalation_timers WHERE alert_id = ?1",
        params![alert_id.to_string()],
    )?;
    Ok(())
}

/// Remove a timer row only if it still belongs to the given step. Used when
/// a late firing turns out to be stale, so a newer timer for a later step is
/// never touched.
pub fn cancel_timer_for_step(
    conn: &Connection,
    alert_id: &Uuid,
    expected_step: u32,
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM escalation_timers WHERE alert_id = ?1 AND expected_step = ?2",
        params![alert_id.to_string(), expected_step],
    )?;
    Ok(())
}

/// Timers due at or before `now`, oldest first.
pub fn due_timers(
    conn: &Connection,
    now: &chrono::NaiveDateTime,
) -> Result<Vec<EscalationTimer>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT alert_id, expected_step, fire_at, created_at
         FROM escalation_timers WHERE fire_at <= ?1
         ORDER BY fire_at ASC",
    )?;

    let rows = stmt.query_map(params![fmt_ts(now)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut timers = Vec::new();
    for row in rows {
        let (alert_id, expected_step, fire_at, created_at) = row?;
        timers.push(EscalationTimer {
            alert_id: Uuid::parse_str(&alert_id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            expected_step,
            fire_at: parse_ts(&fire_at)?,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(timers)
}

/// Count of pending timers (startup reconciliation logging).
pub fn pending_timer_count(conn: &Connection) -> Result<u32, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM escalation_timers", [], |row| {
        row.get::<_, u32>(0)
    })?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::alert::insert_alert;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{AlertState, Severity};
    use crate::models::Alert;
    use chrono::{Duration, NaiveDate};

    fn ts() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn seed_alert(conn: &Connection, result_id: &str) -> Uuid {
        let alert = Alert {
            id: Uuid::new_v4(),
            result_id: result_id.into(),
            state: AlertState::StepActive,
            severity: Severity::Severe,
            reason: "test".into(),
            step_index: 0,
            version: 1,
            created_at: ts(),
            last_transition_at: ts(),
            acknowledged_by: None,
            acknowledged_at: None,
        };
        insert_alert(conn, &alert).unwrap();
        alert.id
    }

    fn timer(alert_id: Uuid, step: u32, fire_at: chrono::NaiveDateTime) -> EscalationTimer {
        EscalationTimer {
            alert_id,
            expected_step: step,
            fire_at,
            created_at: ts(),
        }
    }

    #[test]
    fn due_timer_is_returned() {
        let conn = open_memory_database().unwrap();
        let id = seed_alert(&conn, "RES-001");
        arm_timer(&conn, &timer(id, 0, ts())).unwrap();

        let due = due_timers(&conn, &(ts() + Duration::seconds(1))).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].alert_id, id);
        assert_eq!(due[0].expected_step, 0);
    }

    #[test]
    fn future_timer_is_not_due() {
        let conn = open_memory_database().unwrap();
        let id = seed_alert(&conn, "RES-002");
        arm_timer(&conn, &timer(id, 0, ts() + Duration::minutes(10))).unwrap();

        assert!(due_timers(&conn, &ts()).unwrap().is_empty());
    }

    #[test]
    fn rearming_replaces_previous_step_timer() {
        let conn = open_memory_database().unwrap();
        let id = seed_alert(&conn, "RES-003");
        arm_timer(&conn, &timer(id, 0, ts())).unwrap();
        arm_timer(&conn, &timer(id, 1, ts() + Duration::minutes(10))).unwrap();

        assert_eq!(pending_timer_count(&conn).unwrap(), 1);
        let due = due_timers(&conn, &(ts() + Duration::minutes(10))).unwrap();
        assert_eq!(due[0].expected_step, 1);
    }

    #[test]
    fn cancel_removes_timer() {
        let conn = open_memory_database().unwrap();
        let id = seed_alert(&conn, "RES-004");
        arm_timer(&conn, &timer(id, 0, ts())).unwrap();
        cancel_timer(&conn, &id).unwrap();

        assert_eq!(pending_timer_count(&conn).unwrap(), 0);
    }

    #[test]
    fn cancel_missing_timer_is_ok() {
        let conn = open_memory_database().unwrap();
        assert!(cancel_timer(&conn, &Uuid::new_v4()).is_ok());
    }

    #[test]
    fn due_timers_ordered_oldest_first() {
        let conn = open_memory_database().unwrap();
        let a = seed_alert(&conn, "RES-005");
        let b = seed_alert(&conn, "RES-006");
        arm_timer(&conn, &timer(a, 0, ts() + Duration::minutes(2))).unwrap();
        arm_timer(&conn, &timer(b, 0, ts() + Duration::minutes(1))).unwrap();

        let due = due_timers(&conn, &(ts() + Duration::minutes(5))).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].alert_id, b);
        assert_eq!(due[1].alert_id, a);
    }
}

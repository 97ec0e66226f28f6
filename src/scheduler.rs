//! Escalation scheduler — drives timed step transitions.
//!
//! Timers live in the `escalation_timers` table, not in memory, so a crash
//! between arming and firing loses nothing: on startup the first poll pass
//! reconciles by firing everything already overdue. Cancellation on
//! acknowledgment is best-effort; the engine's expected-step re-check makes
//! a late firing a safe no-op.
//!
//! Spawns a background thread that polls for due timers. One firing calls
//! `advance_on_timeout(alert_id, expected_step)` exactly as armed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;

use crate::db::repository::{cancel_timer, due_timers, pending_timer_count};
use crate::db::sqlite::open_database;
use crate::engine::{AdvanceOutcome, AlertEngine, EngineError};

/// Poll interval for due timers.
const POLL_INTERVAL_SECS: u64 = 5;

/// Sleep granularity for shutdown responsiveness (1 second).
const SLEEP_GRANULARITY_SECS: u64 = 1;

/// Handle for the background escalation scheduler thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on `Drop`.
pub struct SchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request graceful shutdown. The current poll pass (if running) will
    /// complete, but no new pass will start.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the escalation scheduler on a separate thread.
///
/// The thread owns its own database connection; the first pass runs
/// immediately so overdue timers from a previous process fire at once.
pub fn start_scheduler(engine: Arc<AlertEngine>, db_path: PathBuf) -> SchedulerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        let conn = match open_database(&db_path) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Escalation scheduler failed to open database");
                return;
            }
        };

        match pending_timer_count(&conn) {
            Ok(pending) if pending > 0 => {
                tracing::info!(pending, "Reconciling escalation timers from previous run");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to count pending timers"),
        }

        tracing::info!("Escalation scheduler started (poll every {POLL_INTERVAL_SECS}s)");
        scheduler_loop(&conn, &engine, &flag);
    });

    SchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn scheduler_loop(conn: &Connection, engine: &AlertEngine, shutdown: &AtomicBool) {
    loop {
        if let Err(e) = run_due_timers(conn, engine) {
            tracing::error!(error = %e, "Escalation timer pass failed");
        }

        // Sleep in small increments for responsive shutdown
        for _ in 0..(POLL_INTERVAL_SECS / SLEEP_GRANULARITY_SECS) {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("Escalation scheduler shutting down");
                return;
            }
            std::thread::sleep(Duration::from_secs(SLEEP_GRANULARITY_SECS));
        }
    }
}

/// Fire every due timer once. Returns how many firings actually advanced
/// or exhausted an alert (stale firings are skipped silently).
pub fn run_due_timers(conn: &Connection, engine: &AlertEngine) -> Result<u32, EngineError> {
    let now = chrono::Utc::now().naive_utc();
    let due = due_timers(conn, &now)?;

    let mut fired = 0;
    for timer in due {
        match engine.advance_on_timeout(conn, &timer.alert_id, timer.expected_step) {
            Ok(AdvanceOutcome::Advanced(step)) => {
                tracing::info!(alert_id = %timer.alert_id, step, "Escalation timer fired");
                fired += 1;
            }
            Ok(AdvanceOutcome::Exhausted) => {
                fired += 1;
            }
            Ok(AdvanceOutcome::Stale) => {}
            Err(EngineError::AlertNotFound { .. }) => {
                // Timer row outlived its alert; drop it so it stops firing.
                tracing::error!(alert_id = %timer.alert_id, "Timer for missing alert removed");
                cancel_timer(conn, &timer.alert_id)?;
            }
            Err(e) => {
                tracing::error!(
                    alert_id = %timer.alert_id,
                    error = %e,
                    "Timer firing failed; will retry next pass"
                );
            }
        }
    }
    Ok(fired)
}

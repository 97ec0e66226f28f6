//! SQLite repositories for alert state and the durable timer store.
//!
//! All mutation of alert rows goes through these functions; state
//! transitions carry the caller's expected row version so concurrent
//! writers cannot overwrite each other (see `engine`).

pub mod alert;
pub mod timer;

pub use alert::*;
pub use timer::*;

use chrono::NaiveDateTime;

use super::DatabaseError;

/// Timestamp storage format used across all tables.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// A stored timestamp that fails to parse is corruption, surfaced as an
/// error rather than substituted with a default.
pub(crate) fn parse_ts(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp '{s}': {e}")))
}

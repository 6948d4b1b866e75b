//! Timestamp formatting shared by the registry, document stamps, and the
//! change log. The format sorts lexicographically, which the change-log
//! timestamp filter relies on.

use chrono::{DateTime, Utc};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The current UTC instant in the persisted format.
pub fn now_stamp() -> String {
  stamp(Utc::now())
}

/// Render an instant in the persisted format.
pub fn stamp(at: DateTime<Utc>) -> String {
  at.format(TIMESTAMP_FORMAT).to_string()
}

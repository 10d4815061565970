use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to whole milliseconds.
///
/// Millisecond precision keeps the RFC 3339 form short and stable across a
/// serialize/parse cycle (`2026-10-17T09:30:00.123Z`).
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

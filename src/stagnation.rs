use chrono::{DateTime, Duration, Utc};

pub const STAGNATION_THRESHOLD_DAYS: i64 = 4;

/// Reported by `stagnation_days` when a student has no activity signal at all.
pub const NO_ACTIVITY_DAYS: i64 = 999;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

fn is_stale(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - at >= Duration::days(STAGNATION_THRESHOLD_DAYS)
}

/// A student is stagnant unless at least one activity signal is both present and
/// younger than the threshold. No signal at all counts as stagnant.
pub fn is_stagnant(
    last_login_at: Option<DateTime<Utc>>,
    last_todo_update_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let recent = |at: Option<DateTime<Utc>>| at.is_some_and(|at| !is_stale(at, now));
    !(recent(last_login_at) || recent(last_todo_update_at))
}

pub fn stagnation_days(
    last_login_at: Option<DateTime<Utc>>,
    last_todo_update_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    let latest = match (last_login_at, last_todo_update_at) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return NO_ACTIVITY_DAYS,
    };
    (now - latest).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

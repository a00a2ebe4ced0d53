use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    NotStarted,
    InProgress,
    Done,
}

impl TodoStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoCounts {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub progress_rate: i64,
}

/// Percentage of active templates marked done, rounded half up. Zero templates yields 0.
pub fn progress_rate(done: usize, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round() as i64
}

/// Counts one status per active template. Templates without a stored row are
/// passed in as `None` and count as not started.
pub fn tally<I>(statuses: I) -> TodoCounts
where
    I: IntoIterator<Item = Option<TodoStatus>>,
{
    let mut counts = TodoCounts::default();
    for s in statuses {
        counts.total += 1;
        match s.unwrap_or(TodoStatus::NotStarted) {
            TodoStatus::Done => counts.done += 1,
            TodoStatus::InProgress => counts.in_progress += 1,
            TodoStatus::NotStarted => counts.not_started += 1,
        }
    }
    counts.progress_rate = progress_rate(counts.done, counts.total);
    counts
}

pub fn latest<I>(timestamps: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = Option<DateTime<Utc>>>,
{
    timestamps.into_iter().flatten().max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rate_rounds_half_up() {
        assert_eq!(progress_rate(0, 0), 0);
        assert_eq!(progress_rate(1, 3), 33);
        assert_eq!(progress_rate(2, 3), 67);
        assert_eq!(progress_rate(1, 8), 13);
        assert_eq!(progress_rate(5, 5), 100);
    }

    #[test]
    fn missing_rows_count_as_not_started() {
        let counts = tally([
            Some(TodoStatus::Done),
            None,
            Some(TodoStatus::InProgress),
            Some(TodoStatus::Done),
        ]);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.done, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.not_started, 1);
        assert_eq!(counts.progress_rate, 50);
    }

    #[test]
    fn latest_ignores_missing() {
        let a = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 9, 3, 0, 0, 0).unwrap();
        assert_eq!(latest([Some(a), None, Some(b)]), Some(b));
        assert_eq!(latest([None, None]), None);
    }

    #[test]
    fn status_strings() {
        for s in [TodoStatus::NotStarted, TodoStatus::InProgress, TodoStatus::Done] {
            assert_eq!(TodoStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TodoStatus::parse("finished"), None);
    }
}

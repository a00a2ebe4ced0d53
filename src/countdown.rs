use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Priority given to schedule types we do not recognise. Any known type wins over it.
pub const UNKNOWN_PRIORITY: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScheduleType {
    ApplicationMustArrive,
    ApplicationDeadline,
    FirstExam,
    SecondExam,
    Unknown(String),
}

impl ScheduleType {
    pub fn parse(s: &str) -> Self {
        match s {
            "application_must_arrive" => Self::ApplicationMustArrive,
            "application_deadline" => Self::ApplicationDeadline,
            "first_exam" => Self::FirstExam,
            "second_exam" => Self::SecondExam,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ApplicationMustArrive => "application_must_arrive",
            Self::ApplicationDeadline => "application_deadline",
            Self::FirstExam => "first_exam",
            Self::SecondExam => "second_exam",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Admissions run apply -> first exam -> second exam, so earlier stages rank first
    /// even when a later stage falls sooner on the calendar.
    pub fn priority(&self) -> u32 {
        match self {
            Self::ApplicationMustArrive => 1,
            Self::ApplicationDeadline => 2,
            Self::FirstExam => 3,
            Self::SecondExam => 4,
            Self::Unknown(_) => UNKNOWN_PRIORITY,
        }
    }
}

impl From<String> for ScheduleType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ScheduleType> for String {
    fn from(t: ScheduleType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub schedule_type: ScheduleType,
    pub schedule_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextSchedule {
    pub schedule: Schedule,
    pub days_remaining: i64,
    pub is_overdue: bool,
    pub label: String,
}

/// Display text for the countdown. English is the default; `for_locale` picks
/// the table at the presentation boundary.
#[derive(Clone, Copy)]
pub struct Phrases {
    pub not_set: &'static str,
    pub must_arrive: &'static str,
    pub deadline: &'static str,
    pub first_exam: &'static str,
    pub second_exam: &'static str,
    pub unknown: &'static str,
    pub overdue: fn(&str) -> String,
    pub today: fn(&str) -> String,
    pub remaining: fn(&str, i64) -> String,
}

pub const ENGLISH: Phrases = Phrases {
    not_set: "date not set",
    must_arrive: "Application (must arrive)",
    deadline: "Application (postmarked)",
    first_exam: "First exam",
    second_exam: "Second exam",
    unknown: "Schedule",
    overdue: en_overdue,
    today: en_today,
    remaining: en_remaining,
};

pub const JAPANESE: Phrases = Phrases {
    not_set: "日程未設定",
    must_arrive: "出願（必着）",
    deadline: "出願（消印）",
    first_exam: "1次試験",
    second_exam: "2次試験",
    unknown: "日程",
    overdue: ja_overdue,
    today: ja_today,
    remaining: ja_remaining,
};

fn en_overdue(label: &str) -> String {
    format!("{}: overdue", label)
}

fn en_today(label: &str) -> String {
    format!("{}: today", label)
}

fn en_remaining(label: &str, days: i64) -> String {
    format!("{}: {} days remaining", label, days)
}

fn ja_overdue(label: &str) -> String {
    format!("{}：期限超過", label)
}

fn ja_today(label: &str) -> String {
    format!("{}：今日", label)
}

fn ja_remaining(label: &str, days: i64) -> String {
    format!("{}まであと{}日", label, days)
}

impl Phrases {
    pub fn for_locale(locale: &str) -> Self {
        match locale {
            "ja" => JAPANESE,
            _ => ENGLISH,
        }
    }

    fn type_label(&self, schedule_type: &ScheduleType) -> &'static str {
        match schedule_type {
            ScheduleType::ApplicationMustArrive => self.must_arrive,
            ScheduleType::ApplicationDeadline => self.deadline,
            ScheduleType::FirstExam => self.first_exam,
            ScheduleType::SecondExam => self.second_exam,
            ScheduleType::Unknown(_) => self.unknown,
        }
    }
}

pub fn schedule_label_in(
    phrases: &Phrases,
    schedule_type: &ScheduleType,
    description: Option<&str>,
) -> String {
    match description {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => phrases.type_label(schedule_type).to_string(),
    }
}

pub fn days_between(today: NaiveDate, date: NaiveDate) -> i64 {
    date.signed_duration_since(today).num_days()
}

/// Picks the operative milestone: lowest priority rank first, then the smallest
/// `days_remaining`. Overdue entries stay in the running, so among equal types the
/// most overdue one wins. Ties on both keys keep input order.
pub fn select_next_in(
    phrases: &Phrases,
    schedules: &[Schedule],
    today: NaiveDate,
) -> Option<NextSchedule> {
    let (schedule, days_remaining) = schedules
        .iter()
        .map(|s| (s, days_between(today, s.schedule_date)))
        .min_by_key(|(s, days)| (s.schedule_type.priority(), *days))?;

    Some(NextSchedule {
        schedule: schedule.clone(),
        days_remaining,
        is_overdue: days_remaining < 0,
        label: schedule_label_in(
            phrases,
            &schedule.schedule_type,
            schedule.description.as_deref(),
        ),
    })
}

pub fn format_countdown_in(phrases: &Phrases, next: Option<&NextSchedule>) -> String {
    let Some(next) = next else {
        return phrases.not_set.to_string();
    };
    if next.is_overdue {
        return (phrases.overdue)(&next.label);
    }
    if next.days_remaining == 0 {
        return (phrases.today)(&next.label);
    }
    (phrases.remaining)(&next.label, next.days_remaining)
}

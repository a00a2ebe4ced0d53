use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use crate::model::Profile;
use crate::stagnation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardSort {
    Name,
    Progress,
    Update,
}

impl DashboardSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "progress" => Some(Self::Progress),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Progress => "progress",
            Self::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub grade: Option<String>,
    pub progress_rate: i64,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_todo_update_at: Option<DateTime<Utc>>,
    pub is_stagnant: bool,
    pub stagnation_days: i64,
}

impl StudentRow {
    pub fn build(
        profile: &Profile,
        progress_rate: i64,
        last_todo_update_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            grade: profile.grade.clone(),
            progress_rate,
            last_login_at: profile.last_login_at,
            last_todo_update_at,
            is_stagnant: stagnation::is_stagnant(profile.last_login_at, last_todo_update_at, now),
            stagnation_days: stagnation::stagnation_days(
                profile.last_login_at,
                last_todo_update_at,
                now,
            ),
        }
    }

    fn sort_name(&self) -> &str {
        match self.name.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => &self.email,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: usize,
    pub stagnant: usize,
    pub stagnant_rate: i64,
}

pub fn stats(rows: &[StudentRow]) -> DashboardStats {
    let total = rows.len();
    let stagnant = rows.iter().filter(|r| r.is_stagnant).count();
    DashboardStats {
        total,
        stagnant,
        stagnant_rate: crate::progress::progress_rate(stagnant, total),
    }
}

pub fn sort_rows(rows: &mut [StudentRow], sort: DashboardSort) {
    match sort {
        DashboardSort::Name => rows.sort_by(|a, b| {
            a.sort_name()
                .cmp(b.sort_name())
                .then_with(|| a.id.cmp(&b.id))
        }),
        DashboardSort::Progress => rows.sort_by(|a, b| b.progress_rate.cmp(&a.progress_rate)),
        // Students who never updated a TODO go last.
        DashboardSort::Update => rows.sort_by(|a, b| match (a.last_todo_update_at, b.last_todo_update_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
    }
}

/// Applies the stagnant-only filter and the requested order. Stats are taken
/// before filtering so the header numbers stay the same across filters.
pub fn arrange(
    mut rows: Vec<StudentRow>,
    stagnant_only: bool,
    sort: DashboardSort,
) -> (Vec<StudentRow>, DashboardStats) {
    let summary = stats(&rows);
    if stagnant_only {
        rows.retain(|r| r.is_stagnant);
    }
    sort_rows(&mut rows, sort);
    (rows, summary)
}

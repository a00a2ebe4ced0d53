use chrono::FixedOffset;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::clock;
use crate::countdown::{Schedule, ScheduleType};
use crate::model::{parse_input_schema, Profile, Role, Template};
use crate::progress::TodoStatus;

pub const DB_FILE: &str = "portal.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            name TEXT,
            grade TEXT,
            role TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role, is_active)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS todo_templates(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT,
            description TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            input_schema TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_todos(
            student_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            status TEXT NOT NULL,
            last_todo_update_at TEXT,
            updated_at TEXT,
            PRIMARY KEY(student_id, template_id),
            FOREIGN KEY(student_id) REFERENCES profiles(id),
            FOREIGN KEY(template_id) REFERENCES todo_templates(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_todos_template ON student_todos(template_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS todo_responses(
            student_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            responses TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, template_id),
            FOREIGN KEY(student_id) REFERENCES profiles(id),
            FOREIGN KEY(template_id) REFERENCES todo_templates(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admission_programs(
            id TEXT PRIMARY KEY,
            university_name TEXT NOT NULL,
            faculty_name TEXT,
            department_name TEXT,
            admission_method TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS admission_schedules(
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            schedule_type TEXT NOT NULL,
            schedule_date TEXT NOT NULL,
            description TEXT,
            FOREIGN KEY(program_id) REFERENCES admission_programs(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_admission_schedules_program ON admission_schedules(program_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_admissions(
            student_id TEXT PRIMARY KEY,
            faculty TEXT,
            department TEXT,
            method TEXT NOT NULL,
            interests TEXT,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_target_programs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            program_id TEXT NOT NULL,
            priority INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES profiles(id),
            FOREIGN KEY(program_id) REFERENCES admission_programs(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_targets_student ON student_target_programs(student_id, priority)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs(
            id TEXT PRIMARY KEY,
            actor_user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT NOT NULL,
            diff TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(clock::parse_timestamp))
}

const PROFILE_COLUMNS: &str =
    "id, email, name, grade, role, is_active, last_login_at, created_at";

fn profile_from_row(row: &Row) -> rusqlite::Result<Profile> {
    let role: Option<String> = row.get(4)?;
    let is_active: i64 = row.get(5)?;
    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        grade: row.get(3)?,
        role: role.as_deref().and_then(Role::parse),
        is_active: is_active != 0,
        last_login_at: timestamp_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

pub fn load_profile(conn: &Connection, id: &str) -> anyhow::Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS);
    Ok(conn.query_row(&sql, [id], profile_from_row).optional()?)
}

/// All profiles, newest first (admin listing order).
pub fn load_all_profiles(conn: &Connection) -> anyhow::Result<Vec<Profile>> {
    let sql = format!(
        "SELECT {} FROM profiles ORDER BY created_at DESC, id",
        PROFILE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_active_students(conn: &Connection) -> anyhow::Result<Vec<Profile>> {
    let sql = format!(
        "SELECT {} FROM profiles WHERE role = 'student' AND is_active = 1 ORDER BY name, id",
        PROFILE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const TEMPLATE_COLUMNS: &str = "id, title, category, description, sort_order, is_active, input_schema";

fn template_from_row(row: &Row) -> rusqlite::Result<Template> {
    let id: String = row.get(0)?;
    let is_active: i64 = row.get(5)?;
    let raw_schema: String = row.get(6)?;
    // Stored schemas were validated on write; a damaged one degrades to no fields.
    let input_schema = match serde_json::from_str::<Value>(&raw_schema)
        .map_err(|e| e.to_string())
        .and_then(|v| parse_input_schema(&v))
    {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!(template = %id, "ignoring unreadable input schema: {e}");
            Vec::new()
        }
    };
    Ok(Template {
        id,
        title: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        sort_order: row.get(4)?,
        is_active: is_active != 0,
        input_schema,
    })
}

pub fn load_template(conn: &Connection, id: &str) -> anyhow::Result<Option<Template>> {
    let sql = format!("SELECT {} FROM todo_templates WHERE id = ?", TEMPLATE_COLUMNS);
    Ok(conn.query_row(&sql, [id], template_from_row).optional()?)
}

pub fn load_templates(conn: &Connection, active_only: bool) -> anyhow::Result<Vec<Template>> {
    let sql = format!(
        "SELECT {} FROM todo_templates {} ORDER BY sort_order, id",
        TEMPLATE_COLUMNS,
        if active_only { "WHERE is_active = 1" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], template_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct TodoRow {
    pub status: Option<TodoStatus>,
    pub last_todo_update_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<String>,
}

/// The student's stored TODO rows keyed by template id.
pub fn load_student_todos(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<HashMap<String, TodoRow>> {
    let mut stmt = conn.prepare(
        "SELECT template_id, status, last_todo_update_at, updated_at
         FROM student_todos
         WHERE student_id = ?",
    )?;
    let rows = stmt
        .query_map([student_id], |row| {
            let template_id: String = row.get(0)?;
            let status: String = row.get(1)?;
            Ok((
                template_id,
                TodoRow {
                    status: TodoStatus::parse(&status),
                    last_todo_update_at: timestamp_column(row, 2)?,
                    updated_at: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

/// Responses keyed by template id. Unreadable payloads are skipped.
pub fn load_student_responses(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<HashMap<String, Value>> {
    let mut stmt =
        conn.prepare("SELECT template_id, responses FROM todo_responses WHERE student_id = ?")?;
    let rows = stmt
        .query_map([student_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(tid, raw)| serde_json::from_str(&raw).ok().map(|v| (tid, v)))
        .collect())
}

/// Schedules for one program in stored date order. Rows whose date cannot be read
/// are dropped with a warning; selection never sees them.
pub fn load_program_schedules(
    conn: &Connection,
    program_id: &str,
    offset: FixedOffset,
) -> anyhow::Result<Vec<Schedule>> {
    let mut stmt = conn.prepare(
        "SELECT id, schedule_type, schedule_date, description
         FROM admission_schedules
         WHERE program_id = ?
         ORDER BY schedule_date, id",
    )?;
    let raw = stmt
        .query_map([program_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(raw.len());
    for (id, schedule_type, date, description) in raw {
        let Some(schedule_date) = clock::parse_calendar_date(&date, offset) else {
            tracing::warn!(schedule = %id, date = %date, "skipping schedule with unreadable date");
            continue;
        };
        out.push(Schedule {
            id,
            schedule_type: ScheduleType::parse(&schedule_type),
            schedule_date,
            description,
        });
    }
    Ok(out)
}

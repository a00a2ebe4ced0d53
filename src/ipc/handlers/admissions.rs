use crate::clock::{self, Clock};
use crate::countdown::{self, Phrases};
use crate::db;
use crate::ipc::error::{respond, PortalError};
use crate::ipc::handlers::settings;
use crate::ipc::helpers::{
    conn, opt_i64_param, opt_text_param, require_actor, str_param, text_param,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

const TARGET_STATUSES: [&str; 4] = ["considering", "applied", "accepted", "rejected"];

fn parse_target_status(raw: Option<String>, fallback: &str) -> Result<String, PortalError> {
    let status = raw.unwrap_or_else(|| fallback.to_string());
    if !TARGET_STATUSES.contains(&status.as_str()) {
        return Err(PortalError::Validation(format!(
            "status must be one of: {}",
            TARGET_STATUSES.join(", ")
        )));
    }
    Ok(status)
}

fn parse_priority(raw: Option<i64>) -> Result<Option<i64>, PortalError> {
    match raw {
        Some(p) if !(1..=99).contains(&p) => Err(PortalError::Validation(
            "priority must be in 1..=99".into(),
        )),
        other => Ok(other),
    }
}

pub fn load_admission(conn: &Connection, student_id: &str) -> anyhow::Result<Value> {
    let row = conn
        .query_row(
            "SELECT faculty, department, method, interests, updated_at
             FROM student_admissions WHERE student_id = ?",
            [student_id],
            |r| {
                Ok(json!({
                    "faculty": r.get::<_, Option<String>>(0)?,
                    "department": r.get::<_, Option<String>>(1)?,
                    "method": r.get::<_, String>(2)?,
                    "interests": r.get::<_, Option<String>>(3)?,
                    "updatedAt": r.get::<_, Option<String>>(4)?,
                }))
            },
        )
        .optional()?;
    Ok(row.unwrap_or(Value::Null))
}

/// Every target of one student, by priority, each with its schedules, the
/// operative next milestone and the countdown text.
pub fn student_targets(
    conn: &Connection,
    student_id: &str,
    clock: &Clock,
    phrases: &Phrases,
) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.priority, t.status, p.id, p.university_name, p.faculty_name,
                p.department_name, p.admission_method
         FROM student_target_programs t
         JOIN admission_programs p ON p.id = t.program_id
         WHERE t.student_id = ?
         ORDER BY t.priority, t.created_at, t.id",
    )?;
    let targets = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                json!({
                    "id": r.get::<_, String>(3)?,
                    "universityName": r.get::<_, String>(4)?,
                    "facultyName": r.get::<_, Option<String>>(5)?,
                    "departmentName": r.get::<_, Option<String>>(6)?,
                    "admissionMethod": r.get::<_, Option<String>>(7)?,
                }),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let today = clock.today();
    let mut out = Vec::with_capacity(targets.len());
    for (id, priority, status, program) in targets {
        let program_id = program["id"].as_str().unwrap_or_default().to_string();
        let schedules = db::load_program_schedules(conn, &program_id, clock.offset())?;
        let next = countdown::select_next_in(phrases, &schedules, today);
        let countdown_text = countdown::format_countdown_in(phrases, next.as_ref());
        out.push(json!({
            "id": id,
            "priority": priority,
            "status": status,
            "program": program,
            "schedules": schedules,
            "nextSchedule": next,
            "countdownText": countdown_text,
        }));
    }
    Ok(out)
}

fn handle_admissions_get(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let clock = state.clock;
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let phrases = settings::phrases(conn)?;
    Ok(json!({
        "admission": load_admission(conn, &student.id)?,
        "targets": student_targets(conn, &student.id, &clock, &phrases)?,
        "today": clock.today().to_string(),
    }))
}

fn handle_admissions_save(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let method = text_param(req, "method")?;
    let faculty = opt_text_param(req, "faculty")?;
    let department = opt_text_param(req, "department")?;
    let interests = opt_text_param(req, "interests")?;

    conn.execute(
        "INSERT INTO student_admissions(student_id, faculty, department, method, interests, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           faculty = excluded.faculty,
           department = excluded.department,
           method = excluded.method,
           interests = excluded.interests,
           updated_at = excluded.updated_at",
        (
            &student.id,
            &faculty,
            &department,
            &method,
            &interests,
            clock::format_timestamp(now),
        ),
    )
    .map_err(PortalError::save)?;
    tracing::info!(student = %student.id, "admission profile saved");
    Ok(json!({ "admission": load_admission(conn, &student.id)? }))
}

fn handle_programs_list(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let offset = state.clock.offset();
    let conn = conn(state)?;
    require_actor(conn, req, &[Role::Student, Role::Teacher, Role::Admin])?;
    let mut stmt = conn.prepare(
        "SELECT id, university_name, faculty_name, department_name, admission_method
         FROM admission_programs
         ORDER BY university_name, faculty_name, department_name, id",
    )?;
    let programs = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "universityName": r.get::<_, String>(1)?,
                "facultyName": r.get::<_, Option<String>>(2)?,
                "departmentName": r.get::<_, Option<String>>(3)?,
                "admissionMethod": r.get::<_, Option<String>>(4)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(programs.len());
    for mut p in programs {
        let id = p["id"].as_str().unwrap_or_default().to_string();
        p["schedules"] = json!(db::load_program_schedules(conn, &id, offset)?);
        out.push(p);
    }
    Ok(json!({ "programs": out }))
}

fn program_exists(conn: &Connection, program_id: &str) -> Result<bool, PortalError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM admission_programs WHERE id = ?",
            [program_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn owned_target(conn: &Connection, req: &Request, student_id: &str) -> Result<String, PortalError> {
    let target_id = str_param(req, "targetId")?;
    let owner: Option<String> = conn
        .query_row(
            "SELECT student_id FROM student_target_programs WHERE id = ?",
            [target_id],
            |r| r.get(0),
        )
        .optional()?;
    match owner {
        Some(o) if o == student_id => Ok(target_id.to_string()),
        Some(_) => Err(PortalError::denied("target belongs to another student")),
        None => Err(PortalError::NotFound("target")),
    }
}

fn handle_targets_add(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let program_id = text_param(req, "programId")?;
    if !program_exists(conn, &program_id)? {
        return Err(PortalError::NotFound("program"));
    }
    let priority = parse_priority(opt_i64_param(req, "priority")?)?.unwrap_or(1);
    let status = parse_target_status(opt_text_param(req, "status")?, "considering")?;

    let target_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO student_target_programs(id, student_id, program_id, priority, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &target_id,
            &student.id,
            &program_id,
            priority,
            &status,
            clock::format_timestamp(now),
        ),
    )
    .map_err(PortalError::save)?;
    tracing::info!(student = %student.id, program = %program_id, "target program added");
    Ok(json!({ "targetId": target_id, "priority": priority, "status": status }))
}

fn handle_targets_update(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let target_id = owned_target(conn, req, &student.id)?;
    let priority = parse_priority(opt_i64_param(req, "priority")?)?;
    let status = match opt_text_param(req, "status")? {
        Some(s) => Some(parse_target_status(Some(s), "considering")?),
        None => None,
    };
    if priority.is_none() && status.is_none() {
        return Err(PortalError::bad("nothing to update"));
    }

    conn.execute(
        "UPDATE student_target_programs
         SET priority = COALESCE(?, priority), status = COALESCE(?, status)
         WHERE id = ?",
        (priority, &status, &target_id),
    )
    .map_err(PortalError::save)?;
    Ok(json!({ "targetId": target_id }))
}

fn handle_targets_delete(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let target_id = owned_target(conn, req, &student.id)?;
    conn.execute(
        "DELETE FROM student_target_programs WHERE id = ?",
        [&target_id],
    )
    .map_err(PortalError::save)?;
    tracing::info!(student = %student.id, target = %target_id, "target program removed");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "admissions.get" => handle_admissions_get(state, req),
        "admissions.save" => handle_admissions_save(state, req),
        "admissions.programs.list" => handle_programs_list(state, req),
        "admissions.targets.add" => handle_targets_add(state, req),
        "admissions.targets.update" => handle_targets_update(state, req),
        "admissions.targets.delete" => handle_targets_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

use crate::audit::{self, AuditEntry};
use crate::clock;
use crate::countdown::ScheduleType;
use crate::db;
use crate::ipc::error::{respond, PortalError};
use crate::ipc::handlers::settings;
use crate::ipc::helpers::{
    conn, opt_bool_param, opt_i64_param, opt_text_param, require_actor, str_param, text_param,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_input_schema, InputField, Profile, Role, Template};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 500;

fn handle_users_list(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    require_actor(conn, req, &[Role::Admin])?;
    let filter = opt_text_param(req, "filter")?;
    let wanted: Option<Option<Role>> = match filter.as_deref() {
        None | Some("all") => None,
        Some("pending") => Some(None),
        Some(other) => match Role::parse(other) {
            Some(r) => Some(Some(r)),
            None => {
                return Err(PortalError::bad(
                    "filter must be one of: all, pending, student, teacher, admin",
                ))
            }
        },
    };

    let users = db::load_all_profiles(conn)?;
    let count = |role: Option<Role>| users.iter().filter(|u| u.role == role).count();
    let counts = json!({
        "total": users.len(),
        "pending": count(None),
        "student": count(Some(Role::Student)),
        "teacher": count(Some(Role::Teacher)),
        "admin": count(Some(Role::Admin)),
    });
    let listed: Vec<&Profile> = users
        .iter()
        .filter(|u| wanted.map_or(true, |role| u.role == role))
        .collect();

    Ok(json!({
        "users": listed,
        "counts": counts,
        "filter": filter.as_deref().unwrap_or("all"),
    }))
}

/// `role` absent keeps the current role; `null` or `""` puts the account back
/// into the approval queue.
fn role_param(req: &Request) -> Result<Option<Option<Role>>, PortalError> {
    match req.params.get("role") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(None)),
        Some(Value::String(s)) => Role::parse(s.trim())
            .map(|r| Some(Some(r)))
            .ok_or_else(|| {
                PortalError::Validation("role must be one of: student, teacher, admin".into())
            }),
        Some(_) => Err(PortalError::bad("role must be a string")),
    }
}

fn handle_users_update(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let admin = require_actor(conn, req, &[Role::Admin])?;
    let user_id = str_param(req, "userId")?;
    let Some(old) = db::load_profile(conn, user_id)? else {
        return Err(PortalError::NotFound("user"));
    };
    let new_role = role_param(req)?.unwrap_or(old.role);
    let new_active = opt_bool_param(req, "isActive")?.unwrap_or(old.is_active);

    let was_active_admin = old.role == Some(Role::Admin) && old.is_active;
    let stays_active_admin = new_role == Some(Role::Admin) && new_active;
    if was_active_admin && !stays_active_admin && other_active_admins(conn, &old.id)? == 0 {
        return Err(PortalError::denied(
            "the workspace must keep at least one active admin",
        ));
    }

    conn.execute(
        "UPDATE profiles SET role = ?, is_active = ?, updated_at = ? WHERE id = ?",
        (
            new_role.map(Role::as_str),
            new_active as i64,
            clock::format_timestamp(now),
            &old.id,
        ),
    )
    .map_err(PortalError::save)?;

    if old.role != new_role {
        audit::record(
            conn,
            &AuditEntry::role_change(&admin.id, &old.id, old.role, new_role),
            now,
        );
    }
    if old.is_active != new_active {
        audit::record(
            conn,
            &AuditEntry::status_change(&admin.id, &old.id, old.is_active, new_active),
            now,
        );
    }
    tracing::info!(
        admin = %admin.id,
        user = %old.id,
        role = new_role.map(Role::as_str).unwrap_or("pending"),
        active = new_active,
        "user updated"
    );

    let Some(updated) = db::load_profile(conn, &old.id)? else {
        return Err(PortalError::NotFound("user"));
    };
    Ok(json!({ "user": updated }))
}

fn handle_templates_list(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    require_actor(conn, req, &[Role::Admin])?;
    Ok(json!({ "templates": db::load_templates(conn, false)? }))
}

/// Accepts the schema as JSON text (as typed into a form) or as an array.
fn input_schema_param(req: &Request) -> Result<Option<Vec<InputField>>, PortalError> {
    let raw = match req.params.get("inputSchema") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => json!([]),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text)
            .map_err(|e| PortalError::InvalidJson(e.to_string()))?,
        Some(v) => v.clone(),
    };
    parse_input_schema(&raw)
        .map(Some)
        .map_err(PortalError::Validation)
}

fn valid_template_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn next_sort_order(conn: &Connection) -> Result<i64, PortalError> {
    let max: Option<i64> = conn.query_row("SELECT MAX(sort_order) FROM todo_templates", [], |r| {
        r.get(0)
    })?;
    Ok(max.unwrap_or(0) + 1)
}

fn write_template(
    conn: &Connection,
    t: &Template,
    now: DateTime<Utc>,
    insert: bool,
) -> rusqlite::Result<usize> {
    let schema = serde_json::to_string(&t.input_schema)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let at = clock::format_timestamp(now);
    if insert {
        conn.execute(
            "INSERT INTO todo_templates(id, title, category, description, sort_order, is_active, input_schema, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &t.id,
                &t.title,
                &t.category,
                &t.description,
                t.sort_order,
                t.is_active as i64,
                &schema,
                &at,
            ),
        )
    } else {
        conn.execute(
            "UPDATE todo_templates
             SET title = ?, category = ?, description = ?, sort_order = ?, is_active = ?,
                 input_schema = ?, updated_at = ?
             WHERE id = ?",
            (
                &t.title,
                &t.category,
                &t.description,
                t.sort_order,
                t.is_active as i64,
                &schema,
                &at,
                &t.id,
            ),
        )
    }
}

/// Gives every active student of the configured grade a `not_started` row for a
/// new template. Failures are logged; the template itself stays created.
fn auto_assign(conn: &Connection, template_id: &str, now: DateTime<Utc>) -> usize {
    let policy = match settings::auto_assign(conn) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(template = %template_id, "cannot read auto-assign settings: {e:?}");
            return 0;
        }
    };
    if !policy.enabled {
        return 0;
    }
    let res = conn.execute(
        "INSERT OR IGNORE INTO student_todos(student_id, template_id, status, updated_at)
         SELECT id, ?, 'not_started', ?
         FROM profiles
         WHERE role = 'student' AND grade = ? AND is_active = 1",
        (template_id, clock::format_timestamp(now), &policy.grade),
    );
    match res {
        Ok(n) => {
            tracing::info!(template = %template_id, grade = %policy.grade, students = n, "todos auto-assigned");
            n
        }
        Err(e) => {
            tracing::error!(template = %template_id, "failed to auto-assign todos: {e}");
            0
        }
    }
}

fn handle_templates_create(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let admin = require_actor(conn, req, &[Role::Admin])?;
    let id = text_param(req, "id")?;
    if !valid_template_id(&id) {
        return Err(PortalError::Validation(
            "id may only contain lowercase letters, digits and hyphens".into(),
        ));
    }
    let title = text_param(req, "title")?;
    let input_schema = input_schema_param(req)?.unwrap_or_default();
    if db::load_template(conn, &id)?.is_some() {
        return Err(PortalError::DuplicateId(id));
    }
    let sort_order = match opt_i64_param(req, "sortOrder")? {
        Some(n) => n,
        None => next_sort_order(conn)?,
    };

    let template = Template {
        id,
        title,
        category: opt_text_param(req, "category")?,
        description: opt_text_param(req, "description")?,
        sort_order,
        is_active: true,
        input_schema,
    };
    write_template(conn, &template, now, true).map_err(PortalError::save)?;
    audit::record(conn, &AuditEntry::template_create(&admin.id, &template), now);
    let assigned = auto_assign(conn, &template.id, now);

    Ok(json!({ "template": template, "assignedCount": assigned }))
}

fn handle_templates_update(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let admin = require_actor(conn, req, &[Role::Admin])?;
    let template_id = str_param(req, "templateId")?;
    let Some(old) = db::load_template(conn, template_id)? else {
        return Err(PortalError::TemplateNotFound);
    };

    let mut new = old.clone();
    if req.params.get("title").is_some() {
        new.title = text_param(req, "title")?;
    }
    if req.params.get("category").is_some() {
        new.category = opt_text_param(req, "category")?;
    }
    if req.params.get("description").is_some() {
        new.description = opt_text_param(req, "description")?;
    }
    if let Some(n) = opt_i64_param(req, "sortOrder")? {
        new.sort_order = n;
    }
    if let Some(active) = opt_bool_param(req, "isActive")? {
        new.is_active = active;
    }
    if let Some(schema) = input_schema_param(req)? {
        new.input_schema = schema;
    }

    write_template(conn, &new, now, false).map_err(PortalError::save)?;
    audit::record(conn, &AuditEntry::template_update(&admin.id, &old, &new), now);
    tracing::info!(admin = %admin.id, template = %new.id, "template updated");
    Ok(json!({ "template": new }))
}

fn handle_templates_delete(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let admin = require_actor(conn, req, &[Role::Admin])?;
    let template_id = str_param(req, "templateId")?;
    let Some(template) = db::load_template(conn, template_id)? else {
        return Err(PortalError::TemplateNotFound);
    };

    let tx = conn.unchecked_transaction().map_err(PortalError::save)?;
    tx.execute(
        "DELETE FROM todo_responses WHERE template_id = ?",
        [&template.id],
    )
    .map_err(PortalError::save)?;
    let removed_todos = tx
        .execute("DELETE FROM student_todos WHERE template_id = ?", [&template.id])
        .map_err(PortalError::save)?;
    tx.execute("DELETE FROM todo_templates WHERE id = ?", [&template.id])
        .map_err(PortalError::save)?;
    tx.commit().map_err(PortalError::save)?;

    audit::record(conn, &AuditEntry::template_delete(&admin.id, &template), now);
    tracing::info!(admin = %admin.id, template = %template.id, removed_todos, "template deleted");
    Ok(json!({ "ok": true, "removedTodos": removed_todos }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleInput {
    id: Option<String>,
    schedule_type: String,
    schedule_date: String,
    description: Option<String>,
}

fn handle_programs_upsert(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let offset = state.clock.offset();
    let conn = conn(state)?;
    let admin = require_actor(conn, req, &[Role::Admin])?;
    let program_id = text_param(req, "id")?;
    let university = text_param(req, "universityName")?;
    let faculty = opt_text_param(req, "facultyName")?;
    let department = opt_text_param(req, "departmentName")?;
    let method = opt_text_param(req, "admissionMethod")?;
    let schedules: Vec<ScheduleInput> = match req.params.get("schedules") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| PortalError::bad(format!("invalid schedules: {}", e)))?,
    };

    let mut rows = Vec::with_capacity(schedules.len());
    for s in schedules {
        let Some(date) = clock::parse_calendar_date(&s.schedule_date, offset) else {
            return Err(PortalError::Validation(format!(
                "scheduleDate is not a date: {}",
                s.schedule_date
            )));
        };
        let kind = ScheduleType::parse(&s.schedule_type);
        if !kind.is_known() {
            tracing::warn!(program = %program_id, schedule_type = %s.schedule_type, "unknown schedule type stored");
        }
        rows.push((
            s.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            kind,
            date,
            s.description,
        ));
    }

    let tx = conn.unchecked_transaction().map_err(PortalError::save)?;
    tx.execute(
        "INSERT INTO admission_programs(id, university_name, faculty_name, department_name, admission_method)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           university_name = excluded.university_name,
           faculty_name = excluded.faculty_name,
           department_name = excluded.department_name,
           admission_method = excluded.admission_method",
        (&program_id, &university, &faculty, &department, &method),
    )
    .map_err(PortalError::save)?;
    tx.execute(
        "DELETE FROM admission_schedules WHERE program_id = ?",
        [&program_id],
    )
    .map_err(PortalError::save)?;
    for (id, kind, date, description) in &rows {
        tx.execute(
            "INSERT INTO admission_schedules(id, program_id, schedule_type, schedule_date, description)
             VALUES(?, ?, ?, ?, ?)",
            (
                id,
                &program_id,
                kind.as_str(),
                date.format("%Y-%m-%d").to_string(),
                description,
            ),
        )
        .map_err(PortalError::save)?;
    }
    tx.commit().map_err(PortalError::save)?;

    tracing::info!(admin = %admin.id, program = %program_id, schedules = rows.len(), "program saved");
    Ok(json!({
        "programId": program_id,
        "schedules": db::load_program_schedules(conn, &program_id, offset)?,
    }))
}

fn handle_audit_list(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    require_actor(conn, req, &[Role::Admin])?;
    let limit = opt_i64_param(req, "limit")?
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    Ok(json!({ "entries": audit::recent(conn, limit as usize)? }))
}

fn other_active_admins(conn: &Connection, except_id: &str) -> Result<i64, PortalError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = 'admin' AND is_active = 1 AND id <> ?",
        [except_id],
        |r| r.get(0),
    )?)
}

const BOOTSTRAP_KEY: &str = "bootstrap.done";

/// First-run path: makes a signed-in account admin. Allowed once per workspace,
/// and never while any admin row exists.
fn handle_bootstrap(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let user_id = str_param(req, "actorId")?;
    if db::settings_get_json(conn, BOOTSTRAP_KEY)?.is_some() {
        return Err(PortalError::denied("workspace was already bootstrapped"));
    }
    let admins: i64 = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = 'admin'",
        [],
        |r| r.get(0),
    )?;
    if admins > 0 {
        return Err(PortalError::denied("workspace already has an admin"));
    }
    let Some(profile) = db::load_profile(conn, user_id)? else {
        return Err(PortalError::denied("unknown actor"));
    };

    let at = clock::format_timestamp(now);
    let tx = conn.unchecked_transaction().map_err(PortalError::save)?;
    tx.execute(
        "UPDATE profiles SET role = 'admin', is_active = 1, updated_at = ? WHERE id = ?",
        (&at, &profile.id),
    )
    .map_err(PortalError::save)?;
    db::settings_set_json(&tx, BOOTSTRAP_KEY, &json!({ "userId": profile.id, "at": at }))
        .map_err(PortalError::save)?;
    tx.commit().map_err(PortalError::save)?;

    audit::record(
        conn,
        &AuditEntry::role_change(&profile.id, &profile.id, profile.role, Some(Role::Admin)),
        now,
    );
    if !profile.is_active {
        audit::record(
            conn,
            &AuditEntry::status_change(&profile.id, &profile.id, false, true),
            now,
        );
    }
    tracing::warn!(user = %profile.id, "first admin bootstrapped");
    Ok(json!({ "userId": profile.id, "role": "admin" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "admin.bootstrap" => handle_bootstrap(state, req),
        "admin.users.list" => handle_users_list(state, req),
        "admin.users.update" => handle_users_update(state, req),
        "admin.templates.list" => handle_templates_list(state, req),
        "admin.templates.create" => handle_templates_create(state, req),
        "admin.templates.update" => handle_templates_update(state, req),
        "admin.templates.delete" => handle_templates_delete(state, req),
        "admin.programs.upsert" => handle_programs_upsert(state, req),
        "admin.audit.list" => handle_audit_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

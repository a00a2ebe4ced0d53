use crate::clock;
use crate::db;
use crate::ipc::error::{respond, PortalError};
use crate::ipc::helpers::{conn, require_actor, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, Template};
use crate::progress::{self, TodoStatus};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

/// Active templates joined with one student's status and responses, plus totals.
/// Shared with the teacher's student view.
pub fn student_todo_overview(
    conn: &Connection,
    student_id: &str,
    with_responses: bool,
) -> anyhow::Result<Value> {
    let templates = db::load_templates(conn, true)?;
    let rows = db::load_student_todos(conn, student_id)?;
    let responses = if with_responses {
        db::load_student_responses(conn, student_id)?
    } else {
        Default::default()
    };

    let counts = progress::tally(
        templates
            .iter()
            .map(|t| rows.get(&t.id).and_then(|r| r.status)),
    );
    let last_update = progress::latest(rows.values().map(|r| r.last_todo_update_at));

    let todos: Vec<Value> = templates
        .iter()
        .map(|t| {
            let row = rows.get(&t.id);
            let mut item = json!({
                "templateId": t.id,
                "title": t.title,
                "category": t.category,
                "description": t.description,
                "sortOrder": t.sort_order,
                "status": row
                    .and_then(|r| r.status)
                    .unwrap_or(TodoStatus::NotStarted),
                "updatedAt": row.and_then(|r| r.updated_at.clone()),
                "lastTodoUpdateAt": row.and_then(|r| r.last_todo_update_at),
            });
            if with_responses {
                item["inputSchema"] = json!(t.input_schema);
                item["responses"] = responses.get(&t.id).cloned().unwrap_or_else(|| json!({}));
            }
            item
        })
        .collect();

    Ok(json!({
        "todos": todos,
        "counts": counts,
        "lastTodoUpdateAt": last_update,
    }))
}

fn handle_todos_list(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let mut overview = student_todo_overview(conn, &student.id, false)?;
    let open: Vec<Value> = overview["todos"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|t| t["status"] != "done")
                .map(|t| t["templateId"].clone())
                .collect()
        })
        .unwrap_or_default();
    overview["openTemplateIds"] = Value::Array(open);
    Ok(overview)
}

fn active_template(conn: &Connection, req: &Request) -> Result<Template, PortalError> {
    let template_id = str_param(req, "templateId")?;
    match db::load_template(conn, template_id)? {
        Some(t) if t.is_active => Ok(t),
        _ => Err(PortalError::TemplateNotFound),
    }
}

fn handle_todos_get(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let template = active_template(conn, req)?;
    let row = db::load_student_todos(conn, &student.id)?.remove(&template.id);
    let responses = db::load_student_responses(conn, &student.id)?
        .remove(&template.id)
        .unwrap_or_else(|| json!({}));

    Ok(json!({
        "template": template,
        "status": row.as_ref().and_then(|r| r.status).unwrap_or(TodoStatus::NotStarted),
        "updatedAt": row.as_ref().and_then(|r| r.updated_at.clone()),
        "lastTodoUpdateAt": row.as_ref().and_then(|r| r.last_todo_update_at),
        "responses": responses,
    }))
}

/// Keeps only answers for fields the template declares. Finishing a TODO
/// requires every required field to be filled in.
fn collect_responses(
    template: &Template,
    raw: Option<&Value>,
    status: TodoStatus,
) -> Result<Map<String, Value>, PortalError> {
    let empty = Map::new();
    let given = match raw {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(m)) => m,
        Some(_) => return Err(PortalError::bad("responses must be an object")),
    };

    let mut kept = Map::new();
    for (key, value) in given {
        let Some(text) = value.as_str() else {
            return Err(PortalError::bad(format!("response {} must be a string", key)));
        };
        if template.input_schema.iter().any(|f| &f.field_key == key) {
            kept.insert(key.clone(), Value::String(text.to_string()));
        } else {
            tracing::debug!(template = %template.id, field = %key, "dropping undeclared response field");
        }
    }

    if status == TodoStatus::Done {
        let missing: Vec<&str> = template
            .input_schema
            .iter()
            .filter(|f| f.required)
            .filter(|f| {
                kept.get(&f.field_key)
                    .and_then(|v| v.as_str())
                    .map(|s| s.trim().is_empty())
                    .unwrap_or(true)
            })
            .map(|f| f.field_key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PortalError::Validation(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(kept)
}

fn handle_todos_save(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let template = active_template(conn, req)?;
    let status_raw = str_param(req, "status")?;
    let Some(status) = TodoStatus::parse(status_raw) else {
        return Err(PortalError::Validation(format!(
            "status must be one of: not_started, in_progress, done (got {})",
            status_raw
        )));
    };
    let responses = collect_responses(&template, req.params.get("responses"), status)?;
    let at = clock::format_timestamp(now);

    let tx = conn.unchecked_transaction().map_err(PortalError::save)?;
    tx.execute(
        "INSERT INTO student_todos(student_id, template_id, status, last_todo_update_at, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, template_id) DO UPDATE SET
           status = excluded.status,
           last_todo_update_at = excluded.last_todo_update_at,
           updated_at = excluded.updated_at",
        (&student.id, &template.id, status.as_str(), &at, &at),
    )
    .map_err(PortalError::save)?;
    tx.execute(
        "INSERT INTO todo_responses(student_id, template_id, responses, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, template_id) DO UPDATE SET
           responses = excluded.responses,
           updated_at = excluded.updated_at",
        (
            &student.id,
            &template.id,
            Value::Object(responses.clone()).to_string(),
            &at,
        ),
    )
    .map_err(PortalError::save)?;
    tx.commit().map_err(PortalError::save)?;

    tracing::info!(
        student = %student.id,
        template = %template.id,
        status = status.as_str(),
        "todo saved"
    );
    Ok(json!({
        "templateId": template.id,
        "status": status,
        "lastTodoUpdateAt": at,
        "responses": responses,
    }))
}

fn handle_home_summary(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let student = require_actor(conn, req, &[Role::Student])?;
    let overview = student_todo_overview(conn, &student.id, false)?;
    Ok(json!({
        "displayName": student.display_name(),
        "grade": student.grade,
        "counts": overview["counts"],
        "lastTodoUpdateAt": overview["lastTodoUpdateAt"],
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "todos.list" => handle_todos_list(state, req),
        "todos.get" => handle_todos_get(state, req),
        "todos.save" => handle_todos_save(state, req),
        "home.summary" => handle_home_summary(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

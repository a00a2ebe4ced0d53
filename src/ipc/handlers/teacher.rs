use crate::clock;
use crate::dashboard::{self, DashboardSort, StudentRow};
use crate::db;
use crate::ipc::error::{respond, PortalError};
use crate::ipc::handlers::{admissions, settings, todos};
use crate::ipc::helpers::{conn, opt_text_param, require_actor, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::progress;
use crate::stagnation;
use serde_json::{json, Value};

fn handle_dashboard(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let teacher = require_actor(conn, req, &[Role::Teacher])?;

    let stagnant_only = match opt_text_param(req, "filter")?.as_deref() {
        None | Some("all") => false,
        Some("stagnant") => true,
        Some(other) => {
            return Err(PortalError::bad(format!(
                "filter must be all or stagnant (got {})",
                other
            )))
        }
    };
    let sort = match opt_text_param(req, "sort")? {
        Some(s) => DashboardSort::parse(&s)
            .ok_or_else(|| PortalError::bad("sort must be one of: name, progress, update"))?,
        None => settings::default_sort(conn)?,
    };

    let template_ids: Vec<String> = db::load_templates(conn, true)?
        .into_iter()
        .map(|t| t.id)
        .collect();
    let students = db::load_active_students(conn)?;
    let mut rows = Vec::with_capacity(students.len());
    for student in &students {
        let todos = db::load_student_todos(conn, &student.id)?;
        let counts = progress::tally(
            template_ids
                .iter()
                .map(|id| todos.get(id).and_then(|r| r.status)),
        );
        let last_update = progress::latest(todos.values().map(|r| r.last_todo_update_at));
        rows.push(StudentRow::build(student, counts.progress_rate, last_update, now));
    }

    let (rows, stats) = dashboard::arrange(rows, stagnant_only, sort);
    let filter = if stagnant_only { "stagnant" } else { "all" };
    tracing::debug!(
        teacher = %teacher.id,
        students = stats.total,
        stagnant = stats.stagnant,
        "dashboard built"
    );
    Ok(json!({
        "students": rows,
        "stats": stats,
        "filter": filter,
        "sort": sort.as_str(),
    }))
}

fn handle_student_get(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let clock = state.clock;
    let now = clock.now();
    let conn = conn(state)?;
    require_actor(conn, req, &[Role::Teacher])?;
    let student_id = str_param(req, "studentId")?;
    let student = match db::load_profile(conn, student_id)? {
        Some(p) if p.role == Some(Role::Student) => p,
        _ => return Err(PortalError::NotFound("student")),
    };

    let overview = todos::student_todo_overview(conn, &student.id, true)?;
    let last_update = overview["lastTodoUpdateAt"]
        .as_str()
        .and_then(clock::parse_timestamp);
    let phrases = settings::phrases(conn)?;

    Ok(json!({
        "student": student,
        "todos": overview["todos"],
        "counts": overview["counts"],
        "lastTodoUpdateAt": overview["lastTodoUpdateAt"],
        "isStagnant": stagnation::is_stagnant(student.last_login_at, last_update, now),
        "stagnationDays": stagnation::stagnation_days(student.last_login_at, last_update, now),
        "admission": admissions::load_admission(conn, &student.id)?,
        "targets": admissions::student_targets(conn, &student.id, &clock, &phrases)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "teacher.dashboard" => handle_dashboard(state, req),
        "teacher.student.get" => handle_student_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

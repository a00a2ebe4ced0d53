use crate::clock;
use crate::db;
use crate::ipc::error::{respond, PortalError};
use crate::ipc::helpers::{conn, opt_text_param, require_profile, str_param, text_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{Profile, Role};
use serde_json::{json, Value};

/// Where the UI should send this account next.
fn next_step(profile: &Profile) -> &'static str {
    if profile.needs_setup() {
        "profile_setup"
    } else if profile.role.is_none() {
        "pending"
    } else {
        "home"
    }
}

fn handle_profiles_upsert(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let id = text_param(req, "id")?;
    let email = str_param(req, "email")?.trim().to_string();
    let name = opt_text_param(req, "name")?;

    // Role and activation belong to admins; sign-in only refreshes identity fields
    // and never overwrites a name the user already chose.
    conn.execute(
        "INSERT INTO profiles(id, email, name, is_active, created_at)
         VALUES(?, ?, ?, 1, ?)
         ON CONFLICT(id) DO UPDATE SET
           email = excluded.email,
           name = COALESCE(profiles.name, excluded.name)",
        (&id, &email, &name, clock::format_timestamp(now)),
    )
    .map_err(PortalError::save)?;

    let Some(profile) = db::load_profile(conn, &id)? else {
        return Err(PortalError::NotFound("profile"));
    };
    tracing::info!(profile = %id, "profile upserted from sign-in");
    Ok(json!({ "profile": profile, "next": next_step(&profile) }))
}

fn handle_session_touch(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let profile = require_profile(conn, req)?;
    let at = clock::format_timestamp(now);
    conn.execute(
        "UPDATE profiles SET last_login_at = ? WHERE id = ?",
        (&at, &profile.id),
    )
    .map_err(PortalError::save)?;
    tracing::debug!(profile = %profile.id, "login recorded");
    Ok(json!({ "lastLoginAt": at, "next": next_step(&profile) }))
}

fn handle_profile_get(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let profile = require_profile(conn, req)?;
    let next = next_step(&profile);
    Ok(json!({ "profile": profile, "next": next }))
}

fn handle_profile_setup(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let now = state.clock.now();
    let conn = conn(state)?;
    let profile = require_profile(conn, req)?;
    let name = text_param(req, "name")?;
    let grade = opt_text_param(req, "grade")?;
    if profile.role == Some(Role::Student) && grade.is_none() {
        return Err(PortalError::Validation("grade is required for students".into()));
    }

    conn.execute(
        "UPDATE profiles SET name = ?, grade = ?, updated_at = ? WHERE id = ?",
        (&name, &grade, clock::format_timestamp(now), &profile.id),
    )
    .map_err(PortalError::save)?;

    let Some(updated) = db::load_profile(conn, &profile.id)? else {
        return Err(PortalError::NotFound("profile"));
    };
    Ok(json!({ "profile": updated, "next": next_step(&updated) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "profiles.upsert" => handle_profiles_upsert(state, req),
        "session.touch" => handle_session_touch(state, req),
        "profile.get" => handle_profile_get(state, req),
        "profile.setup" => handle_profile_setup(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

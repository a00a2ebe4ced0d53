use rusqlite::Connection;
use serde_json::Value;

use crate::db;
use crate::ipc::error::PortalError;
use crate::ipc::types::{AppState, Request};
use crate::model::{Profile, Role};

pub fn conn(state: &AppState) -> Result<&Connection, PortalError> {
    state.db.as_ref().ok_or(PortalError::NoWorkspace)
}

pub fn str_param<'a>(req: &'a Request, key: &str) -> Result<&'a str, PortalError> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| PortalError::bad(format!("missing {}", key)))
}

/// Required, trimmed, non-empty string.
pub fn text_param(req: &Request, key: &str) -> Result<String, PortalError> {
    let v = str_param(req, key)?.trim();
    if v.is_empty() {
        return Err(PortalError::Validation(format!("{} must not be empty", key)));
    }
    Ok(v.to_string())
}

/// Optional string; blank values are stored as NULL.
pub fn opt_text_param(req: &Request, key: &str) -> Result<Option<String>, PortalError> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
        Some(_) => Err(PortalError::bad(format!("{} must be a string", key))),
    }
}

pub fn opt_bool_param(req: &Request, key: &str) -> Result<Option<bool>, PortalError> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| PortalError::bad(format!("{} must be boolean", key))),
    }
}

pub fn opt_i64_param(req: &Request, key: &str) -> Result<Option<i64>, PortalError> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| PortalError::bad(format!("{} must be integer", key))),
    }
}

/// The calling account, as handed over by the auth layer. Must exist and be active.
pub fn require_profile(conn: &Connection, req: &Request) -> Result<Profile, PortalError> {
    let actor_id = str_param(req, "actorId")?;
    let Some(profile) = db::load_profile(conn, actor_id)? else {
        return Err(PortalError::denied("unknown actor"));
    };
    if !profile.is_active {
        return Err(PortalError::denied("account is deactivated"));
    }
    Ok(profile)
}

/// Page gate: complete profile, approved role, and a role the method allows.
pub fn require_actor(
    conn: &Connection,
    req: &Request,
    allowed: &[Role],
) -> Result<Profile, PortalError> {
    let profile = require_profile(conn, req)?;
    if profile.needs_setup() {
        return Err(PortalError::ProfileSetupRequired);
    }
    let Some(role) = profile.role else {
        return Err(PortalError::PendingApproval);
    };
    if !allowed.contains(&role) {
        return Err(PortalError::denied(format!(
            "{} cannot call {}",
            role.as_str(),
            req.method
        )));
    }
    Ok(profile)
}

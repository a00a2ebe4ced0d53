use crate::countdown::Phrases;
use crate::dashboard::DashboardSort;
use crate::db;
use crate::ipc::error::{respond, PortalError};
use crate::ipc::helpers::{conn, require_actor};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SettingsSection {
    Display,
    Todos,
    Dashboard,
}

const ALL_SECTIONS: [SettingsSection; 3] = [
    SettingsSection::Display,
    SettingsSection::Todos,
    SettingsSection::Dashboard,
];

impl SettingsSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "display" => Some(Self::Display),
            "todos" => Some(Self::Todos),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Todos => "todos",
            Self::Dashboard => "dashboard",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Display => "settings.display",
            Self::Todos => "settings.todos",
            Self::Dashboard => "settings.dashboard",
        }
    }
}

fn default_section(section: SettingsSection) -> Value {
    match section {
        SettingsSection::Display => json!({
            "locale": "en"
        }),
        SettingsSection::Todos => json!({
            "autoAssignOnCreate": true,
            "autoAssignGrade": "高2"
        }),
        SettingsSection::Dashboard => json!({
            "defaultSort": "name"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal settings object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SettingsSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SettingsSection::Display => match k.as_str() {
                "locale" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    if s != "en" && s != "ja" {
                        return Err("locale must be one of: en, ja".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown display field: {}", k)),
            },
            SettingsSection::Todos => match k.as_str() {
                "autoAssignOnCreate" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "autoAssignGrade" => {
                    let s = parse_string_max(v, k, 32)?;
                    if s.is_empty() {
                        return Err("autoAssignGrade must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown todos field: {}", k)),
            },
            SettingsSection::Dashboard => match k.as_str() {
                "defaultSort" => {
                    let s = parse_string_max(v, k, 16)?.to_ascii_lowercase();
                    if DashboardSort::parse(&s).is_none() {
                        return Err("defaultSort must be one of: name, progress, update".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown dashboard field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SettingsSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed saved value must not block reads.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), "ignoring saved settings: {e}");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

/// Phrase table for countdown text, from `display.locale`.
pub fn phrases(conn: &rusqlite::Connection) -> anyhow::Result<Phrases> {
    let display = load_section(conn, SettingsSection::Display)?;
    Ok(Phrases::for_locale(
        display.get("locale").and_then(|v| v.as_str()).unwrap_or("en"),
    ))
}

pub struct AutoAssign {
    pub enabled: bool,
    pub grade: String,
}

pub fn auto_assign(conn: &rusqlite::Connection) -> anyhow::Result<AutoAssign> {
    let todos = load_section(conn, SettingsSection::Todos)?;
    Ok(AutoAssign {
        enabled: todos
            .get("autoAssignOnCreate")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        grade: todos
            .get("autoAssignGrade")
            .and_then(|v| v.as_str())
            .unwrap_or("高2")
            .to_string(),
    })
}

pub fn default_sort(conn: &rusqlite::Connection) -> anyhow::Result<DashboardSort> {
    let dashboard = load_section(conn, SettingsSection::Dashboard)?;
    Ok(dashboard
        .get("defaultSort")
        .and_then(|v| v.as_str())
        .and_then(DashboardSort::parse)
        .unwrap_or(DashboardSort::Name))
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    require_actor(conn, req, &[Role::Admin])?;
    let mut out = Map::new();
    for section in ALL_SECTIONS {
        out.insert(section.name().to_string(), load_section(conn, section)?);
    }
    Ok(Value::Object(out))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> Result<Value, PortalError> {
    let conn = conn(state)?;
    let actor = require_actor(conn, req, &[Role::Admin])?;
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return Err(PortalError::bad("missing section"));
    };
    let Some(section) = SettingsSection::parse(section_raw) else {
        return Err(PortalError::bad("unknown section"));
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(PortalError::bad("patch must be an object"));
    };

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(PortalError::Validation)?;
    db::settings_set_json(conn, section.key(), &current).map_err(PortalError::save)?;
    tracing::info!(section = section.name(), actor = %actor.id, "settings updated");
    Ok(json!({ "section": section.name(), "values": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "settings.get" => Some(respond(&req.id, handle_settings_get(state, req))),
        "settings.update" => Some(respond(&req.id, handle_settings_update(state, req))),
        _ => None,
    }
}

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::clock;
use crate::model::{Role, Template};

pub const TARGET_PROFILES: &str = "profiles";
pub const TARGET_TEMPLATES: &str = "todo_templates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RoleChange,
    StatusChange,
    TemplateCreate,
    TemplateUpdate,
    TemplateDelete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoleChange => "ROLE_CHANGE",
            Self::StatusChange => "STATUS_CHANGE",
            Self::TemplateCreate => "TEMPLATE_CREATE",
            Self::TemplateUpdate => "TEMPLATE_UPDATE",
            Self::TemplateDelete => "TEMPLATE_DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor_user_id: String,
    pub action: AuditAction,
    pub target_type: &'static str,
    pub target_id: String,
    pub diff: Option<Value>,
}

fn template_fields(t: &Template) -> Value {
    json!({
        "title": t.title,
        "category": t.category,
        "description": t.description,
        "sort_order": t.sort_order,
        "is_active": t.is_active,
    })
}

impl AuditEntry {
    pub fn role_change(actor: &str, user_id: &str, old: Option<Role>, new: Option<Role>) -> Self {
        Self {
            actor_user_id: actor.to_string(),
            action: AuditAction::RoleChange,
            target_type: TARGET_PROFILES,
            target_id: user_id.to_string(),
            diff: Some(json!({
                "old_role": old.map(Role::as_str),
                "new_role": new.map(Role::as_str),
            })),
        }
    }

    pub fn status_change(actor: &str, user_id: &str, old_active: bool, new_active: bool) -> Self {
        Self {
            actor_user_id: actor.to_string(),
            action: AuditAction::StatusChange,
            target_type: TARGET_PROFILES,
            target_id: user_id.to_string(),
            diff: Some(json!({
                "old_is_active": old_active,
                "new_is_active": new_active,
            })),
        }
    }

    pub fn template_create(actor: &str, t: &Template) -> Self {
        let mut diff = template_fields(t);
        diff["input_schema"] = json!(t.input_schema);
        Self {
            actor_user_id: actor.to_string(),
            action: AuditAction::TemplateCreate,
            target_type: TARGET_TEMPLATES,
            target_id: t.id.clone(),
            diff: Some(diff),
        }
    }

    pub fn template_update(actor: &str, old: &Template, new: &Template) -> Self {
        Self {
            actor_user_id: actor.to_string(),
            action: AuditAction::TemplateUpdate,
            target_type: TARGET_TEMPLATES,
            target_id: new.id.clone(),
            diff: Some(json!({
                "old": template_fields(old),
                "new": template_fields(new),
            })),
        }
    }

    pub fn template_delete(actor: &str, t: &Template) -> Self {
        Self {
            actor_user_id: actor.to_string(),
            action: AuditAction::TemplateDelete,
            target_type: TARGET_TEMPLATES,
            target_id: t.id.clone(),
            diff: Some(template_fields(t)),
        }
    }
}

/// Writes one audit row. Failures are logged and swallowed: an audit hiccup
/// must not undo the change it describes.
pub fn record(conn: &Connection, entry: &AuditEntry, at: DateTime<Utc>) {
    let diff = entry.diff.as_ref().map(|d| d.to_string());
    let res = conn.execute(
        "INSERT INTO audit_logs(id, actor_user_id, action, target_type, target_id, diff, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &entry.actor_user_id,
            entry.action.as_str(),
            entry.target_type,
            &entry.target_id,
            diff,
            clock::format_timestamp(at),
        ),
    );
    match res {
        Ok(_) => tracing::debug!(
            action = entry.action.as_str(),
            target = %entry.target_id,
            "audit entry recorded"
        ),
        Err(e) => tracing::error!(
            action = entry.action.as_str(),
            target = %entry.target_id,
            "failed to record audit entry: {e}"
        ),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuditEntry {
    pub id: String,
    pub actor_user_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub diff: Option<Value>,
    pub created_at: String,
}

/// Newest first.
pub fn recent(conn: &Connection, limit: usize) -> anyhow::Result<Vec<StoredAuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, actor_user_id, action, target_type, target_id, diff, created_at
         FROM audit_logs
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            let diff: Option<String> = row.get(5)?;
            Ok(StoredAuditEntry {
                id: row.get(0)?,
                actor_user_id: row.get(1)?,
                action: row.get(2)?,
                target_type: row.get(3)?,
                target_id: row.get(4)?,
                diff: diff.and_then(|d| serde_json::from_str(&d).ok()),
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

/// A portal account. `role == None` means the account is waiting for an admin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub grade: Option<String>,
    pub role: Option<Role>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: Option<String>,
}

fn blank(v: &Option<String>) -> bool {
    v.as_deref().map(str::trim).unwrap_or("").is_empty()
}

impl Profile {
    /// Students need a name and a grade; everyone else only a name.
    pub fn needs_setup(&self) -> bool {
        match self.role {
            Some(Role::Student) => blank(&self.name) || blank(&self.grade),
            _ => blank(&self.name),
        }
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => &self.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub field_key: String,
    pub display_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
}

fn default_field_type() -> String {
    "text".to_string()
}

/// Validates a template input schema: a JSON array of field objects with
/// unique, non-empty `field_key`s.
pub fn parse_input_schema(raw: &Value) -> Result<Vec<InputField>, String> {
    let Some(items) = raw.as_array() else {
        return Err("input schema must be a JSON array".into());
    };
    let mut fields: Vec<InputField> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let field: InputField = serde_json::from_value(item.clone())
            .map_err(|e| format!("input schema item {}: {}", i, e))?;
        if field.field_key.trim().is_empty() {
            return Err(format!("input schema item {}: field_key must not be empty", i));
        }
        if fields.iter().any(|f| f.field_key == field.field_key) {
            return Err(format!("duplicate field_key: {}", field.field_key));
        }
        fields.push(field);
    }
    Ok(fields)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub input_schema: Vec<InputField>,
}

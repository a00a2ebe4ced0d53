use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failures a portal handler can report. `code()` is the stable wire code the
/// UI maps to a message.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("{0}")]
    BadParams(String),
    #[error("{0}")]
    Validation(String),
    #[error("complete your profile first")]
    ProfileSetupRequired,
    #[error("account is waiting for approval")]
    PendingApproval,
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("template not found")]
    TemplateNotFound,
    #[error("input schema is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("id already in use: {0}")]
    DuplicateId(String),
    #[error("save failed: {0}")]
    SaveFailed(String),
    #[error(transparent)]
    Query(#[from] anyhow::Error),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl PortalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWorkspace => "no_workspace",
            Self::BadParams(_) => "bad_params",
            Self::Validation(_) => "validation_error",
            Self::ProfileSetupRequired => "profile_setup_required",
            Self::PendingApproval => "pending_approval",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::TemplateNotFound => "template_not_found",
            Self::InvalidJson(_) => "invalid_json",
            Self::DuplicateId(_) => "duplicate_id",
            Self::SaveFailed(_) => "save_failed",
            Self::Query(_) | Self::Sql(_) => "db_query_failed",
        }
    }

    pub fn save(e: impl std::fmt::Display) -> Self {
        Self::SaveFailed(e.to_string())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn bad(msg: impl Into<String>) -> Self {
        Self::BadParams(msg.into())
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, PortalError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            match &e {
                PortalError::Query(_) | PortalError::Sql(_) | PortalError::SaveFailed(_) => {
                    tracing::error!(code = e.code(), "request {id} failed: {e}")
                }
                _ => tracing::debug!(code = e.code(), "request {id} rejected: {e}"),
            }
            err(id, e.code(), e.to_string(), None)
        }
    }
}

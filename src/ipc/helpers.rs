use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::model::{self, Activity, User};
use crate::permissions::{self, Action};
use crate::session::{self, TokenError};
use crate::store::{Collection, DuplicateId, Store};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

/// Handler-internal failure, turned into the wire error envelope at the edge.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }

    /// Error-object form for per-item outcomes in bulk operations.
    pub fn as_json(&self) -> Value {
        json!({ "code": self.code, "message": self.message })
    }
}

pub fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr::new("bad_params", message)
}

pub fn not_found(message: impl Into<String>) -> HandlerErr {
    HandlerErr::new("not_found", message)
}

pub fn forbidden() -> HandlerErr {
    HandlerErr::new("forbidden", "you are not allowed to perform this action")
}

/// Storage write failures keep their own code; duplicate ids get a typed one.
pub fn write_failed(e: anyhow::Error) -> HandlerErr {
    if e.downcast_ref::<DuplicateId>().is_some() {
        HandlerErr::new("duplicate_id", e.to_string())
    } else {
        HandlerErr::new("db_write_failed", e.to_string())
    }
}

pub fn require_store(state: &AppState) -> Result<&Store, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn required_str_array(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let raw = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| bad_params(format!("missing {}", key)))?;
    raw.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| bad_params(format!("{} must be an array of strings", key)))
        })
        .collect()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resolve the acting user from the `token` param (falling back to the
/// token of the last in-process login). Token and user problems each map to
/// their own wire code so callers never pattern-match on message text.
pub fn resolve_actor(state: &AppState, params: &Value) -> Result<User, HandlerErr> {
    let store = require_store(state)?;
    let token = optional_str(params, "token")
        .or_else(|| state.session.clone())
        .ok_or_else(|| HandlerErr::new("missing_token", "authentication token required"))?;
    let secret = store
        .session_secret()
        .map_err(|e| HandlerErr::new("db_read_failed", e.to_string()))?;
    let session = session::decode(&token, &secret, Utc::now().timestamp_millis()).map_err(
        |e| match e {
            TokenError::Expired => HandlerErr::new("token_expired", e.to_string()),
            TokenError::Malformed | TokenError::BadSignature => {
                HandlerErr::new("malformed_token", e.to_string())
            }
        },
    )?;
    let raw = store
        .find(Collection::Users, &session.user_id)
        .ok_or_else(|| not_found("user for this session no longer exists"))?;
    serde_json::from_value(raw)
        .map_err(|e| HandlerErr::new("db_read_failed", format!("stored user is invalid: {e}")))
}

pub fn require_permission(
    actor: &User,
    action: Action,
    resource: Option<&Activity>,
) -> Result<(), HandlerErr> {
    if permissions::allows(Some(actor), action, resource) {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// Append a notification record for `user_id`. Used by the workflows that
/// notify on activity status changes.
pub fn notify(
    store: &Store,
    user_id: &str,
    title: &str,
    message: String,
    kind: &str,
) -> Result<(), HandlerErr> {
    let record = json!({
        "id": new_id(),
        "userId": user_id,
        "title": title,
        "message": message,
        "type": kind,
        "read": false,
        "createdAt": now_rfc3339(),
    });
    store
        .add(Collection::Notifications, record)
        .map_err(write_failed)
}

/// Outbound user records always drop the stored password.
pub fn public_user(raw: Value) -> Value {
    model::strip_password(raw)
}

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, new_id, not_found, now_rfc3339, optional_str, public_user, require_store,
    required_str, resolve_actor, write_failed, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, User};
use crate::session;
use crate::store::Collection;
use chrono::Utc;
use serde_json::{json, Value};

fn mint_token(state: &AppState, user_id: &str) -> Result<String, HandlerErr> {
    let store = require_store(state)?;
    let secret = store
        .session_secret()
        .map_err(|e| HandlerErr::new("db_read_failed", e.to_string()))?;
    Ok(session::issue(
        user_id,
        Utc::now().timestamp_millis(),
        &secret,
    ))
}

fn login(state: &AppState, params: &Value) -> Result<(Value, String), HandlerErr> {
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;
    let store = require_store(state)?;

    // Plaintext comparison against the seeded table; this is demo scope by
    // contract, not an oversight.
    let matched = store
        .typed::<User>(Collection::Users)
        .into_iter()
        .find(|u| u.email == email && u.password.as_deref() == Some(password.as_str()))
        .ok_or_else(|| HandlerErr::new("invalid_credentials", "invalid email or password"))?;

    let token = mint_token(state, &matched.id)?;
    let user = public_user(serde_json::to_value(&matched).map_err(|e| {
        HandlerErr::new("db_read_failed", format!("stored user is invalid: {e}"))
    })?);
    Ok((user, token))
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    match login(state, &req.params) {
        Ok((user, token)) => {
            state.session = Some(token.clone());
            ok(&req.id, json!({ "user": user, "token": token }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn register(state: &AppState, params: &Value) -> Result<(Value, String), HandlerErr> {
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;
    let name = required_str(params, "name")?;
    let role_str = required_str(params, "role")?;
    if email.trim().is_empty() || password.is_empty() || name.trim().is_empty() {
        return Err(bad_params("email, password and name must not be empty"));
    }
    let role: Role = serde_json::from_value(Value::String(role_str))
        .map_err(|_| bad_params("role must be 'student' or 'faculty'"))?;
    if role == Role::Admin {
        return Err(bad_params("role must be 'student' or 'faculty'"));
    }

    let store = require_store(state)?;
    let taken = store
        .typed::<User>(Collection::Users)
        .into_iter()
        .any(|u| u.email == email);
    if taken {
        return Err(HandlerErr::new("conflict", "email is already registered"));
    }

    let user = User {
        id: new_id(),
        email,
        password: Some(password),
        name,
        role,
        student_id: optional_str(params, "studentId"),
        department: optional_str(params, "department"),
        semester: params.get("semester").and_then(Value::as_i64),
        avatar: None,
        created_at: now_rfc3339(),
    };
    let record = serde_json::to_value(&user)
        .map_err(|e| HandlerErr::new("db_write_failed", e.to_string()))?;
    store.add(Collection::Users, record.clone()).map_err(write_failed)?;

    let token = mint_token(state, &user.id)?;
    Ok((public_user(record), token))
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    match register(state, &req.params) {
        Ok((user, token)) => {
            state.session = Some(token.clone());
            ok(&req.id, json!({ "user": user, "token": token }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_whoami(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let store = match require_store(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    match store.find(Collection::Users, &actor.id) {
        Some(raw) => ok(&req.id, json!({ "user": public_user(raw) })),
        None => not_found("user no longer exists").response(&req.id),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    // There is no server-side session list to invalidate; dropping the local
    // artifact is the whole operation.
    let cleared = state.session.take().is_some();
    ok(&req.id, json!({ "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.register" => Some(handle_register(state, req)),
        "auth.whoami" => Some(handle_whoami(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, not_found, public_user, require_permission, require_store, required_str,
    resolve_actor, write_failed,
};
use crate::ipc::types::{AppState, Request};
use crate::permissions::Action;
use crate::store::Collection;
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let users: Vec<Value> = store
        .collection(Collection::Users)
        .into_iter()
        .map(public_user)
        .collect();
    let total = users.len();
    ok(&req.id, json!({ "users": users, "total": total }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let id = required_str(&req.params, "id")?;
        store
            .find(Collection::Users, &id)
            .map(public_user)
            .ok_or_else(|| not_found("user not found"))
    });
    match out {
        Ok(user) => ok(&req.id, json!({ "user": user })),
        Err(e) => e.response(&req.id),
    }
}

/// Users may edit their own profile; changing someone else, or touching
/// role/email/password, needs the admin capability.
fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let id = required_str(&req.params, "id")?;
        let mut patch = req
            .params
            .get("patch")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| bad_params("missing patch object"))?;
        for key in ["id", "createdAt"] {
            patch.remove(key);
        }

        let touches_privileged = ["role", "email", "password"]
            .iter()
            .any(|k| patch.contains_key(*k));
        if actor.id != id || touches_privileged {
            require_permission(&actor, Action::ManageUsers, None)?;
        }

        let updated = store
            .update(Collection::Users, &id, &Value::Object(patch))
            .map_err(write_failed)?
            .ok_or_else(|| not_found("user not found"))?;
        Ok(public_user(updated))
    });
    match out {
        Ok(user) => ok(&req.id, json!({ "user": user })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_list(state, req)),
        "users.get" => Some(handle_get(state, req)),
        "users.update" => Some(handle_update(state, req)),
        _ => None,
    }
}

use crate::ipc::error::ok;
use crate::ipc::helpers::{not_found, require_store, required_str, resolve_actor, write_failed};
use crate::ipc::types::{AppState, Request};
use crate::store::Collection;
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let events = store.collection(Collection::Events);
    let total = events.len();
    ok(&req.id, json!({ "events": events, "total": total }))
}

/// Registrations are recorded on the event itself. Registering twice is a
/// no-op rather than an error.
fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let event_id = required_str(&req.params, "eventId")?;
        let event = store
            .find(Collection::Events, &event_id)
            .ok_or_else(|| not_found("event not found"))?;
        let mut registrations: Vec<Value> = event
            .get("registrations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let already = registrations
            .iter()
            .any(|r| r.as_str() == Some(actor.id.as_str()));
        if !already {
            registrations.push(Value::String(actor.id.clone()));
            store
                .update(
                    Collection::Events,
                    &event_id,
                    &json!({ "registrations": registrations }),
                )
                .map_err(write_failed)?;
        }
        Ok(already)
    });
    match out {
        Ok(already) => ok(&req.id, json!({ "registered": true, "alreadyRegistered": already })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.list" => Some(handle_list(state, req)),
        "events.register" => Some(handle_register(state, req)),
        _ => None,
    }
}

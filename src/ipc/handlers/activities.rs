use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, new_id, not_found, notify, now_rfc3339, optional_str, require_permission,
    require_store, required_str, required_str_array, resolve_actor, write_failed, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Activity, ActivityStatus, Role, User};
use crate::permissions::Action;
use crate::store::{Collection, Store};
use serde_json::{json, Value};

/// Fields the generic update path must never touch: identity, ownership and
/// everything owned by the approval workflow.
const PROTECTED_FIELDS: [&str; 8] = [
    "id",
    "studentId",
    "status",
    "points",
    "approvedBy",
    "approvedAt",
    "rejectionReason",
    "createdAt",
];

fn load_typed(store: &Store, id: &str) -> Result<Activity, HandlerErr> {
    let raw = store
        .find(Collection::Activities, id)
        .ok_or_else(|| not_found("activity not found"))?;
    serde_json::from_value(raw).map_err(|e| {
        HandlerErr::new("db_read_failed", format!("stored activity is invalid: {e}"))
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = optional_str(&req.params, "studentId");
    let activities: Vec<Value> = store
        .collection(Collection::Activities)
        .into_iter()
        .filter(|a| match &student_id {
            Some(sid) => a.get("studentId").and_then(Value::as_str) == Some(sid.as_str()),
            None => true,
        })
        .collect();
    let total = activities.len();
    ok(&req.id, json!({ "activities": activities, "total": total }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let id = match required_str(&req.params, "id") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store.find(Collection::Activities, &id) {
        Some(activity) => ok(&req.id, json!({ "activity": activity })),
        None => not_found("activity not found").response(&req.id),
    }
}

fn handle_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let query = optional_str(&req.params, "query")
        .unwrap_or_default()
        .to_lowercase();
    let category = optional_str(&req.params, "category");
    let status = optional_str(&req.params, "status");
    let student_id = optional_str(&req.params, "studentId");

    let field = |a: &Value, key: &str| {
        a.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    };
    let activities: Vec<Value> = store
        .collection(Collection::Activities)
        .into_iter()
        .filter(|a| {
            query.is_empty()
                || field(a, "title").contains(&query)
                || field(a, "description").contains(&query)
                || field(a, "category").contains(&query)
        })
        .filter(|a| match &category {
            Some(c) => a.get("category").and_then(Value::as_str) == Some(c.as_str()),
            None => true,
        })
        .filter(|a| match &status {
            Some(s) => a.get("status").and_then(Value::as_str) == Some(s.as_str()),
            None => true,
        })
        .filter(|a| match &student_id {
            Some(sid) => a.get("studentId").and_then(Value::as_str) == Some(sid.as_str()),
            None => true,
        })
        .collect();
    let total = activities.len();
    ok(&req.id, json!({ "activities": activities, "total": total }))
}

fn create(state: &AppState, actor: &User, params: &Value) -> Result<Value, HandlerErr> {
    require_permission(actor, Action::SubmitActivity, None)?;
    let store = require_store(state)?;

    let mut obj = params
        .get("activity")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| bad_params("missing activity object"))?;

    // Students always submit for themselves; only admins may file on behalf
    // of another student.
    let owner = match obj.get("studentId").and_then(Value::as_str) {
        Some(sid) if actor.role == Role::Admin => sid.to_string(),
        _ => actor.id.clone(),
    };

    for key in PROTECTED_FIELDS {
        obj.remove(key);
    }
    let now = now_rfc3339();
    obj.insert("id".into(), Value::String(new_id()));
    obj.insert("studentId".into(), Value::String(owner));
    obj.insert("status".into(), json!("pending"));
    obj.insert("createdAt".into(), Value::String(now.clone()));
    obj.insert("updatedAt".into(), Value::String(now));

    // Round-trip through the typed struct to validate enums and required
    // fields, and to normalize the stored shape.
    let typed: Activity = serde_json::from_value(Value::Object(obj))
        .map_err(|e| bad_params(format!("invalid activity: {e}")))?;
    let record = serde_json::to_value(&typed)
        .map_err(|e| HandlerErr::new("db_write_failed", e.to_string()))?;
    store
        .add(Collection::Activities, record.clone())
        .map_err(write_failed)?;
    Ok(record)
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    match create(state, &actor, &req.params) {
        Ok(activity) => ok(&req.id, json!({ "activity": activity })),
        Err(e) => e.response(&req.id),
    }
}

fn update(state: &AppState, actor: &User, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = required_str(params, "id")?;
    let existing = load_typed(store, &id)?;
    require_permission(actor, Action::EditActivity, Some(&existing))?;

    let mut patch = params
        .get("patch")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| bad_params("missing patch object"))?;
    // Status and points move only through the approval workflow.
    for key in PROTECTED_FIELDS {
        patch.remove(key);
    }
    patch.insert("updatedAt".into(), Value::String(now_rfc3339()));

    let updated = store
        .update(Collection::Activities, &id, &Value::Object(patch))
        .map_err(write_failed)?
        .ok_or_else(|| not_found("activity not found"))?;
    Ok(updated)
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    match update(state, &actor, &req.params) {
        Ok(activity) => ok(&req.id, json!({ "activity": activity })),
        Err(e) => e.response(&req.id),
    }
}

fn delete(state: &AppState, actor: &User, params: &Value) -> Result<(), HandlerErr> {
    let store = require_store(state)?;
    let id = required_str(params, "id")?;
    let existing = load_typed(store, &id)?;
    require_permission(actor, Action::DeleteActivity, Some(&existing))?;
    let removed = store
        .remove(Collection::Activities, &id)
        .map_err(write_failed)?;
    if !removed {
        return Err(not_found("activity not found"));
    }
    Ok(())
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    match delete(state, &actor, &req.params) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => e.response(&req.id),
    }
}

/// Approve one pending activity: terminal statuses refuse with `conflict`,
/// points come from the explicit override or the category schedule, and the
/// owning student gets a notification.
fn approve_one(
    store: &Store,
    actor: &User,
    id: &str,
    points_override: Option<i64>,
) -> Result<Value, HandlerErr> {
    let existing = load_typed(store, id)?;
    if existing.status != ActivityStatus::Pending {
        return Err(HandlerErr::new("conflict", "activity is not pending"));
    }
    let points = points_override.unwrap_or_else(|| existing.category.default_points());
    let now = now_rfc3339();
    let patch = json!({
        "status": "approved",
        "approvedBy": actor.id,
        "approvedAt": now,
        "points": points,
        "updatedAt": now,
    });
    let updated = store
        .update(Collection::Activities, id, &patch)
        .map_err(write_failed)?
        .ok_or_else(|| not_found("activity not found"))?;
    notify(
        store,
        &existing.student_id,
        "Activity approved",
        format!(
            "Your activity '{}' was approved. {} points awarded.",
            existing.title, points
        ),
        "success",
    )?;
    Ok(updated)
}

fn reject_one(store: &Store, id: &str, reason: &str) -> Result<Value, HandlerErr> {
    let existing = load_typed(store, id)?;
    if existing.status != ActivityStatus::Pending {
        return Err(HandlerErr::new("conflict", "activity is not pending"));
    }
    let now = now_rfc3339();
    let patch = json!({
        "status": "rejected",
        "rejectionReason": reason,
        "updatedAt": now,
    });
    let updated = store
        .update(Collection::Activities, id, &patch)
        .map_err(write_failed)?
        .ok_or_else(|| not_found("activity not found"))?;
    notify(
        store,
        &existing.student_id,
        "Activity rejected",
        format!("Your activity '{}' was rejected: {}", existing.title, reason),
        "warning",
    )?;
    Ok(updated)
}

fn handle_approve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        require_permission(&actor, Action::ApproveActivity, None)?;
        let id = required_str(&req.params, "id")?;
        let points = req.params.get("points").and_then(Value::as_i64);
        approve_one(store, &actor, &id, points)
    });
    match out {
        Ok(activity) => ok(&req.id, json!({ "activity": activity })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_reject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        require_permission(&actor, Action::RejectActivity, None)?;
        let id = required_str(&req.params, "id")?;
        let reason = required_str(&req.params, "reason")?;
        if reason.trim().is_empty() {
            return Err(bad_params("rejection reason must not be empty"));
        }
        reject_one(store, &id, &reason)
    });
    match out {
        Ok(activity) => ok(&req.id, json!({ "activity": activity })),
        Err(e) => e.response(&req.id),
    }
}

/// Bulk review applies the single-item operation per id and reports a
/// per-item outcome list; one bad id never masks the rest.
fn handle_bulk_approve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        require_permission(&actor, Action::ApproveActivity, None)?;
        let ids = required_str_array(&req.params, "ids")?;
        let points = req.params.get("points").and_then(Value::as_i64);
        let results: Vec<Value> = ids
            .iter()
            .map(|id| match approve_one(store, &actor, id, points) {
                Ok(activity) => json!({ "id": id, "ok": true, "activity": activity }),
                Err(e) => json!({ "id": id, "ok": false, "error": e.as_json() }),
            })
            .collect();
        let approved = results
            .iter()
            .filter(|r| r.get("ok") == Some(&Value::Bool(true)))
            .count();
        Ok(json!({ "results": results, "approved": approved }))
    });
    match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_bulk_reject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        require_permission(&actor, Action::RejectActivity, None)?;
        let ids = required_str_array(&req.params, "ids")?;
        let reason = required_str(&req.params, "reason")?;
        if reason.trim().is_empty() {
            return Err(bad_params("rejection reason must not be empty"));
        }
        let results: Vec<Value> = ids
            .iter()
            .map(|id| match reject_one(store, id, &reason) {
                Ok(activity) => json!({ "id": id, "ok": true, "activity": activity }),
                Err(e) => json!({ "id": id, "ok": false, "error": e.as_json() }),
            })
            .collect();
        let rejected = results
            .iter()
            .filter(|r| r.get("ok") == Some(&Value::Bool(true)))
            .count();
        Ok(json!({ "results": results, "rejected": rejected }))
    });
    match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activities.list" => Some(handle_list(state, req)),
        "activities.get" => Some(handle_get(state, req)),
        "activities.search" => Some(handle_search(state, req)),
        "activities.create" => Some(handle_create(state, req)),
        "activities.update" => Some(handle_update(state, req)),
        "activities.delete" => Some(handle_delete(state, req)),
        "activities.approve" => Some(handle_approve(state, req)),
        "activities.reject" => Some(handle_reject(state, req)),
        "activities.bulkApprove" => Some(handle_bulk_approve(state, req)),
        "activities.bulkReject" => Some(handle_bulk_reject(state, req)),
        _ => None,
    }
}

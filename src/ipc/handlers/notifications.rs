use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, new_id, not_found, now_rfc3339, require_permission, require_store, required_str,
    resolve_actor, write_failed, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Notification, NotificationKind};
use crate::permissions::Action;
use crate::store::Collection;
use serde_json::{json, Value};

fn for_user(items: Vec<Value>, user_id: &str) -> Vec<Value> {
    items
        .into_iter()
        .filter(|n| n.get("userId").and_then(Value::as_str) == Some(user_id))
        .collect()
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let user_id = required_str(&req.params, "userId")?;
        Ok(for_user(store.collection(Collection::Notifications), &user_id))
    });
    match out {
        Ok(notifications) => {
            let total = notifications.len();
            ok(&req.id, json!({ "notifications": notifications, "total": total }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_unread_count(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let user_id = required_str(&req.params, "userId")?;
        let count = for_user(store.collection(Collection::Notifications), &user_id)
            .iter()
            .filter(|n| n.get("read").and_then(Value::as_bool) != Some(true))
            .count();
        Ok(count)
    });
    match out {
        Ok(count) => ok(&req.id, json!({ "count": count })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_mark_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let id = required_str(&req.params, "id")?;
        store
            .update(Collection::Notifications, &id, &json!({ "read": true }))
            .map_err(write_failed)?
            .ok_or_else(|| not_found("notification not found"))
    });
    match out {
        Ok(notification) => ok(&req.id, json!({ "notification": notification })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_mark_all_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let user_id = required_str(&req.params, "userId")?;
        let mut items = store.collection(Collection::Notifications);
        let mut updated = 0usize;
        for n in items.iter_mut() {
            if n.get("userId").and_then(Value::as_str) != Some(user_id.as_str()) {
                continue;
            }
            if let Some(obj) = n.as_object_mut() {
                if obj.get("read").and_then(Value::as_bool) != Some(true) {
                    obj.insert("read".into(), Value::Bool(true));
                    updated += 1;
                }
            }
        }
        store
            .save(Collection::Notifications, &items)
            .map_err(write_failed)?;
        Ok(updated)
    });
    match out {
        Ok(updated) => ok(&req.id, json!({ "updated": updated })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let id = required_str(&req.params, "id")?;
        let removed = store
            .remove(Collection::Notifications, &id)
            .map_err(write_failed)?;
        if !removed {
            return Err(not_found("notification not found"));
        }
        Ok(())
    });
    match out {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_delete_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let user_id = required_str(&req.params, "userId")?;
        let items = store.collection(Collection::Notifications);
        let before = items.len();
        let kept: Vec<Value> = items
            .into_iter()
            .filter(|n| n.get("userId").and_then(Value::as_str) != Some(user_id.as_str()))
            .collect();
        let deleted = before - kept.len();
        store
            .save(Collection::Notifications, &kept)
            .map_err(write_failed)?;
        Ok(deleted)
    });
    match out {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => e.response(&req.id),
    }
}

/// Direct creation is a privileged path; the system-generated notifications
/// from the approval workflow do not come through here.
fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        require_permission(&actor, Action::SendNotification, None)?;
        let raw = req
            .params
            .get("notification")
            .filter(|v| v.is_object())
            .cloned()
            .ok_or_else(|| bad_params("missing notification object"))?;
        let kind: NotificationKind =
            serde_json::from_value(raw.get("type").cloned().unwrap_or(Value::Null))
                .map_err(|_| bad_params("type must be info|success|warning|error"))?;
        let notification = Notification {
            id: new_id(),
            user_id: required_str(&raw, "userId")?,
            title: required_str(&raw, "title")?,
            message: required_str(&raw, "message")?,
            kind,
            read: false,
            created_at: now_rfc3339(),
            action_url: raw
                .get("actionUrl")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        let record = serde_json::to_value(&notification)
            .map_err(|e| HandlerErr::new("db_write_failed", e.to_string()))?;
        store
            .add(Collection::Notifications, record.clone())
            .map_err(write_failed)?;
        Ok(record)
    });
    match out {
        Ok(notification) => ok(&req.id, json!({ "notification": notification })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.list" => Some(handle_list(state, req)),
        "notifications.unreadCount" => Some(handle_unread_count(state, req)),
        "notifications.markRead" => Some(handle_mark_read(state, req)),
        "notifications.markAllRead" => Some(handle_mark_all_read(state, req)),
        "notifications.delete" => Some(handle_delete(state, req)),
        "notifications.deleteAll" => Some(handle_delete_all(state, req)),
        "notifications.create" => Some(handle_create(state, req)),
        _ => None,
    }
}

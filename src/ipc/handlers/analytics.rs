use crate::analytics;
use crate::ipc::error::ok;
use crate::ipc::helpers::{optional_str, require_store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Activity, User};
use crate::store::Collection;
use chrono::Utc;
use serde_json::json;

/// Thin handler over the pure aggregation core: load the collections, pick
/// the scope, serialize the summary.
fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let activities: Vec<Activity> = store.typed(Collection::Activities);
        let today = Utc::now().date_naive();
        let summary = match optional_str(&req.params, "studentId") {
            Some(student_id) => {
                let users: Vec<User> = store.typed(Collection::Users);
                analytics::student_summary(&activities, &users, &student_id, today)
            }
            None => analytics::global_summary(&activities, today),
        };
        serde_json::to_value(&summary)
            .map_err(|e| HandlerErr::new("db_read_failed", e.to_string()))
    });
    match out {
        Ok(summary) => ok(&req.id, json!({ "analytics": summary })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.get" => Some(handle_get(state, req)),
        _ => None,
    }
}

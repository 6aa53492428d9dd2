use crate::ipc::error::ok;
use crate::ipc::helpers::{
    new_id, now_rfc3339, require_store, required_str, resolve_actor, write_failed,
};
use crate::ipc::types::{AppState, Request};
use crate::store::Collection;
use serde_json::{json, Value};

/// Demo upload: only metadata is kept and the returned url is synthetic.
/// Callers must not treat these references as durable.
fn handle_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let name = required_str(&req.params, "name")?;
        let id = new_id();
        let record = json!({
            "id": id,
            "name": name,
            "size": req.params.get("size").and_then(Value::as_i64),
            "mimeType": req.params.get("mimeType").and_then(Value::as_str),
            "url": format!("local://uploads/{id}"),
            "uploadedBy": actor.id,
            "uploadedAt": now_rfc3339(),
        });
        store
            .add(Collection::UploadedFiles, record.clone())
            .map_err(write_failed)?;
        Ok(record)
    });
    match out {
        Ok(file) => {
            let url = file.get("url").cloned().unwrap_or(Value::Null);
            ok(&req.id, json!({ "url": url, "file": file }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = resolve_actor(state, &req.params);
    if let Err(e) = actor {
        return e.response(&req.id);
    }
    let out = require_store(state).and_then(|store| {
        let url = required_str(&req.params, "url")?;
        let file_id = store
            .collection(Collection::UploadedFiles)
            .into_iter()
            .find(|f| f.get("url").and_then(Value::as_str) == Some(url.as_str()))
            .and_then(|f| f.get("id").and_then(Value::as_str).map(str::to_string));
        match file_id {
            Some(id) => store
                .remove(Collection::UploadedFiles, &id)
                .map_err(write_failed),
            None => Ok(false),
        }
    });
    match out {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "files.upload" => Some(handle_upload(state, req)),
        "files.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}

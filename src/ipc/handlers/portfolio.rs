use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, new_id, not_found, now_rfc3339, require_permission, require_store, required_str,
    resolve_actor, write_failed, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Achievement, Project, Role, Skill, SkillLevel, Template, User};
use crate::permissions::Action;
use crate::store::{Collection, Store};
use chrono::Utc;
use serde_json::{json, Value};

fn find_by_student(store: &Store, student_id: &str) -> Option<Value> {
    store
        .collection(Collection::Portfolios)
        .into_iter()
        .find(|p| p.get("studentId").and_then(Value::as_str) == Some(student_id))
}

fn default_portfolio(student_id: &str) -> Value {
    json!({
        "id": new_id(),
        "studentId": student_id,
        "achievements": [],
        "skills": [],
        "projects": [],
        "template": "modern",
        "isPublic": false,
        "lastGenerated": now_rfc3339(),
        "downloadCount": 0,
    })
}

/// Portfolios belong to exactly one student; only that student or an admin
/// may mutate one. Skill verification is gated separately.
fn require_owner(actor: &User, student_id: &str) -> Result<(), HandlerErr> {
    if actor.id == student_id || actor.role == Role::Admin {
        Ok(())
    } else {
        Err(HandlerErr::new(
            "forbidden",
            "only the owning student or an admin may modify this portfolio",
        ))
    }
}

/// Upsert: merge `patch` into the existing portfolio, or create one with
/// default empty lists first. List-valued fields are replaced whole.
fn upsert(store: &Store, student_id: &str, patch: &Value) -> Result<Value, HandlerErr> {
    let mut fields = patch
        .as_object()
        .cloned()
        .ok_or_else(|| bad_params("patch must be an object"))?;
    for key in ["id", "studentId", "downloadCount"] {
        fields.remove(key);
    }
    fields.insert("lastGenerated".into(), Value::String(now_rfc3339()));

    match find_by_student(store, student_id) {
        Some(existing) => {
            let id = existing
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| HandlerErr::new("db_read_failed", "stored portfolio has no id"))?
                .to_string();
            store
                .update(Collection::Portfolios, &id, &Value::Object(fields))
                .map_err(write_failed)?
                .ok_or_else(|| not_found("portfolio not found"))
        }
        None => {
            let mut record = default_portfolio(student_id);
            if let Some(obj) = record.as_object_mut() {
                for (k, v) in fields {
                    obj.insert(k, v);
                }
            }
            store
                .add(Collection::Portfolios, record.clone())
                .map_err(write_failed)?;
            Ok(record)
        }
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        find_by_student(store, &student_id).ok_or_else(|| not_found("portfolio not found"))
    });
    match out {
        Ok(portfolio) => ok(&req.id, json!({ "portfolio": portfolio })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        require_owner(&actor, &student_id)?;
        let patch = req
            .params
            .get("patch")
            .ok_or_else(|| bad_params("missing patch object"))?;
        upsert(store, &student_id, patch)
    });
    match out {
        Ok(portfolio) => ok(&req.id, json!({ "portfolio": portfolio })),
        Err(e) => e.response(&req.id),
    }
}

/// Append a validated sub-record to one of the portfolio's lists, creating
/// the portfolio on first use.
fn append_sub_record(
    store: &Store,
    student_id: &str,
    list_key: &str,
    entry: Value,
) -> Result<Value, HandlerErr> {
    let mut portfolio = match find_by_student(store, student_id) {
        Some(p) => p,
        None => {
            let record = default_portfolio(student_id);
            store
                .add(Collection::Portfolios, record.clone())
                .map_err(write_failed)?;
            record
        }
    };
    let id = portfolio
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerErr::new("db_read_failed", "stored portfolio has no id"))?
        .to_string();
    let list = portfolio
        .get_mut(list_key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| HandlerErr::new("db_read_failed", format!("portfolio has no {list_key}")))?;
    list.push(entry);
    let patch = json!({ list_key: list.clone(), "lastGenerated": now_rfc3339() });
    store
        .update(Collection::Portfolios, &id, &patch)
        .map_err(write_failed)?
        .ok_or_else(|| not_found("portfolio not found"))
}

fn handle_add_skill(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        require_owner(&actor, &student_id)?;
        let raw = req
            .params
            .get("skill")
            .cloned()
            .ok_or_else(|| bad_params("missing skill object"))?;
        let name = required_str(&raw, "name")?;
        let level: SkillLevel =
            serde_json::from_value(raw.get("level").cloned().unwrap_or(Value::Null))
                .map_err(|_| bad_params("level must be beginner|intermediate|advanced|expert"))?;
        let skill = Skill {
            id: new_id(),
            name,
            level,
            category: required_str(&raw, "category")?,
            // Verification is a separate, faculty-gated step.
            verified: false,
        };
        let entry = serde_json::to_value(&skill)
            .map_err(|e| HandlerErr::new("db_write_failed", e.to_string()))?;
        append_sub_record(store, &student_id, "skills", entry)
    });
    match out {
        Ok(portfolio) => ok(&req.id, json!({ "portfolio": portfolio })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_add_project(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        require_owner(&actor, &student_id)?;
        let mut raw = req
            .params
            .get("project")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| bad_params("missing project object"))?;
        raw.insert("id".into(), Value::String(new_id()));
        let project: Project = serde_json::from_value(Value::Object(raw))
            .map_err(|e| bad_params(format!("invalid project: {e}")))?;
        let entry = serde_json::to_value(&project)
            .map_err(|e| HandlerErr::new("db_write_failed", e.to_string()))?;
        append_sub_record(store, &student_id, "projects", entry)
    });
    match out {
        Ok(portfolio) => ok(&req.id, json!({ "portfolio": portfolio })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_add_achievement(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        require_owner(&actor, &student_id)?;
        let mut raw = req
            .params
            .get("achievement")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| bad_params("missing achievement object"))?;
        raw.insert("id".into(), Value::String(new_id()));
        let achievement: Achievement = serde_json::from_value(Value::Object(raw))
            .map_err(|e| bad_params(format!("invalid achievement: {e}")))?;
        let entry = serde_json::to_value(&achievement)
            .map_err(|e| HandlerErr::new("db_write_failed", e.to_string()))?;
        append_sub_record(store, &student_id, "achievements", entry)
    });
    match out {
        Ok(portfolio) => ok(&req.id, json!({ "portfolio": portfolio })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_verify_skill(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        require_permission(&actor, Action::VerifySkill, None)?;
        let student_id = required_str(&req.params, "studentId")?;
        let skill_id = required_str(&req.params, "skillId")?;
        let mut portfolio =
            find_by_student(store, &student_id).ok_or_else(|| not_found("portfolio not found"))?;
        let id = portfolio
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerErr::new("db_read_failed", "stored portfolio has no id"))?
            .to_string();
        let skills = portfolio
            .get_mut("skills")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| HandlerErr::new("db_read_failed", "portfolio has no skills"))?;
        let skill = skills
            .iter_mut()
            .find(|s| s.get("id").and_then(Value::as_str) == Some(skill_id.as_str()))
            .ok_or_else(|| not_found("skill not found"))?;
        if let Some(obj) = skill.as_object_mut() {
            obj.insert("verified".into(), Value::Bool(true));
        }
        store
            .update(Collection::Portfolios, &id, &json!({ "skills": skills.clone() }))
            .map_err(write_failed)?
            .ok_or_else(|| not_found("portfolio not found"))
    });
    match out {
        Ok(portfolio) => ok(&req.id, json!({ "portfolio": portfolio })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_share(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        require_owner(&actor, &student_id)?;
        let is_public = req
            .params
            .get("isPublic")
            .and_then(Value::as_bool)
            .ok_or_else(|| bad_params("missing isPublic"))?;
        let portfolio = upsert(store, &student_id, &json!({ "isPublic": is_public }))?;
        let share_url = is_public.then(|| format!("local://portfolio/{student_id}"));
        Ok(json!({ "portfolio": portfolio, "shareUrl": share_url }))
    });
    match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

/// No real document is produced; the operation records the generation and
/// hands back a synthetic url, which is all the demo UI consumes.
fn handle_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match resolve_actor(state, &req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let out = require_store(state).and_then(|store| {
        let student_id = required_str(&req.params, "studentId")?;
        require_owner(&actor, &student_id)?;
        let template_str = required_str(&req.params, "template")?;
        let _template: Template =
            serde_json::from_value(Value::String(template_str.clone()))
                .map_err(|_| bad_params("template must be modern|classic|minimal"))?;

        let current_downloads = find_by_student(store, &student_id)
            .and_then(|p| p.get("downloadCount").and_then(Value::as_i64))
            .unwrap_or(0);
        let portfolio = upsert(store, &student_id, &json!({ "template": template_str }))?;
        let id = portfolio
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerErr::new("db_read_failed", "stored portfolio has no id"))?
            .to_string();
        let portfolio = store
            .update(
                Collection::Portfolios,
                &id,
                &json!({ "downloadCount": current_downloads + 1 }),
            )
            .map_err(write_failed)?
            .ok_or_else(|| not_found("portfolio not found"))?;

        let url = format!(
            "local://portfolio/{}/{}-{}.pdf",
            student_id,
            template_str,
            Utc::now().timestamp_millis()
        );
        Ok(json!({ "url": url, "portfolio": portfolio }))
    });
    match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "portfolio.get" => Some(handle_get(state, req)),
        "portfolio.update" => Some(handle_update(state, req)),
        "portfolio.addSkill" => Some(handle_add_skill(state, req)),
        "portfolio.addProject" => Some(handle_add_project(state, req)),
        "portfolio.addAchievement" => Some(handle_add_achievement(state, req)),
        "portfolio.verifySkill" => Some(handle_verify_skill(state, req)),
        "portfolio.share" => Some(handle_share(state, req)),
        "portfolio.generate" => Some(handle_generate(state, req)),
        _ => None,
    }
}

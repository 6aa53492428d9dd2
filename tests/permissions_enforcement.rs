
use serde_json::json;
use test_support::{open_and_login, request_err, request_ok, spawn_sidecar, temp_dir};

fn login(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    email: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        json!({ "email": email, "password": "password" }),
    );
    result
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string()
}

#[test]
fn students_cannot_review_activities() {
    let workspace = temp_dir("trackerd-perm-review");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let student = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "activities.approve",
        json!({ "token": student, "id": "6" }),
    );
    assert_eq!(code, "forbidden");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "activities.reject",
        json!({ "token": student, "id": "6", "reason": "no" }),
    );
    assert_eq!(code, "forbidden");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "activities.bulkApprove",
        json!({ "token": student, "ids": ["6"] }),
    );
    assert_eq!(code, "forbidden");
}

#[test]
fn students_only_edit_their_own_pending_work() {
    let workspace = temp_dir("trackerd-perm-edit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let student = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    // Activity 6 belongs to rahul.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "activities.update",
        json!({ "token": student, "id": "6", "patch": { "title": "hijacked" } }),
    );
    assert_eq!(code, "forbidden");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "activities.delete",
        json!({ "token": student, "id": "6" }),
    );
    assert_eq!(code, "forbidden");

    // Activity 2 is harsh's but already approved, so it is frozen.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "activities.update",
        json!({ "token": student, "id": "2", "patch": { "title": "rewrite history" } }),
    );
    assert_eq!(code, "forbidden");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "activities.delete",
        json!({ "token": student, "id": "2" }),
    );
    assert_eq!(code, "forbidden");
}

#[test]
fn faculty_cannot_submit_on_a_student_behalf_but_admin_can() {
    let workspace = temp_dir("trackerd-perm-submit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let faculty = open_and_login(&mut stdin, &mut reader, &workspace, "priya@demo.com");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "activities.create",
        json!({
            "token": faculty,
            "activity": {
                "title": "Dept seminar",
                "description": "Filed by faculty.",
                "category": "academic",
                "type": "seminar",
                "date": "2025-08-10",
                "studentId": "3"
            }
        }),
    );
    assert_eq!(code, "forbidden");

    let admin = login(&mut stdin, &mut reader, "admin@demo.com");
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "activities.create",
        json!({
            "token": admin,
            "activity": {
                "title": "Dept seminar",
                "description": "Filed by the office for a student.",
                "category": "academic",
                "type": "seminar",
                "date": "2025-08-10",
                "studentId": "3"
            }
        }),
    );
    assert_eq!(
        created
            .get("activity")
            .and_then(|a| a.get("studentId"))
            .and_then(|v| v.as_str()),
        Some("3")
    );
}

#[test]
fn mutations_without_a_session_are_refused() {
    let workspace = temp_dir("trackerd-perm-notoken");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "activities.create",
        json!({ "activity": { "title": "x", "description": "y", "category": "workshop", "type": "workshop", "date": "2025-08-01" } }),
    );
    assert_eq!(code, "missing_token");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "events.register",
        json!({ "eventId": "e1" }),
    );
    assert_eq!(code, "missing_token");
}

#[test]
fn profile_changes_are_self_service_but_privileged_fields_are_not() {
    let workspace = temp_dir("trackerd-perm-users");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let student = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "users.update",
        json!({ "token": student, "id": "3", "patch": { "name": "Harsh P." } }),
    );
    assert_eq!(
        updated.get("user").and_then(|u| u.get("name")).and_then(|v| v.as_str()),
        Some("Harsh P.")
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "users.update",
        json!({ "token": student, "id": "3", "patch": { "role": "admin" } }),
    );
    assert_eq!(code, "forbidden");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "users.update",
        json!({ "token": student, "id": "4", "patch": { "name": "someone else" } }),
    );
    assert_eq!(code, "forbidden");

    let admin = login(&mut stdin, &mut reader, "admin@demo.com");
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "users.update",
        json!({ "token": admin, "id": "4", "patch": { "department": "Electronics" } }),
    );
    assert_eq!(
        updated
            .get("user")
            .and_then(|u| u.get("department"))
            .and_then(|v| v.as_str()),
        Some("Electronics")
    );
}

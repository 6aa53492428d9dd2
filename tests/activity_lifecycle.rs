
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
fn submission_starts_pending_and_owned_by_the_submitter() {
    let workspace = temp_dir("trackerd-activity-submit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "activities.create",
        json!({
            "token": token,
            "activity": {
                "title": "Intro to embedded Rust",
                "description": "Weekend workshop on bare-metal firmware.",
                "category": "workshop",
                "type": "workshop",
                "date": "2025-08-23",
                // Self-awarded fields are discarded at the door.
                "status": "approved",
                "points": 999,
                "studentId": "1"
            }
        }),
    );
    let activity = created.get("activity").expect("activity");
    assert_eq!(activity.get("status").and_then(|v| v.as_str()), Some("pending"));
    assert_eq!(activity.get("studentId").and_then(|v| v.as_str()), Some("3"));
    assert!(activity.get("points").is_none() || activity.get("points").map(|v| v.is_null()).unwrap_or(false));
    assert!(activity.get("id").and_then(|v| v.as_str()).is_some());
}

#[test]
fn create_rejects_unknown_category() {
    let workspace = temp_dir("trackerd-activity-badcat");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "activities.create",
        json!({
            "token": token,
            "activity": {
                "title": "Mystery event",
                "description": "No such bucket.",
                "category": "esports",
                "type": "other",
                "date": "2025-08-23"
            }
        }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn update_edits_pending_work_but_never_workflow_fields() {
    let workspace = temp_dir("trackerd-activity-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    // Seed activity 1 is harsh's pending hackathon entry.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "activities.update",
        json!({
            "token": token,
            "id": "1",
            "patch": {
                "title": "National Hackathon Finals (updated)",
                "status": "approved",
                "points": 500
            }
        }),
    );
    let activity = updated.get("activity").expect("activity");
    assert_eq!(
        activity.get("title").and_then(|v| v.as_str()),
        Some("National Hackathon Finals (updated)")
    );
    assert_eq!(activity.get("status").and_then(|v| v.as_str()), Some("pending"));
    assert!(activity.get("points").map(|v| v.is_null()).unwrap_or(true));
}

#[test]
fn faculty_approval_awards_scheduled_points_and_notifies_the_owner() {
    let workspace = temp_dir("trackerd-activity-approve");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let faculty = login(&mut stdin, &mut reader, "priya@demo.com");

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "notifications.unreadCount",
        json!({ "userId": "3" }),
    );
    let unread_before = before.get("count").and_then(|v| v.as_u64()).expect("count");

    let approved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "activities.approve",
        json!({ "token": faculty, "id": "1" }),
    );
    let activity = approved.get("activity").expect("activity");
    assert_eq!(activity.get("status").and_then(|v| v.as_str()), Some("approved"));
    assert_eq!(activity.get("approvedBy").and_then(|v| v.as_str()), Some("2"));
    assert!(activity.get("approvedAt").and_then(|v| v.as_str()).is_some());
    // Competition category carries a 15-point schedule.
    assert_eq!(activity.get("points").and_then(|v| v.as_i64()), Some(15));
    // Submission content is untouched by the review.
    assert_eq!(
        activity.get("title").and_then(|v| v.as_str()),
        Some("National Hackathon Finals")
    );
    assert_eq!(activity.get("category").and_then(|v| v.as_str()), Some("competition"));

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "notifications.unreadCount",
        json!({ "userId": "3" }),
    );
    assert_eq!(
        after.get("count").and_then(|v| v.as_u64()),
        Some(unread_before + 1)
    );

    // Review is final: a second approval refuses instead of rewriting.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "activities.approve",
        json!({ "token": faculty, "id": "1" }),
    );
    assert_eq!(code, "conflict");
}

#[test]
fn approval_accepts_an_explicit_points_override() {
    let workspace = temp_dir("trackerd-activity-override");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let faculty = login(&mut stdin, &mut reader, "priya@demo.com");

    let approved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "activities.approve",
        json!({ "token": faculty, "id": "6", "points": 8 }),
    );
    assert_eq!(
        approved
            .get("activity")
            .and_then(|a| a.get("points"))
            .and_then(|v| v.as_i64()),
        Some(8)
    );
}

#[test]
fn rejection_requires_a_reason_and_records_it() {
    let workspace = temp_dir("trackerd-activity-reject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let faculty = login(&mut stdin, &mut reader, "priya@demo.com");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "activities.reject",
        json!({ "token": faculty, "id": "1" }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "activities.reject",
        json!({ "token": faculty, "id": "1", "reason": "   " }),
    );
    assert_eq!(code, "bad_params");

    let rejected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "activities.reject",
        json!({ "token": faculty, "id": "1", "reason": "Certificate is missing." }),
    );
    let activity = rejected.get("activity").expect("activity");
    assert_eq!(activity.get("status").and_then(|v| v.as_str()), Some("rejected"));
    assert_eq!(
        activity.get("rejectionReason").and_then(|v| v.as_str()),
        Some("Certificate is missing.")
    );

    // Rejected work is terminal for the review queue too.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "activities.approve",
        json!({ "token": faculty, "id": "1" }),
    );
    assert_eq!(code, "conflict");
}

#[test]
fn delete_removes_own_pending_work() {
    let workspace = temp_dir("trackerd-activity-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = open_and_login(&mut stdin, &mut reader, &workspace, "harsh@demo.com");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "activities.delete",
        json!({ "token": token, "id": "1" }),
    );
    assert_eq!(deleted.get("deleted").and_then(|v| v.as_bool()), Some(true));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "activities.get",
        json!({ "id": "1" }),
    );
    assert_eq!(code, "not_found");
}

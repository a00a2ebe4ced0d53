mod common;

use common::{temp_dir, Sidecar};
use serde_json::{json, Value};

fn create_essay_template(sc: &mut Sidecar) -> Value {
    sc.call(
        "admin-1",
        "admin.templates.create",
        json!({
            "id": "essay-draft",
            "title": "Essay draft",
            "category": "writing",
            "sortOrder": 1,
            "inputSchema": "[{\"field_key\":\"topic\",\"display_name\":\"Topic\",\"required\":true},{\"field_key\":\"notes\",\"display_name\":\"Notes\"}]"
        }),
    )
}

#[test]
fn new_template_is_assigned_to_the_configured_grade() {
    let workspace = temp_dir("portald-todos-assign");
    let mut sc = Sidecar::open(&workspace);
    sc.bootstrap_admin("admin-1");
    sc.add_student("admin-1", "stu-2", "Aki", "高2");
    sc.add_student("admin-1", "stu-3", "Ben", "高3");

    let created = create_essay_template(&mut sc);
    assert_eq!(created["assignedCount"], json!(1));
    assert_eq!(created["template"]["inputSchema"][0]["required"], json!(true));
    assert_eq!(created["template"]["inputSchema"][1]["type"], json!("text"));

    // Both students see every active template; only the assigned one has a stored row.
    for student in ["stu-2", "stu-3"] {
        let list = sc.call(student, "todos.list", json!({}));
        assert_eq!(list["todos"][0]["templateId"], json!("essay-draft"));
        assert_eq!(list["todos"][0]["status"], json!("not_started"));
        assert_eq!(list["counts"]["total"], json!(1));
        assert_eq!(list["openTemplateIds"], json!(["essay-draft"]));
    }
    let assigned = sc.call("stu-2", "todos.get", json!({ "templateId": "essay-draft" }));
    assert_eq!(assigned["updatedAt"], json!("2026-10-17T09:00:00.000Z"));
    let unassigned = sc.call("stu-3", "todos.get", json!({ "templateId": "essay-draft" }));
    assert!(unassigned["updatedAt"].is_null());

    // Turning auto-assign off skips the insert.
    sc.call(
        "admin-1",
        "settings.update",
        json!({ "section": "todos", "patch": { "autoAssignOnCreate": false } }),
    );
    let second = sc.call(
        "admin-1",
        "admin.templates.create",
        json!({ "id": "campus-visit", "title": "Campus visit" }),
    );
    assert_eq!(second["assignedCount"], json!(0));
    assert_eq!(second["template"]["sortOrder"], json!(2));
    sc.finish();
}

#[test]
fn save_validates_status_and_required_fields() {
    let workspace = temp_dir("portald-todos-save");
    let mut sc = Sidecar::open(&workspace);
    sc.bootstrap_admin("admin-1");
    sc.add_student("admin-1", "stu-1", "Aki", "高2");
    create_essay_template(&mut sc);

    assert_eq!(
        sc.call_err(
            "stu-1",
            "todos.save",
            json!({ "templateId": "essay-draft", "status": "finished" })
        ),
        "validation_error"
    );
    assert_eq!(
        sc.call_err(
            "stu-1",
            "todos.save",
            json!({ "templateId": "essay-draft", "status": "done", "responses": { "notes": "x" } })
        ),
        "validation_error"
    );
    assert_eq!(
        sc.call_err(
            "stu-1",
            "todos.save",
            json!({ "templateId": "missing", "status": "done" })
        ),
        "template_not_found"
    );

    // Partial progress is fine; undeclared fields are dropped.
    let saved = sc.call(
        "stu-1",
        "todos.save",
        json!({
            "templateId": "essay-draft",
            "status": "in_progress",
            "responses": { "notes": "outline", "score": "99" }
        }),
    );
    assert_eq!(saved["status"], json!("in_progress"));
    assert_eq!(saved["responses"], json!({ "notes": "outline" }));
    assert_eq!(saved["lastTodoUpdateAt"], json!("2026-10-17T09:00:00.000Z"));

    let summary = sc.call("stu-1", "home.summary", json!({}));
    assert_eq!(summary["counts"]["inProgress"], json!(1));
    assert_eq!(summary["counts"]["progressRate"], json!(0));
    assert_eq!(summary["displayName"], json!("Aki"));

    sc.call(
        "stu-1",
        "todos.save",
        json!({
            "templateId": "essay-draft",
            "status": "done",
            "responses": { "topic": "Rivers", "notes": "final" }
        }),
    );
    let got = sc.call("stu-1", "todos.get", json!({ "templateId": "essay-draft" }));
    assert_eq!(got["status"], json!("done"));
    assert_eq!(got["responses"]["topic"], json!("Rivers"));

    let list = sc.call("stu-1", "todos.list", json!({}));
    assert_eq!(list["counts"]["done"], json!(1));
    assert_eq!(list["counts"]["progressRate"], json!(100));
    assert_eq!(list["openTemplateIds"], json!([]));
    sc.finish();
}

#[test]
fn inactive_templates_leave_the_student_view() {
    let workspace = temp_dir("portald-todos-inactive");
    let mut sc = Sidecar::open(&workspace);
    sc.bootstrap_admin("admin-1");
    sc.add_student("admin-1", "stu-1", "Aki", "高2");
    create_essay_template(&mut sc);
    sc.call(
        "admin-1",
        "admin.templates.create",
        json!({ "id": "campus-visit", "title": "Campus visit" }),
    );
    sc.call(
        "stu-1",
        "todos.save",
        json!({ "templateId": "campus-visit", "status": "done" }),
    );

    sc.call(
        "admin-1",
        "admin.templates.update",
        json!({ "templateId": "essay-draft", "isActive": false }),
    );
    let list = sc.call("stu-1", "todos.list", json!({}));
    assert_eq!(list["counts"]["total"], json!(1));
    assert_eq!(list["counts"]["progressRate"], json!(100));
    assert_eq!(
        sc.call_err("stu-1", "todos.get", json!({ "templateId": "essay-draft" })),
        "template_not_found"
    );
    sc.finish();
}

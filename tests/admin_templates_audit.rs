mod common;

use common::{temp_dir, Sidecar};
use serde_json::{json, Value};

fn actions(entries: &Value) -> Vec<String> {
    entries["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| e["action"].as_str().unwrap_or("").to_string())
        .collect()
}

#[test]
fn template_lifecycle_is_audited() {
    let workspace = temp_dir("portald-admin-templates");
    let mut sc = Sidecar::open(&workspace);
    sc.bootstrap_admin("admin-1");
    sc.add_student("admin-1", "stu-1", "Aki", "高2");

    sc.call(
        "admin-1",
        "admin.templates.create",
        json!({
            "id": "reading-log",
            "title": "Reading log",
            "inputSchema": [{ "field_key": "book", "display_name": "Book", "required": true }]
        }),
    );
    assert_eq!(
        sc.call_err(
            "admin-1",
            "admin.templates.create",
            json!({ "id": "reading-log", "title": "Again" })
        ),
        "duplicate_id"
    );
    assert_eq!(
        sc.call_err(
            "admin-1",
            "admin.templates.create",
            json!({ "id": "broken", "title": "Broken", "inputSchema": "[{" })
        ),
        "invalid_json"
    );
    assert_eq!(
        sc.call_err(
            "admin-1",
            "admin.templates.create",
            json!({ "id": "not-array", "title": "Object", "inputSchema": "{}" })
        ),
        "validation_error"
    );
    assert_eq!(
        sc.call_err(
            "admin-1",
            "admin.templates.create",
            json!({ "id": "Bad Id", "title": "Bad" })
        ),
        "validation_error"
    );

    let updated = sc.call(
        "admin-1",
        "admin.templates.update",
        json!({ "templateId": "reading-log", "title": "Reading journal", "sortOrder": 5 }),
    );
    assert_eq!(updated["template"]["title"], json!("Reading journal"));
    assert_eq!(updated["template"]["inputSchema"][0]["field_key"], json!("book"));
    assert_eq!(
        sc.call_err(
            "admin-1",
            "admin.templates.update",
            json!({ "templateId": "missing", "title": "x" })
        ),
        "template_not_found"
    );

    sc.call(
        "stu-1",
        "todos.save",
        json!({ "templateId": "reading-log", "status": "done", "responses": { "book": "Kokoro" } }),
    );
    let deleted = sc.call(
        "admin-1",
        "admin.templates.delete",
        json!({ "templateId": "reading-log" }),
    );
    assert_eq!(deleted["removedTodos"], json!(1));
    let list = sc.call("admin-1", "admin.templates.list", json!({}));
    assert_eq!(list["templates"], json!([]));
    let todos = sc.call("stu-1", "todos.list", json!({}));
    assert_eq!(todos["counts"]["total"], json!(0));

    let log = sc.call("admin-1", "admin.audit.list", json!({}));
    let acts = actions(&log);
    assert!(acts.contains(&"TEMPLATE_CREATE".to_string()));
    assert!(acts.contains(&"TEMPLATE_UPDATE".to_string()));
    assert!(acts.contains(&"TEMPLATE_DELETE".to_string()));

    let update = log["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .find(|e| e["action"] == "TEMPLATE_UPDATE")
        .expect("update entry");
    assert_eq!(update["targetType"], json!("todo_templates"));
    assert_eq!(update["diff"]["old"]["title"], json!("Reading log"));
    assert_eq!(update["diff"]["new"]["title"], json!("Reading journal"));
    sc.finish();
}

#[test]
fn user_changes_are_audited_only_when_something_changes() {
    let workspace = temp_dir("portald-admin-users");
    let mut sc = Sidecar::open(&workspace);
    sc.bootstrap_admin("admin-1");
    sc.sign_in("new-1", Some("Mina"));
    sc.sign_in("new-2", Some("Ren"));

    let pending = sc.call("admin-1", "admin.users.list", json!({ "filter": "pending" }));
    assert_eq!(pending["counts"]["pending"], json!(2));
    assert_eq!(pending["counts"]["total"], json!(3));
    assert_eq!(pending["users"].as_array().map(|u| u.len()), Some(2));

    let before = actions(&sc.call("admin-1", "admin.audit.list", json!({}))).len();

    sc.approve("admin-1", "new-1", "teacher");
    // Same role again: nothing to record.
    sc.approve("admin-1", "new-1", "teacher");
    sc.call(
        "admin-1",
        "admin.users.update",
        json!({ "userId": "new-1", "isActive": false }),
    );
    // Back to pending.
    let reset = sc.call(
        "admin-1",
        "admin.users.update",
        json!({ "userId": "new-1", "role": "" }),
    );
    assert!(reset["user"]["role"].is_null());

    let log = sc.call("admin-1", "admin.audit.list", json!({}));
    let acts = actions(&log);
    assert_eq!(acts.len() - before, 3);
    let role_changes: Vec<&Value> = log["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .filter(|e| e["action"] == "ROLE_CHANGE" && e["targetId"] == "new-1")
        .collect();
    assert_eq!(role_changes.len(), 2);
    assert!(acts.contains(&"STATUS_CHANGE".to_string()));

    assert_eq!(
        sc.call_err(
            "admin-1",
            "admin.users.update",
            json!({ "userId": "new-2", "role": "principal" })
        ),
        "validation_error"
    );
    assert_eq!(
        sc.call_err("admin-1", "admin.users.update", json!({ "userId": "ghost" })),
        "not_found"
    );
    let limited = sc.call("admin-1", "admin.audit.list", json!({ "limit": 1 }));
    assert_eq!(actions(&limited).len(), 1);
    sc.finish();
}

#[test]
fn settings_patch_is_validated_per_section() {
    let workspace = temp_dir("portald-admin-settings");
    let mut sc = Sidecar::open(&workspace);
    sc.bootstrap_admin("admin-1");

    let defaults = sc.call("admin-1", "settings.get", json!({}));
    assert_eq!(defaults["display"]["locale"], json!("en"));
    assert_eq!(defaults["todos"]["autoAssignOnCreate"], json!(true));
    assert_eq!(defaults["todos"]["autoAssignGrade"], json!("高2"));
    assert_eq!(defaults["dashboard"]["defaultSort"], json!("name"));

    assert_eq!(
        sc.call_err(
            "admin-1",
            "settings.update",
            json!({ "section": "display", "patch": { "locale": "fr" } })
        ),
        "validation_error"
    );
    assert_eq!(
        sc.call_err(
            "admin-1",
            "settings.update",
            json!({ "section": "todos", "patch": { "color": "red" } })
        ),
        "validation_error"
    );
    assert_eq!(
        sc.call_err(
            "admin-1",
            "settings.update",
            json!({ "section": "theme", "patch": {} })
        ),
        "bad_params"
    );

    let saved = sc.call(
        "admin-1",
        "settings.update",
        json!({ "section": "todos", "patch": { "autoAssignGrade": "高3" } }),
    );
    assert_eq!(saved["values"]["autoAssignGrade"], json!("高3"));
    assert_eq!(saved["values"]["autoAssignOnCreate"], json!(true));
    sc.finish();
}

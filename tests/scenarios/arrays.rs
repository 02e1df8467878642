use formstate::{FormEngine, ValidationResult, ValidatorConfig, Value};
use serde_json::json;

fn users_form() -> FormEngine {
    FormEngine::builder(json!({
        "users": [
            { "name": "ann" },
            { "name": "bob" },
            { "name": "cid" }
        ]
    }))
    .build()
    .unwrap()
}

fn names(form: &FormEngine) -> Vec<String> {
    form.get_values(Some("users"))
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u.child("name").and_then(Value::as_str).unwrap().to_string())
        .collect()
}

#[test]
fn add_array_item_appends_and_marks_new_item_dirty() {
    let form = FormEngine::builder(json!({ "email": "", "tags": ["a"] }))
        .build()
        .unwrap();

    form.add_array_item("tags", "b");

    let state = form.state();
    assert_eq!(state.value("tags").unwrap().to_json(), json!(["a", "b"]));
    assert!(state.is_field_dirty("tags.1"));
    assert!(state.is_field_dirty("tags"));
    assert!(!state.is_field_dirty("tags.0"));
}

#[test]
fn removing_shifts_state_of_later_items_down() {
    let form = users_form();
    form.set_error("users.0.name", "e0");
    form.set_error("users.1.name", "e1");
    form.set_error("users.2.name", "e2");
    form.touch("users.0.name");
    form.touch("users.2.name");
    form.set_value("users.2.name", "CID");

    form.remove_array_item("users", 1);

    let state = form.state();
    assert_eq!(names(&form), vec!["ann", "CID"]);
    assert_eq!(state.error("users.0.name"), Some("e0"));
    assert_eq!(state.error("users.1.name"), Some("e2"));
    assert_eq!(state.error("users.2.name"), None);
    assert!(state.is_touched("users.0.name"));
    assert!(state.is_touched("users.1.name"));
    assert!(!state.is_touched("users.2.name"));
    assert!(state.is_field_dirty("users.1.name"));
    assert!(!state.is_field_dirty("users.2.name"));
    assert!(state.is_field_dirty("users"));
}

#[test]
fn inserting_shifts_state_of_later_items_up() {
    let form = users_form();
    form.set_error("users.1.name", "e1");
    form.touch("users.0.name");

    form.insert_array_item("users", 1, json!({ "name": "new" }));

    let state = form.state();
    assert_eq!(names(&form), vec!["ann", "new", "bob", "cid"]);
    assert_eq!(state.error("users.2.name"), Some("e1"));
    assert_eq!(state.error("users.1.name"), None);
    assert!(state.is_touched("users.0.name"));
    assert!(state.is_field_dirty("users.1"));
    assert!(state.is_field_dirty("users.1.name"));
}

#[test]
fn prepend_and_insert_past_end() {
    let form = users_form();
    form.prepend_array_item("users", json!({ "name": "zed" }));
    form.insert_array_item("users", 99, json!({ "name": "end" }));

    assert_eq!(names(&form), vec!["zed", "ann", "bob", "cid", "end"]);
}

#[test]
fn move_carries_state_with_the_item() {
    let form = users_form();
    form.set_error("users.0.name", "first");
    form.touch("users.2.name");

    form.move_array_item("users", 0, 2);

    let state = form.state();
    assert_eq!(names(&form), vec!["bob", "cid", "ann"]);
    assert_eq!(state.error("users.2.name"), Some("first"));
    assert_eq!(state.error("users.0.name"), None);
    assert!(state.is_touched("users.1.name"));
}

#[test]
fn swap_exchanges_state() {
    let form = users_form();
    form.set_error("users.0.name", "zero");
    form.set_error("users.2.name", "two");

    form.swap_array_items("users", 0, 2);

    let state = form.state();
    assert_eq!(names(&form), vec!["cid", "bob", "ann"]);
    assert_eq!(state.error("users.0.name"), Some("two"));
    assert_eq!(state.error("users.2.name"), Some("zero"));
}

#[test]
fn out_of_range_indices_are_ignored() {
    let form = users_form();
    let before = form.get_values(None);

    form.remove_array_item("users", 3);
    form.move_array_item("users", 0, 7);
    form.swap_array_items("users", 5, 1);
    form.add_array_item("users.0.name", "not an array");

    assert!(Value::ptr_eq(&form.get_values(None), &before));
}

#[test]
fn array_operations_on_missing_paths_create_the_array() {
    let form = FormEngine::builder(json!({})).build().unwrap();
    form.add_array_item("emails", "a@b.c");
    assert_eq!(form.get_values(Some("emails")).to_json(), json!(["a@b.c"]));
}

#[test]
fn replace_array_drops_item_state() {
    let form = users_form();
    form.set_error("users.1.name", "e1");
    form.touch("users.0.name");

    form.replace_array("users", vec![json!({ "name": "solo" }).into()]);

    let state = form.state();
    assert_eq!(names(&form), vec!["solo"]);
    assert!(state.errors.is_empty());
    assert!(state.touched.is_empty());
    assert!(state.is_field_dirty("users"));
}

#[test]
fn array_validator_runs_on_item_changes() {
    let form = FormEngine::builder(json!({ "tags": [] }))
        .validator(
            ValidatorConfig::sync(|tags: &Value| {
                let count = tags.as_array().map_or(0, Vec::len);
                if count > 2 {
                    ValidationResult::error("At most 2 tags")
                } else {
                    ValidationResult::Valid
                }
            })
            .for_field("tags"),
        )
        .build()
        .unwrap();

    form.add_array_item("tags", "a");
    form.add_array_item("tags", "b");
    assert!(form.state().is_valid);
    form.add_array_item("tags", "c");
    assert_eq!(form.state().error("tags"), Some("At most 2 tags"));
    form.remove_array_item("tags", 0);
    assert!(form.state().is_valid);
}

use super::common::email_validator;
use formstate::{
    ErrorSource, FormEngine, FormError, History, Snapshot, ValidationResult, ValidatorConfig,
    ValidatorFailure, Value,
};
use serde_json::json;
use std::time::Duration;

fn contact() -> FormEngine {
    FormEngine::builder(json!({ "email": "", "note": "" }))
        .validator(email_validator())
        .build()
        .unwrap()
}

#[test]
fn restoring_the_current_snapshot_changes_nothing() {
    let form = contact();
    form.set_value("email", "bad");
    form.touch("email");
    form.set_value("note", "hi");
    let before = form.state();

    form.restore_snapshot(&form.get_snapshot());

    let after = form.state();
    assert_eq!(after.values, before.values);
    assert_eq!(after.errors, before.errors);
    assert_eq!(after.touched, before.touched);
    assert_eq!(after.dirty_fields, before.dirty_fields);
    assert_eq!(after.is_valid, before.is_valid);
}

#[test]
fn snapshot_survives_json_and_restores_elsewhere() {
    let form = contact();
    form.set_value("email", "bad");
    form.touch("email");
    let json = form.get_snapshot().to_json().unwrap();

    let snapshot = Snapshot::from_json(&json).unwrap();
    assert!(snapshot.captured_at().is_some());

    let other = contact();
    other.restore_snapshot(&snapshot);

    let state = other.state();
    assert_eq!(state.values.to_json(), json!({ "email": "bad", "note": "" }));
    assert_eq!(state.error("email"), Some("Invalid email"));
    assert!(state.is_touched("email"));
    assert!(state.is_field_dirty("email"));
    assert!(!state.is_valid);
    assert_eq!(other.field_errors()["email"].source, ErrorSource::Restored);
}

#[test]
fn persisted_shape() {
    let form = contact();
    form.set_value("email", "bad");
    let value: serde_json::Value =
        serde_json::from_str(&form.get_snapshot().to_json().unwrap()).unwrap();

    assert_eq!(value["values"], json!({ "email": "bad", "note": "" }));
    assert_eq!(value["errors"], json!({ "email": "Invalid email" }));
    assert_eq!(value["touched"], json!({}));
    assert!(value["timestamp"].is_i64());
}

#[test]
fn restored_errors_give_way_to_revalidation() {
    let form = contact();
    let snapshot = Snapshot {
        values: json!({ "email": "bad", "note": "" }).into(),
        errors: [
            ("email".to_string(), "Invalid email".to_string()),
            ("note".to_string(), "Server rejected".to_string()),
        ]
        .into(),
        touched: Default::default(),
        timestamp: 0,
    };
    form.restore_snapshot(&snapshot);
    assert_eq!(form.state().errors.len(), 2);

    form.set_value("email", "a@b.c");
    let state = form.state();
    assert_eq!(state.error("email"), None);
    assert_eq!(state.error("note"), Some("Server rejected"));

    form.set_value("note", "fixed");
    assert!(form.state().is_valid);
}

#[test]
fn restore_replaces_manual_errors() {
    let form = contact();
    let clean = form.get_snapshot();
    form.set_error("note", "manual");

    form.restore_snapshot(&clean);

    assert!(form.state().is_valid);
}

#[test]
fn malformed_snapshot_json_is_rejected() {
    assert!(matches!(
        Snapshot::from_json("{\"values\": {}}"),
        Err(FormError::Snapshot(_))
    ));
    assert!(matches!(Snapshot::from_json("nope"), Err(FormError::Snapshot(_))));
}

#[tokio::test(start_paused = true)]
async fn restore_cancels_pending_async_validation() {
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(
            ValidatorConfig::asynchronous(Duration::from_millis(100), |_value: Value| async {
                Ok::<_, ValidatorFailure>(ValidationResult::error("Username is taken"))
            })
            .for_field("username"),
        )
        .build()
        .unwrap();
    let clean = form.get_snapshot();

    form.set_value("username", "taken");
    assert!(form.state().is_validating);

    form.restore_snapshot(&clean);
    assert!(!form.state().is_validating);
    form.settled().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let state = form.state();
    assert!(state.is_valid);
    assert_eq!(state.values.to_json(), json!({ "username": "" }));
    assert!(!state.is_dirty);
}

fn snap(email: &str) -> Snapshot {
    Snapshot {
        values: json!({ "email": email }).into(),
        errors: Default::default(),
        touched: Default::default(),
        timestamp: 0,
    }
}

#[test]
fn history_undo_redo() {
    let mut history = History::default();
    assert!(!history.can_undo());

    history.record(snap("a"));
    history.record(snap("b"));
    assert_eq!(history.len(), 2);

    let previous = history.undo(snap("c")).unwrap();
    assert_eq!(previous.values, snap("b").values);
    assert!(history.can_redo());

    let next = history.redo(previous).unwrap();
    assert_eq!(next.values, snap("c").values);
    assert!(!history.can_redo());

    history.undo(snap("c"));
    history.record(snap("d"));
    assert!(!history.can_redo());
}

#[test]
fn history_skips_duplicates_and_honors_limit() {
    let mut history = History::new(2);
    history.record(snap("a"));
    history.record(Snapshot {
        timestamp: 42,
        ..snap("a")
    });
    assert_eq!(history.len(), 1);

    history.record(snap("b"));
    history.record(snap("c"));
    assert_eq!(history.len(), 2);

    assert_eq!(history.undo(snap("x")).unwrap().values, snap("c").values);
    assert_eq!(history.undo(snap("c")).unwrap().values, snap("b").values);
    assert!(history.undo(snap("b")).is_none());

    history.clear();
    assert!(history.is_empty());
    assert!(!history.can_redo());
}

#[test]
fn history_drives_engine_undo() {
    let form = contact();
    let mut history = History::default();

    history.record(form.get_snapshot());
    form.set_value("note", "first");
    history.record(form.get_snapshot());
    form.set_value("note", "second");

    let previous = history.undo(form.get_snapshot()).unwrap();
    form.restore_snapshot(&previous);
    assert_eq!(form.get_values(Some("note")), Value::from("first"));

    let next = history.redo(form.get_snapshot()).unwrap();
    form.restore_snapshot(&next);
    assert_eq!(form.get_values(Some("note")), Value::from("second"));
}

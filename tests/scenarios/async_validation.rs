use super::common::yield_many;
use formstate::{
    ErrorSource, FieldRules, FormEngine, ValidationResult, ValidatorConfig, ValidatorFailure,
    Value,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Calls = Arc<Mutex<Vec<String>>>;

/// Username availability check: "taken" is unavailable. Records every call.
fn availability(calls: &Calls, debounce_ms: u64) -> ValidatorConfig {
    let calls = Arc::clone(calls);
    ValidatorConfig::asynchronous(Duration::from_millis(debounce_ms), move |value: Value| {
        let calls = Arc::clone(&calls);
        async move {
            let name = value.as_str().unwrap_or_default().to_string();
            calls.lock().unwrap().push(name.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
            if name == "taken" {
                Ok::<_, ValidatorFailure>(ValidationResult::error("Username is taken"))
            } else {
                Ok(ValidationResult::Valid)
            }
        }
    })
    .for_field("username")
}

#[tokio::test(start_paused = true)]
async fn debounce_collapses_rapid_changes_into_one_call() {
    let calls = Calls::default();
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(availability(&calls, 300))
        .build()
        .unwrap();

    form.set_value("username", "t");
    tokio::time::sleep(Duration::from_millis(40)).await;
    form.set_value("username", "ta");
    tokio::time::sleep(Duration::from_millis(40)).await;
    form.set_value("username", "taken");

    assert!(form.state().is_validating);
    assert!(form.field_state("username").is_validating);

    form.settled().await;
    assert_eq!(*calls.lock().unwrap(), vec!["taken".to_string()]);

    let state = form.state();
    assert!(!state.is_validating);
    assert_eq!(state.error("username"), Some("Username is taken"));
    assert_eq!(form.field_errors()["username"].source, ErrorSource::Async);
}

#[tokio::test(start_paused = true)]
async fn validator_sees_value_current_when_the_timer_fires() {
    let calls = Calls::default();
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(availability(&calls, 100))
        .build()
        .unwrap();

    form.set_value("username", "first");
    // Written without validation: the pending run is not restarted.
    form.set_value_with(
        "username",
        "second",
        formstate::SetValueOptions::default().validate(false),
    );
    form.settled().await;

    assert_eq!(*calls.lock().unwrap(), vec!["second".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn stale_result_is_discarded() {
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(
            ValidatorConfig::asynchronous(Duration::from_millis(10), |value: Value| async move {
                let name = value.as_str().unwrap_or_default().to_string();
                let delay = if name == "slow" { 500 } else { 20 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, ValidatorFailure>(ValidationResult::error(format!("checked {}", name)))
            })
            .for_field("username"),
        )
        .build()
        .unwrap();

    form.set_value("username", "slow");
    // Generation 1 fires and is now in flight.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(form.state().is_validating);

    form.set_value("username", "fast");
    form.settled().await;
    assert_eq!(form.state().error("username"), Some("checked fast"));

    // Generation 1 resolves afterwards and must not win.
    tokio::time::sleep(Duration::from_secs(1)).await;
    yield_many().await;
    let state = form.state();
    assert_eq!(state.error("username"), Some("checked fast"));
    assert!(!state.is_validating);
}

#[tokio::test(start_paused = true)]
async fn async_error_is_hidden_while_revalidating() {
    let calls = Calls::default();
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(availability(&calls, 100))
        .build()
        .unwrap();

    form.set_value("username", "taken");
    form.settled().await;
    assert_eq!(form.state().error("username"), Some("Username is taken"));

    form.set_value("username", "free");
    let state = form.state();
    assert!(state.is_field_validating("username"));
    assert_eq!(state.error("username"), None);

    form.settled().await;
    assert!(form.state().is_valid);
}

#[tokio::test(start_paused = true)]
async fn rejected_validator_yields_its_message_or_a_generic_one() {
    let form = FormEngine::builder(json!({ "a": "", "b": "", "c": "" }))
        .validator(
            ValidatorConfig::asynchronous(Duration::ZERO, |_: Value| async {
                Err::<ValidationResult, _>(ValidatorFailure::new("Service unavailable"))
            })
            .for_field("a"),
        )
        .validator(
            ValidatorConfig::asynchronous(Duration::ZERO, |_: Value| async {
                Err::<ValidationResult, _>(ValidatorFailure::generic())
            })
            .for_field("b"),
        )
        .validator(
            ValidatorConfig::asynchronous(Duration::ZERO, |value: Value| async move {
                if !value.is_null() {
                    panic!("validator crashed");
                }
                Ok::<_, ValidatorFailure>(ValidationResult::Valid)
            })
            .for_field("c"),
        )
        .build()
        .unwrap();

    form.set_value("a", "x");
    form.set_value("b", "x");
    form.set_value("c", "x");
    form.settled().await;

    let state = form.state();
    assert_eq!(state.error("a"), Some("Service unavailable"));
    assert_eq!(state.error("b"), Some(ValidatorFailure::GENERIC_MESSAGE));
    assert_eq!(state.error("c"), Some("Validation failed"));
}

#[tokio::test(start_paused = true)]
async fn sync_error_suppresses_async_validation() {
    let calls = Calls::default();
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(
            ValidatorConfig::rules(FieldRules::new().min_length(3, "Too short"))
                .for_field("username"),
        )
        .validator(availability(&calls, 100))
        .build()
        .unwrap();

    form.set_value("username", "ab");
    assert!(!form.state().is_validating);
    assert_eq!(form.state().error("username"), Some("Too short"));
    form.settled().await;
    assert!(calls.lock().unwrap().is_empty());

    form.set_value("username", "taken");
    assert!(form.state().is_validating);
    form.settled().await;
    assert_eq!(*calls.lock().unwrap(), vec!["taken".to_string()]);
    assert_eq!(form.state().error("username"), Some("Username is taken"));

    // Going back to a sync failure drops the pending or resolved async error.
    form.set_value("username", "x");
    assert_eq!(form.state().error("username"), Some("Too short"));
    form.set_value("username", "");
    assert_eq!(form.state().error("username"), None);
}

#[tokio::test(start_paused = true)]
async fn fields_validate_independently() {
    let form = FormEngine::builder(json!({ "a": "", "b": "" }))
        .validator(
            ValidatorConfig::asynchronous(Duration::from_millis(100), |_: Value| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<_, ValidatorFailure>(ValidationResult::error("a failed"))
            })
            .for_field("a"),
        )
        .validator(
            ValidatorConfig::asynchronous(Duration::from_millis(100), |_: Value| async {
                Ok::<_, ValidatorFailure>(ValidationResult::error("b failed"))
            })
            .for_field("b"),
        )
        .build()
        .unwrap();

    form.set_value("a", "1");
    form.set_value("b", "1");
    tokio::time::sleep(Duration::from_millis(150)).await;
    yield_many().await;

    let state = form.state();
    assert_eq!(state.error("b"), Some("b failed"));
    assert_eq!(state.error("a"), None);
    assert!(state.is_field_validating("a"));
    assert!(!state.is_field_validating("b"));

    form.settled().await;
    assert_eq!(form.state().error("a"), Some("a failed"));
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_pending_validation() {
    let calls = Calls::default();
    let form = FormEngine::builder(json!({ "username": "" }))
        .validator(availability(&calls, 100))
        .build()
        .unwrap();

    form.set_value("username", "taken");
    form.dispose();
    form.settled().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(calls.lock().unwrap().is_empty());
    assert!(!form.state().is_validating);
}

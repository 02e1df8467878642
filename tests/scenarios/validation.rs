use super::common::email_validator;
use formstate::{
    ErrorSource, FieldRules, FormEngine, FormError, Trigger, ValidationResult, ValidatorConfig,
    Value,
};
use regex::Regex;
use serde_json::json;

#[test]
fn sync_validator_sets_and_clears_error() {
    let form = FormEngine::builder(json!({ "email": "", "tags": ["a"] }))
        .validator(email_validator())
        .build()
        .unwrap();

    form.set_value("email", "bad");
    assert_eq!(form.state().error("email"), Some("Invalid email"));
    assert!(!form.state().is_valid);

    form.set_value("email", "a@b.com");
    let state = form.state();
    assert_eq!(state.error("email"), None);
    assert!(state.is_valid);
}

#[test]
fn field_validator_outranks_global_validator() {
    let form = FormEngine::builder(json!({ "email": "" }))
        .validator(ValidatorConfig::sync(|_: &Value| {
            ValidationResult::at("email", "A")
        }))
        .validator(
            ValidatorConfig::sync(|_: &Value| ValidationResult::error("B")).for_field("email"),
        )
        .build()
        .unwrap();

    form.set_value("email", "x");
    assert_eq!(form.state().error("email"), Some("B"));
    assert_eq!(form.field_errors()["email"].source, ErrorSource::Custom);
}

#[test]
fn manual_error_outranks_validators_until_cleared() {
    let form = FormEngine::builder(json!({ "email": "" }))
        .validator(email_validator())
        .build()
        .unwrap();

    form.set_error("email", "Already registered");
    form.set_value("email", "bad");
    assert_eq!(form.state().error("email"), Some("Already registered"));
    assert_eq!(form.field_errors()["email"].source, ErrorSource::Manual);

    form.clear_errors(Some("email"));
    assert_eq!(form.state().error("email"), None);

    form.set_value("email", "still bad");
    assert_eq!(form.state().error("email"), Some("Invalid email"));
}

#[test]
fn clear_errors_without_path_clears_everything() {
    let form = FormEngine::builder(json!({ "a": 1, "b": { "c": 2 } }))
        .build()
        .unwrap();
    form.set_error("a", "x");
    form.set_error("b.c", "y");
    assert_eq!(form.state().errors.len(), 2);

    form.clear_errors(Some("b"));
    assert_eq!(form.state().errors.len(), 1);

    form.clear_errors(None);
    assert!(form.state().is_valid);
}

#[test]
fn global_validator_only_updates_the_triggered_scope() {
    let form = FormEngine::builder(json!({ "password": "", "confirm": "" }))
        .validator(ValidatorConfig::sync(|values: &Value| {
            let mut result = ValidationResult::Valid;
            if values.child("password").and_then(Value::as_str).unwrap_or("").len() < 8 {
                result = result.with("password", "Too short");
            }
            if values.child("confirm") != values.child("password") {
                result = result.with("confirm", "Passwords differ");
            }
            result
        }))
        .build()
        .unwrap();

    form.set_value("password", "secret");
    let state = form.state();
    assert_eq!(state.error("password"), Some("Too short"));
    assert_eq!(state.error("confirm"), None);
}

#[test]
fn trigger_restriction_limits_when_a_validator_runs() {
    let form = FormEngine::builder(json!({ "email": "" }))
        .validator(email_validator().on(&[Trigger::Blur]))
        .build()
        .unwrap();

    form.set_value("email", "bad");
    assert_eq!(form.state().error("email"), None);

    form.blur("email");
    let field = form.field_state("email");
    assert_eq!(field.error.as_deref(), Some("Invalid email"));
    assert!(field.is_touched);
    assert_eq!(field.visible_error.as_deref(), Some("Invalid email"));
}

#[test]
fn visible_error_needs_touch() {
    let form = FormEngine::builder(json!({ "email": "" }))
        .validator(email_validator())
        .build()
        .unwrap();

    form.set_value("email", "bad");
    let field = form.field_state("email");
    assert!(field.invalid);
    assert_eq!(field.visible_error, None);

    form.touch("email");
    assert_eq!(
        form.field_state("email").visible_error.as_deref(),
        Some("Invalid email")
    );
}

#[test]
fn field_rules() {
    let form = FormEngine::builder(json!({ "username": "", "age": null, "role": "" }))
        .validator(
            ValidatorConfig::rules(
                FieldRules::new()
                    .required("Username is required")
                    .min_length(3, "At least 3 characters")
                    .pattern(Regex::new("^[a-z]+$").unwrap(), "Lowercase letters only"),
            )
            .for_field("username"),
        )
        .validator(
            ValidatorConfig::rules(FieldRules::new().min(18.0, "Adults only").max(130.0, "Unlikely"))
                .for_field("age"),
        )
        .validator(
            ValidatorConfig::rules(
                FieldRules::new().one_of(vec!["admin".into(), "user".into()], "Unknown role"),
            )
            .for_field("role"),
        )
        .build()
        .unwrap();

    form.set_value("username", "");
    assert_eq!(form.state().error("username"), Some("Username is required"));
    form.set_value("username", "ab");
    assert_eq!(form.state().error("username"), Some("At least 3 characters"));
    form.set_value("username", "Abc");
    assert_eq!(form.state().error("username"), Some("Lowercase letters only"));
    form.set_value("username", "abc");
    assert_eq!(form.state().error("username"), None);

    form.set_value("age", Value::Null);
    assert_eq!(form.state().error("age"), None);
    form.set_value("age", 12);
    assert_eq!(form.state().error("age"), Some("Adults only"));
    form.set_value("age", 42.5);
    assert_eq!(form.state().error("age"), None);

    form.set_value("role", "root");
    assert_eq!(form.state().error("role"), Some("Unknown role"));
    form.set_value("role", "user");
    assert_eq!(form.state().error("role"), None);
}

#[test]
fn nested_field_validator_reports_relative_paths() {
    let form = FormEngine::builder(json!({ "address": { "city": "", "zip": "" } }))
        .validator(
            ValidatorConfig::sync(|address: &Value| {
                let mut result = ValidationResult::Valid;
                for key in ["city", "zip"] {
                    if address.child(key).is_none_or(Value::is_blank) {
                        result = result.with(key, "Required");
                    }
                }
                result
            })
            .for_field("address"),
        )
        .build()
        .unwrap();

    form.set_value("address.city", "Lyon");
    let state = form.state();
    assert_eq!(state.error("address.city"), None);
    assert_eq!(state.error("address.zip"), Some("Required"));
}

#[test]
fn validators_that_need_a_field_are_rejected_without_one() {
    let result = FormEngine::builder(json!({}))
        .validator(ValidatorConfig::rules(FieldRules::new().required("x")))
        .build();
    assert!(matches!(result, Err(FormError::InvalidConfig(_))));

    let result = FormEngine::builder(json!({}))
        .validator(email_validator().for_field("a..b"))
        .build();
    assert!(matches!(result, Err(FormError::InvalidPath { .. })));
}

#[test]
fn async_validator_without_runtime_is_a_config_error() {
    let result = FormEngine::builder(json!({ "username": "" }))
        .validator(
            ValidatorConfig::asynchronous(std::time::Duration::from_millis(10), |_: Value| async {
                Ok::<_, formstate::ValidatorFailure>(ValidationResult::Valid)
            })
            .for_field("username"),
        )
        .build();
    assert!(matches!(result, Err(FormError::InvalidConfig(_))));
}

#[tokio::test]
async fn manual_trigger_runs_every_validator() {
    let form = FormEngine::builder(json!({ "email": "bad", "name": "" }))
        .validator(email_validator().on(&[Trigger::Submit]))
        .validator(
            ValidatorConfig::rules(FieldRules::new().required("Name is required"))
                .for_field("name"),
        )
        .build()
        .unwrap();

    assert!(!form.trigger(Some(&["email"][..])).await);
    let state = form.state();
    assert_eq!(state.error("email"), Some("Invalid email"));
    assert_eq!(state.error("name"), None);

    form.set_value_with(
        "email",
        "a@b.c",
        formstate::SetValueOptions::default().validate(false),
    );
    assert!(form.trigger(Some(&["email"][..])).await);
    assert!(!form.trigger(None).await);
    assert_eq!(form.state().error("name"), Some("Name is required"));
}

#[cfg(feature = "cel-eval")]
#[test]
fn cel_rules_see_value_and_values() {
    use formstate::CelRule;

    let form = FormEngine::builder(json!({ "password": "", "confirm": "" }))
        .validator(
            ValidatorConfig::cel(
                CelRule::new("value == values.password", "Passwords differ").unwrap(),
            )
            .for_field("confirm"),
        )
        .build()
        .unwrap();

    form.set_value("password", "hunter22");
    form.set_value("confirm", "hunter2");
    assert_eq!(form.state().error("confirm"), Some("Passwords differ"));

    form.set_value("confirm", "hunter22");
    assert_eq!(form.state().error("confirm"), None);

    assert!(matches!(
        CelRule::new("value ==", "broken"),
        Err(FormError::InvalidConfig(_))
    ));
}

#[cfg(feature = "cel-eval")]
#[test]
fn compiled_cel_rule_is_reused_across_checks_and_clones() {
    use formstate::CelRule;

    let rule = CelRule::new("size(value) >= values.min", "Too short").unwrap();
    let shared = rule.clone();
    let values: Value = json!({ "min": 3 }).into();

    for (input, expected) in [("ab", Some("Too short")), ("abc", None), ("", Some("Too short"))] {
        let value = Value::from(input);
        assert_eq!(rule.check(&value, &values), expected);
        assert_eq!(shared.check(&value, &values), expected);
    }
    assert_eq!(shared.expression(), "size(value) >= values.min");

    // missing keys fail the rule instead of erroring
    assert_eq!(rule.check(&Value::from("abcd"), &Value::object()), Some("Too short"));
}

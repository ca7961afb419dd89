//! Integration tests for dispatching command lines against the demo action map

use actionmap::auth::Credentials;
use actionmap::dispatcher::{Request, RequestContext};
use actionmap::error::ErrorKind;
use actionmap::interaction::{DisplayStyle, NonInteractive, ScriptedInteraction};
use serde_json::json;

use crate::integration::{argv, Sandbox};

fn cli(words: &[&str]) -> Request {
    Request::Cli(argv(words))
}

fn with_password() -> RequestContext<'static> {
    RequestContext::new(&NonInteractive).with_credentials(Credentials::Password("demo".to_string()))
}

#[test]
fn test_create_with_password_and_tags() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let result = dispatcher
        .process(
            cli(&[
                "actionmap", "widget", "create", "bolt", "--color", "red", "--tag", "steel", "--tag",
                "m8",
            ]),
            &with_password(),
        )
        .unwrap();

    assert_eq!(result["name"], "bolt");
    assert_eq!(result["tags"], json!(["steel", "m8"]));
    let stored = sandbox.store.get("bolt").unwrap();
    assert_eq!(stored.color.as_deref(), Some("red"));
}

#[test]
fn test_prompts_for_password_then_missing_color() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let interaction = ScriptedInteraction::new(["demo", "green"]);

    let result = dispatcher
        .process(
            cli(&["actionmap", "widget", "create", "bolt"]),
            &RequestContext::new(&interaction),
        )
        .unwrap();

    assert_eq!(result["color"], "green");
    assert_eq!(interaction.prompts(), vec!["password", "widget_color"]);
    assert!(interaction
        .displayed()
        .contains(&(DisplayStyle::Success, "Widget created 'bolt'".to_string())));
}

#[test]
fn test_authentication_required_without_prompting() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let err = dispatcher
        .process(
            cli(&["actionmap", "widget", "create", "bolt", "-c", "red"]),
            &RequestContext::new(&NonInteractive),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(sandbox.store.is_empty(), "nothing runs before authentication");
}

#[test]
fn test_public_actions_skip_authentication() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let ctx = RequestContext::new(&NonInteractive);
    let result = dispatcher
        .process(cli(&["actionmap", "widget", "list", "--limit", "5"]), &ctx)
        .unwrap();
    assert_eq!(result, json!({"widgets": []}));

    let err = dispatcher
        .process(cli(&["actionmap", "widget", "show", "bolt"]), &ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Action);
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_argument_types_and_choices_are_enforced() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let ctx = RequestContext::new(&NonInteractive);

    let err = dispatcher
        .process(cli(&["actionmap", "widget", "list", "--limit", "many"]), &ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = dispatcher
        .process(cli(&["actionmap", "widget", "list", "--color", "purple"]), &ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_deprecated_alias_shows_comment() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let ctx = with_password();
    dispatcher
        .process(cli(&["actionmap", "widget", "create", "bolt", "-c", "red"]), &ctx)
        .unwrap();

    let interaction = ScriptedInteraction::new(Vec::<String>::new());
    let ctx = RequestContext::new(&interaction)
        .with_credentials(Credentials::Password("demo".to_string()));
    let result = dispatcher
        .process(cli(&["actionmap", "widget", "remove", "bolt"]), &ctx)
        .unwrap();

    assert!(result.is_null());
    assert!(sandbox.store.is_empty());
    assert!(interaction
        .displayed()
        .iter()
        .any(|(style, message)| *style == DisplayStyle::Info
            && message == "widget_delete_warning"));
}

#[test]
fn test_subcategory_action_and_required_extra() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let ctx = with_password();
    dispatcher
        .process(cli(&["actionmap", "widget", "create", "bolt", "-c", "blue"]), &ctx)
        .unwrap();

    let err = dispatcher
        .process(cli(&["actionmap", "widget", "part", "add", "bolt"]), &ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("part"));

    let result = dispatcher
        .process(
            cli(&["actionmap", "widget", "part", "add", "bolt", "--part", "nut", "--part", "washer"]),
            &ctx,
        )
        .unwrap();
    assert_eq!(result["parts"], json!(["nut", "washer"]));
}

#[test]
fn test_global_dry_run_changes_nothing() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let result = dispatcher
        .process(
            cli(&["actionmap", "widget", "create", "bolt", "-c", "red", "--dry-run"]),
            &with_password(),
        )
        .unwrap();
    assert_eq!(result["name"], "bolt");
    assert!(sandbox.store.is_empty());
}

#[test]
fn test_lock_file_removed_after_locked_action() {
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    dispatcher
        .process(cli(&["actionmap", "widget", "create", "bolt", "-c", "red"]), &with_password())
        .unwrap();
    assert!(!sandbox.paths.runtime_dir.join("demo.lock").exists());
}

//! Integration tests for the HTTP route table built from loaded action maps

use actionmap::actionmap::ActionMapLoader;
use actionmap::error::{ConfigError, ValidationError};
use actionmap::frontend::http::{RequestParams, RouteTable};
use actionmap::types::{ActionId, ArgValue};
use std::fs;
use std::sync::Arc;

use crate::integration::Sandbox;

fn table_with(sandbox: &Sandbox, namespace: &str, document: &str) -> Result<RouteTable, ConfigError> {
    fs::write(
        sandbox.paths.actionsmap_dir().join(format!("{}.yml", namespace)),
        document,
    )
    .unwrap();
    let tree = ActionMapLoader::from_paths(&sandbox.paths)
        .load_all(&[namespace.to_string()])?;
    RouteTable::build(Arc::new(tree))
}

fn params(pairs: &[(&str, &str)]) -> RequestParams {
    let mut params = RequestParams::new();
    for (key, value) in pairs {
        params
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    params
}

#[test]
fn test_demo_routes() {
    let sandbox = Sandbox::new();
    let table = RouteTable::build(sandbox.tree()).unwrap();
    assert_eq!(table.routes().len(), 5);

    let (route, captured) = table.resolve("GET", "/widgets/bolt").unwrap();
    assert_eq!(route.id, ActionId::new("demo", "widget", "show"));
    assert_eq!(captured.get("name").map(String::as_str), Some("bolt"));

    let (route, captured) = table.resolve("POST", "/widgets/bolt/parts").unwrap();
    assert_eq!(
        route.id,
        ActionId::with_subcategory("demo", "widget", "part", "add")
    );
    assert_eq!(captured.get("widget").map(String::as_str), Some("bolt"));

    assert!(table.resolve("PATCH", "/widgets").is_none());
    assert!(table.resolve("GET", "/gadgets").is_none());
}

#[test]
fn test_query_parameters_become_arguments() {
    let sandbox = Sandbox::new();
    let table = RouteTable::build(sandbox.tree()).unwrap();

    let request = table
        .parse(
            "GET",
            "/widgets",
            &params(&[("color", "red"), ("limit", "2")]),
        )
        .unwrap();
    assert_eq!(request.args.str("color"), Some("red"));
    assert_eq!(request.args.int("limit"), Some(2));

    let request = table
        .parse(
            "POST",
            "/widgets/bolt/parts",
            &params(&[("part", "nut"), ("part", "washer"), ("dry_run", "true")]),
        )
        .unwrap();
    assert_eq!(request.args.str("widget"), Some("bolt"));
    assert_eq!(request.args.list("part"), vec!["nut", "washer"]);
    assert!(request.globals.flag("dry_run"));
}

#[test]
fn test_invalid_values_and_unknown_routes() {
    let sandbox = Sandbox::new();
    let table = RouteTable::build(sandbox.tree()).unwrap();

    let err = table
        .parse("GET", "/widgets", &params(&[("limit", "lots")]))
        .unwrap_err();
    assert!(matches!(err, ValidationError::Invalid { .. }));

    let err = table
        .parse("GET", "/widgets", &params(&[("color", "purple")]))
        .unwrap_err();
    assert!(matches!(err, ValidationError::Invalid { argument, .. } if argument == "color"));

    let err = table.parse("DELETE", "/widgets", &RequestParams::new()).unwrap_err();
    assert!(matches!(err, ValidationError::UnknownRoute { .. }));
}

#[test]
fn test_literal_segments_win() {
    let sandbox = Sandbox::new();
    let table = table_with(
        &sandbox,
        "catalog",
        r#"
_global:
  configuration:
    authenticate: false
item:
  actions:
    show:
      api: GET /catalog/<item>
      arguments:
        item: {}
    featured:
      api: GET /catalog/featured
"#,
    )
    .unwrap();

    let (route, _) = table.resolve("GET", "/catalog/featured").unwrap();
    assert_eq!(route.id, ActionId::new("catalog", "item", "featured"));
    let (route, captured) = table.resolve("GET", "/catalog/lamp").unwrap();
    assert_eq!(route.id, ActionId::new("catalog", "item", "show"));
    assert_eq!(captured.get("item").map(String::as_str), Some("lamp"));
}

#[test]
fn test_duplicate_route_is_rejected() {
    let sandbox = Sandbox::new();
    let result = table_with(
        &sandbox,
        "clash",
        r#"
_global:
  configuration:
    authenticate: false
item:
  actions:
    show:
      api: GET /items/<id>
      arguments:
        id: {}
    get:
      api: GET /items/<key>
      arguments:
        key: {}
"#,
    );
    assert!(matches!(result, Err(ConfigError::DuplicateRoute { .. })));
}

#[test]
fn test_action_whose_routes_are_all_invalid() {
    let sandbox = Sandbox::new();
    let result = table_with(
        &sandbox,
        "broken",
        r#"
_global:
  configuration:
    authenticate: false
item:
  actions:
    show:
      api: FETCH items
"#,
    );
    assert!(matches!(result, Err(ConfigError::NoValidRoute(_))));
}

#[test]
fn test_path_arguments_are_typed() {
    let sandbox = Sandbox::new();
    let table = table_with(
        &sandbox,
        "orders",
        r#"
_global:
  configuration:
    authenticate: false
order:
  actions:
    show:
      api: GET /orders/<number>
      arguments:
        number:
          type: int
"#,
    )
    .unwrap();

    let request = table
        .parse("GET", "/orders/42", &RequestParams::new())
        .unwrap();
    assert_eq!(request.args.get("number"), Some(&ArgValue::Int(42)));
    assert!(table.parse("GET", "/orders/x", &RequestParams::new()).is_err());
}

//! Properties of HTTP route resolution

use actionmap::frontend::http::{RequestParams, RouteTable};
use actionmap::types::ActionId;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use proptest::prelude::*;

use super::demo_tree;

/// Any single segment after `/widgets/` reaches `show`, decoded.
#[test]
fn test_path_parameters_are_captured() {
    let table = RouteTable::build(demo_tree()).unwrap();
    let show = ActionId::new("demo", "widget", "show");
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&"[a-zA-Z0-9 ._-]{1,20}", |name| {
            prop_assume!(!name.trim().is_empty());
            let path = format!("/widgets/{}", utf8_percent_encode(&name, NON_ALPHANUMERIC));
            let (route, captured) = table.resolve("GET", &path).unwrap();
            assert_eq!(route.id, show);
            assert_eq!(captured.get("name"), Some(&name));

            let request = table.parse("GET", &path, &RequestParams::new()).unwrap();
            assert_eq!(request.args.str("name"), Some(name.as_str()));
            Ok(())
        })
        .unwrap();
}

/// Paths outside the declared shapes never resolve.
#[test]
fn test_undeclared_paths_do_not_resolve() {
    let table = RouteTable::build(demo_tree()).unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&proptest::collection::vec("[a-z]{1,6}", 0..5), |segments| {
            let path = format!("/gadgets/{}", segments.join("/"));
            for method in ["GET", "POST", "PUT", "DELETE"] {
                assert!(table.resolve(method, &path).is_none());
            }
            Ok(())
        })
        .unwrap();
}

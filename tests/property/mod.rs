//! Property-based tests for argument handling, routing and sessions

mod routes;
mod sessions;

use actionmap::actionmap::compile::compile;
use actionmap::actionmap::document::parse;
use actionmap::actionmap::ActionTree;
use actionmap::demo::{DEMO_DOCUMENT, NAMESPACE};
use std::sync::Arc;

/// The demo namespace, compiled in memory.
pub fn demo_tree() -> Arc<ActionTree> {
    let mut tree = ActionTree::new();
    tree.insert(compile(NAMESPACE, parse(NAMESPACE, DEMO_DOCUMENT).unwrap()).unwrap());
    Arc::new(tree)
}

//! Integration tests for the compiled action map cache

use actionmap::actionmap::{ActionMapLoader, Fingerprint, LoadSource};
use actionmap::error::ConfigError;
use actionmap::types::ActionId;
use std::fs;

use crate::integration::Sandbox;

const OPS_DOCUMENT: &str = r#"
_global:
  configuration:
    authenticate: false
    lock: false
service:
  actions:
    restart:
      arguments:
        name: {}
"#;

fn artifacts(sandbox: &Sandbox) -> Vec<String> {
    let dir = sandbox.paths.cache_actionsmap_dir();
    let mut names: Vec<String> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

#[test]
fn test_second_load_is_served_from_cache() {
    let sandbox = Sandbox::new();
    let loader = sandbox.loader();

    let (compiled, source) = loader.load_with_source("demo").unwrap();
    assert_eq!(source, LoadSource::Compiled);

    let fingerprint = Fingerprint::of(&loader.document_path("demo")).unwrap();
    assert!(loader.cache_path("demo", fingerprint).exists());

    let (cached, source) = loader.load_with_source("demo").unwrap();
    assert_eq!(source, LoadSource::Cache);
    assert_eq!(compiled, cached, "cached tree must equal the compiled one");
}

#[test]
fn test_edited_document_is_recompiled() {
    let sandbox = Sandbox::new();
    let loader = sandbox.loader();
    loader.load("demo").unwrap();
    assert_eq!(artifacts(&sandbox).len(), 1);

    let path = loader.document_path("demo");
    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str(
        r#"
gadget:
  actions:
    list:
      configuration:
        authenticate: false
"#,
    );
    fs::write(&path, text).unwrap();

    let (tree, source) = loader.load_with_source("demo").unwrap();
    assert_eq!(source, LoadSource::Compiled);
    assert!(tree.category("gadget").is_some());
    assert_eq!(
        artifacts(&sandbox).len(),
        1,
        "stale artifacts are replaced, not accumulated"
    );
}

#[test]
fn test_corrupt_artifact_is_regenerated() {
    let sandbox = Sandbox::new();
    let loader = sandbox.loader();
    loader.load("demo").unwrap();

    let fingerprint = Fingerprint::of(&loader.document_path("demo")).unwrap();
    let artifact = loader.cache_path("demo", fingerprint);
    fs::write(&artifact, b"not a tree").unwrap();

    let (tree, source) = loader.load_with_source("demo").unwrap();
    assert_eq!(source, LoadSource::Compiled);
    assert!(tree.category("widget").is_some());

    let (_, source) = loader.load_with_source("demo").unwrap();
    assert_eq!(source, LoadSource::Cache);
}

#[test]
fn test_cache_disabled_never_writes() {
    let sandbox = Sandbox::new();
    let loader = sandbox.loader().use_cache(false);
    for _ in 0..2 {
        let (_, source) = loader.load_with_source("demo").unwrap();
        assert_eq!(source, LoadSource::Compiled);
    }
    assert!(artifacts(&sandbox).is_empty());
}

#[test]
fn test_load_all_merges_namespaces() {
    let sandbox = Sandbox::new();
    fs::write(sandbox.paths.actionsmap_dir().join("ops.yml"), OPS_DOCUMENT).unwrap();
    let loader = ActionMapLoader::from_paths(&sandbox.paths);

    assert_eq!(loader.namespaces().unwrap(), vec!["demo", "ops"]);
    let tree = loader.load_all(&[]).unwrap();
    assert!(tree
        .action(&ActionId::new("ops", "service", "restart"))
        .is_some());
    assert!(tree
        .action(&ActionId::new("demo", "widget", "create"))
        .is_some());

    let only_ops = loader.load_all(&["ops".to_string()]).unwrap();
    assert_eq!(only_ops.namespaces().count(), 1);
}

#[test]
fn test_unknown_namespace() {
    let sandbox = Sandbox::new();
    let result = sandbox.loader().load_all(&["missing".to_string()]);
    assert!(matches!(result, Err(ConfigError::NamespaceNotFound(name)) if name == "missing"));

    let result = sandbox.loader().load("../demo");
    assert!(matches!(result, Err(ConfigError::NamespaceNotFound(_))));
}

#[test]
fn test_malformed_document_reports_namespace() {
    let sandbox = Sandbox::new();
    fs::write(
        sandbox.paths.actionsmap_dir().join("broken.yml"),
        "widget: [not, a, category",
    )
    .unwrap();
    let err = sandbox.loader().load("broken").unwrap_err();
    assert!(
        err.to_string().contains("broken"),
        "error should name the namespace: {}",
        err
    );
}

//! Integration tests for layered runtime configuration

use actionmap::config::{xdg, ConfigLoader};
use actionmap::error::ConfigError;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use crate::integration::{with_env_var, with_xdg_env};

#[test]
fn test_explicit_file_sets_every_section() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("actionmap.toml");
    fs::write(
        &config_file,
        r#"
[paths]
data_dir = "/srv/actionmap/data"
cache_dir = "/var/cache/actionmap"
runtime_dir = "/run/actionmap"

[lock]
poll_interval_ms = 50
cli_timeout_secs = 10

[http]
bind = "0.0.0.0:8080"
secure_cookies = false

[logging]
level = "debug"
format = "json"
output = "file"
file = "/var/log/actionmap.log"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert_eq!(config.paths.data_dir, PathBuf::from("/srv/actionmap/data"));
    assert_eq!(
        config.paths.session_dir(),
        PathBuf::from("/var/cache/actionmap/session")
    );
    assert_eq!(config.lock.poll_interval(), Duration::from_millis(50));
    assert_eq!(config.lock.cli_timeout(), Some(Duration::from_secs(10)));
    assert_eq!(config.lock.http_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.http.bind, "0.0.0.0:8080");
    assert!(!config.http.secure_cookies);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, PathBuf::from("/var/log/actionmap.log"));
}

#[test]
fn test_defaults_without_any_file() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config.http.bind, "127.0.0.1:6787");
        assert!(config.http.secure_cookies);
        assert_eq!(config.lock.cli_timeout(), None);
        assert_eq!(config.logging.level, "warn");
    });
}

#[test]
fn test_global_file_then_explicit_file_then_environment() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let global = xdg::config_home().unwrap().join("config.toml");
        assert_eq!(global, temp_dir.path().join("actionmap").join("config.toml"));
        fs::write(
            &global,
            "[http]\nbind = \"127.0.0.1:7000\"\n\n[lock]\npoll_interval_ms = 25\n",
        )
        .unwrap();

        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config.http.bind, "127.0.0.1:7000");
        assert_eq!(config.lock.poll_interval_ms, 25);

        let explicit = temp_dir.path().join("explicit.toml");
        fs::write(&explicit, "[http]\nbind = \"127.0.0.1:7001\"\n").unwrap();
        let config = ConfigLoader::load(Some(&explicit)).unwrap();
        assert_eq!(config.http.bind, "127.0.0.1:7001");
        assert_eq!(
            config.lock.poll_interval_ms, 25,
            "keys absent from the explicit file keep the global value"
        );
    });

    with_env_var(&temp_dir, "ACTIONMAP__HTTP__BIND", "127.0.0.1:7002", || {
        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config.http.bind, "127.0.0.1:7002");
    });
}

#[test]
fn test_invalid_values_are_all_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("bad.toml");
    fs::write(
        &config_file,
        r#"
[http]
bind = "everywhere"

[logging]
level = "loud"
output = "printer"
"#,
    )
    .unwrap();

    match ConfigLoader::load_from_file(&config_file) {
        Err(ConfigError::Invalid(problems)) => {
            assert_eq!(problems.len(), 3, "problems: {:?}", problems);
            assert!(problems.iter().any(|p| p.contains("http.bind")));
            assert!(problems.iter().any(|p| p.contains("logging.level")));
            assert!(problems.iter().any(|p| p.contains("logging.output")));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_unparseable_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("broken.toml");
    fs::write(&config_file, "[http\nbind = ").unwrap();
    assert!(ConfigLoader::load_from_file(&config_file).is_err());
}

//! Shared test utilities for integration tests
//!
//! Provides isolated configuration directories and a ready-made demo sandbox so each
//! test builds its dispatcher the same way the binaries do.

use actionmap::actionmap::{ActionMapLoader, ActionTree};
use actionmap::auth::{AuthService, AuthenticatorRegistry, SessionStore};
use actionmap::config::PathsConfig;
use actionmap::demo::{self, WidgetStore};
use actionmap::dispatcher::{Dispatcher, LockSettings};
use actionmap::registry::ActionRegistry;
use clap::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: [&str; 3] = ["HOME", "XDG_CONFIG_HOME", "ACTIONMAP__HTTP__BIND"];

/// Environment variable state to restore after test
struct EnvState {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            saved: ISOLATED_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.saved {
            match value {
                Some(orig) => std::env::set_var(name, orig),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with `HOME` and `XDG_CONFIG_HOME` pointing into `test_dir`.
///
/// The global config file is read from `<test_dir>/actionmap/config.toml`. The original
/// environment is restored afterwards, and a global mutex keeps parallel tests apart.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(test_dir.path().join("actionmap")).unwrap();

    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().to_str().unwrap());
    std::env::remove_var("ACTIONMAP__HTTP__BIND");

    let result = f();

    env_state.restore();

    result
}

/// Set one extra variable for the duration of `f`, on top of [`with_xdg_env`].
pub fn with_env_var<F, R>(test_dir: &TempDir, name: &str, value: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    with_xdg_env(test_dir, || {
        std::env::set_var(name, value);
        f()
    })
}

/// A temp directory holding the demo action map, its cache, sessions and locks.
pub struct Sandbox {
    _temp_dir: TempDir,
    pub paths: PathsConfig,
    pub store: Arc<WidgetStore>,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let paths = PathsConfig::rooted_at(temp_dir.path());
        demo::install(&paths.data_dir).unwrap();
        Self {
            _temp_dir: temp_dir,
            paths,
            store: Arc::new(WidgetStore::new()),
        }
    }

    pub fn loader(&self) -> ActionMapLoader {
        ActionMapLoader::from_paths(&self.paths)
    }

    pub fn tree(&self) -> Arc<ActionTree> {
        Arc::new(self.loader().load_all(&[]).unwrap())
    }

    pub fn registry(&self) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        demo::register(&mut registry, self.store.clone()).unwrap();
        registry
    }

    pub fn auth(&self, tree: &ActionTree) -> Arc<AuthService> {
        Arc::new(
            AuthService::from_tree(
                tree,
                AuthenticatorRegistry::with_builtins(),
                SessionStore::new(self.paths.session_dir()),
            )
            .unwrap(),
        )
    }

    pub fn locks(&self) -> LockSettings {
        LockSettings::new(&self.paths.runtime_dir).with_poll_interval(Duration::from_millis(10))
    }

    pub fn cli_dispatcher(&self) -> Dispatcher {
        let tree = self.tree();
        let auth = self.auth(&tree);
        Dispatcher::for_cli(
            tree,
            Command::new("actionmap"),
            self.registry(),
            auth,
            self.locks(),
        )
        .unwrap()
    }

    pub fn http_dispatcher(&self) -> Dispatcher {
        let tree = self.tree();
        let auth = self.auth(&tree);
        Dispatcher::for_http(tree, self.registry(), auth, self.locks()).unwrap()
    }
}

/// Owned argv from words.
pub fn argv(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

//! Actionmap HTTP Server Binary
//!
//! Serves every declared route of the installed action maps.

use actionmap::actionmap::ActionMapLoader;
use actionmap::auth::{AuthService, AuthenticatorRegistry, SessionStore};
use actionmap::config::{ActionMapConfig, ConfigLoader};
use actionmap::demo::{self, WidgetStore};
use actionmap::dispatcher::{Dispatcher, LockSettings};
use actionmap::lock::release_held_locks;
use actionmap::logging::init_logging;
use actionmap::registry::ActionRegistry;
use actionmap::server::{self, ServerState};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Actionmap HTTP server
#[derive(Parser)]
#[command(name = "actionmapd", version)]
#[command(about = "Serve action maps over HTTP")]
struct Args {
    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides http.bind)
    #[arg(long)]
    bind: Option<String>,

    /// Namespace to serve; repeat for several (default: every installed action map)
    #[arg(long = "namespace")]
    namespaces: Vec<String>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,
}

fn build_state(config: &ActionMapConfig, namespaces: &[String]) -> anyhow::Result<ServerState> {
    let loader = ActionMapLoader::from_paths(&config.paths);
    if loader.namespaces()?.is_empty() {
        demo::install(&config.paths.data_dir)?;
    }
    let tree = Arc::new(loader.load_all(namespaces)?);

    let mut registry = ActionRegistry::new();
    demo::register(&mut registry, Arc::new(WidgetStore::new()))?;

    let auth = Arc::new(AuthService::from_tree(
        &tree,
        AuthenticatorRegistry::with_builtins(),
        SessionStore::new(config.paths.session_dir()),
    )?);
    let locks =
        LockSettings::new(&config.paths.runtime_dir).with_poll_interval(config.lock.poll_interval());
    let dispatcher = Dispatcher::for_http(tree, registry, auth, locks)?;

    Ok(ServerState::new(dispatcher)
        .with_secure_cookies(config.http.secure_cookies)
        .with_lock_timeout(config.lock.http_timeout()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ConfigLoader::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(Some(&config.logging)).context("initializing logging")?;

    let state = build_state(&config, &args.namespaces).context("building the route table")?;
    let bind = args.bind.unwrap_or_else(|| config.http.bind.clone());
    info!(bind = %bind, "Actionmap server starting");

    let served = server::serve(Arc::new(state), &bind).await;
    let released = release_held_locks();
    if released > 0 {
        info!(released, "Released held locks");
    }
    served.with_context(|| format!("serving on {}", bind))
}

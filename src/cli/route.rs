//! CLI route: run context. Loads the action maps, builds the dispatcher and runs one
//! command line through it.

use crate::actionmap::ActionMapLoader;
use crate::auth::{AuthService, AuthenticatorRegistry, Credentials, SessionStore};
use crate::cli::output::OutputFormat;
use crate::cli::parse::{root_command, GlobalArgs};
use crate::config::ActionMapConfig;
use crate::demo;
use crate::dispatcher::{Dispatcher, FrontEnd, LockSettings, RequestContext};
use crate::error::{ConfigError, DispatchError, ValidationError};
use crate::interaction::Interaction;
use crate::registry::ActionRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What one command line produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CliOutcome {
    /// Help or version text rendered by clap
    Help(String),
    Result { value: Value, format: OutputFormat },
}

/// Runtime context for CLI execution: configuration and the dispatcher built from it.
pub struct RunContext {
    config: ActionMapConfig,
    bootstrap: GlobalArgs,
    dispatcher: Dispatcher,
}

impl RunContext {
    /// Load the requested namespaces (all installed ones by default). The demo map is
    /// installed when nothing else is.
    pub fn new(
        config: ActionMapConfig,
        bootstrap: GlobalArgs,
        registry: ActionRegistry,
    ) -> Result<Self, DispatchError> {
        let loader = ActionMapLoader::from_paths(&config.paths).use_cache(!bootstrap.no_cache);
        if loader.namespaces()?.is_empty() {
            demo::install(&config.paths.data_dir)?;
        }
        let tree = Arc::new(loader.load_all(&bootstrap.namespaces)?);
        info!(
            namespaces = tree.namespaces().count(),
            actions = tree.actions().count(),
            "Action maps loaded"
        );

        let auth = Arc::new(AuthService::from_tree(
            &tree,
            AuthenticatorRegistry::with_builtins(),
            SessionStore::new(config.paths.session_dir()),
        )?);
        let locks = LockSettings::new(&config.paths.runtime_dir)
            .with_poll_interval(config.lock.poll_interval());
        let dispatcher = Dispatcher::for_cli(tree, root_command(), registry, auth, locks)?;

        Ok(Self {
            config,
            bootstrap,
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &ActionMapConfig {
        &self.config
    }

    /// Parse `argv` (program name first) and run the selected action.
    pub fn execute(
        &self,
        argv: &[String],
        interaction: &dyn Interaction,
    ) -> Result<CliOutcome, DispatchError> {
        let FrontEnd::Cli(cli) = self.dispatcher.front_end() else {
            return Err(ConfigError::Settings("CLI run context without a CLI tree".to_string()).into());
        };
        let (request, matches) = match cli.parse_matches(argv) {
            Ok(parsed) => parsed,
            Err(exit) if !exit.is_error() => return Ok(CliOutcome::Help(exit.text)),
            Err(exit) => return Err(ValidationError::Usage(exit.text).into()),
        };
        let globals = GlobalArgs::from_matches(&matches).unwrap_or_else(|| self.bootstrap.clone());
        debug!(action = %request.id, "Command line parsed");

        let credentials = globals
            .password
            .clone()
            .map(Credentials::Password)
            .unwrap_or_default();
        let lock_timeout = globals
            .timeout
            .map(Duration::from_secs)
            .or_else(|| self.config.lock.cli_timeout());
        let ctx = RequestContext::new(interaction)
            .with_credentials(credentials)
            .with_lock_timeout(lock_timeout);

        let value = self.dispatcher.dispatch(request, &ctx)?;
        Ok(CliOutcome::Result {
            value,
            format: OutputFormat::from_flag(globals.output_as.as_deref()),
        })
    }
}

//! Request dispatch: parse, authenticate, lock, validate, invoke.
//!
//! One `Dispatcher` serves one interface. The CLI binary builds it around a
//! `CliTree`, the HTTP server around a `RouteTable`; both share everything after
//! parsing.

use crate::actionmap::tree::{ActionSpec, ActionTree};
use crate::auth::{AuthInfo, AuthService, Credentials};
use crate::error::{AuthError, ConfigError, DispatchError, ValidationError};
use crate::frontend::cli::CliTree;
use crate::frontend::http::{RequestParams, RouteTable};
use crate::frontend::{Arguments, ParsedRequest};
use crate::interaction::{Interaction, PromptKind};
use crate::lock::{ExecutionLock, LockGuard, DEFAULT_POLL_INTERVAL};
use crate::params::{ExtraParam, Pipeline};
use crate::registry::{ActionRegistry, Invocation};
use crate::types::Interface;
use clap::Command;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

const REDACTED: &str = "**********";

/// The parser a dispatcher reads requests with.
#[derive(Debug, Clone)]
pub enum FrontEnd {
    Cli(CliTree),
    Http(RouteTable),
}

impl FrontEnd {
    pub fn interface(&self) -> Interface {
        match self {
            FrontEnd::Cli(_) => Interface::Cli,
            FrontEnd::Http(_) => Interface::Api,
        }
    }
}

/// Where lock files live and how often a waiting request looks again.
#[derive(Debug, Clone)]
pub struct LockSettings {
    pub runtime_dir: PathBuf,
    pub poll_interval: Duration,
}

impl LockSettings {
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn lock_for(&self, namespace: &str) -> ExecutionLock {
        ExecutionLock::new(&self.runtime_dir, namespace).with_poll_interval(self.poll_interval)
    }
}

/// One request as it arrives from a front end.
#[derive(Debug, Clone)]
pub enum Request {
    Cli(Vec<String>),
    Http {
        method: String,
        path: String,
        params: RequestParams,
    },
}

/// Per-request inputs that are not part of the parsed arguments.
pub struct RequestContext<'a> {
    pub interaction: &'a dyn Interaction,
    pub credentials: Credentials,
    /// `None` waits for the lock indefinitely
    pub lock_timeout: Option<Duration>,
}

impl<'a> RequestContext<'a> {
    pub fn new(interaction: &'a dyn Interaction) -> Self {
        Self {
            interaction,
            credentials: Credentials::None,
            lock_timeout: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

pub struct Dispatcher {
    tree: Arc<ActionTree>,
    front_end: FrontEnd,
    pipeline: Pipeline,
    registry: ActionRegistry,
    auth: Arc<AuthService>,
    locks: LockSettings,
}

impl Dispatcher {
    /// CLI dispatcher; `root` carries the program's own options.
    pub fn for_cli(
        tree: Arc<ActionTree>,
        root: Command,
        registry: ActionRegistry,
        auth: Arc<AuthService>,
        locks: LockSettings,
    ) -> Result<Self, ConfigError> {
        let cli = CliTree::build_with_root(tree.clone(), root)?;
        Ok(Self::new(tree, FrontEnd::Cli(cli), registry, auth, locks))
    }

    pub fn for_http(
        tree: Arc<ActionTree>,
        registry: ActionRegistry,
        auth: Arc<AuthService>,
        locks: LockSettings,
    ) -> Result<Self, ConfigError> {
        let routes = RouteTable::build(tree.clone())?;
        Ok(Self::new(tree, FrontEnd::Http(routes), registry, auth, locks))
    }

    fn new(
        tree: Arc<ActionTree>,
        front_end: FrontEnd,
        registry: ActionRegistry,
        auth: Arc<AuthService>,
        locks: LockSettings,
    ) -> Self {
        for id in registry.missing(&tree) {
            debug!(action = %id, "No function registered");
        }
        Self {
            pipeline: Pipeline::for_interface(front_end.interface()),
            tree,
            front_end,
            registry,
            auth,
            locks,
        }
    }

    pub fn interface(&self) -> Interface {
        self.front_end.interface()
    }

    pub fn tree(&self) -> &Arc<ActionTree> {
        &self.tree
    }

    pub fn front_end(&self) -> &FrontEnd {
        &self.front_end
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    /// Parse a raw request and dispatch it. CLI help comes back as a string result.
    pub fn process(&self, request: Request, ctx: &RequestContext<'_>) -> Result<Value, DispatchError> {
        let parsed = match (request, &self.front_end) {
            (Request::Cli(argv), FrontEnd::Cli(cli)) => match cli.parse(argv) {
                Ok(parsed) => parsed,
                Err(exit) if !exit.is_error() => return Ok(Value::String(exit.text)),
                Err(exit) => return Err(ValidationError::Usage(exit.text).into()),
            },
            (Request::Http { method, path, params }, FrontEnd::Http(routes)) => {
                routes.parse(&method, &path, &params)?
            }
            (_, front_end) => {
                return Err(ConfigError::Settings(format!(
                    "request does not match the {} interface",
                    front_end.interface()
                ))
                .into())
            }
        };
        self.dispatch(parsed, ctx)
    }

    /// Run an already parsed request.
    pub fn dispatch(&self, request: ParsedRequest, ctx: &RequestContext<'_>) -> Result<Value, DispatchError> {
        let ParsedRequest {
            id,
            mut args,
            mut globals,
        } = request;
        let action = self
            .tree
            .action(&id)
            .ok_or_else(|| DispatchError::ActionResolution(id.clone()))?;

        let log_id = format!(
            "{}.{}",
            std::process::id(),
            REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        info!("processing action [{}]: {}", log_id, id);
        debug!(arguments = %redacted(action, &args), "Action arguments");
        let started = Instant::now();

        let auth = if action.config.authenticate.applies_to(self.interface()) {
            Some(self.authenticate(&action.config.authenticator, ctx)?)
        } else {
            None
        };

        let _guard: Option<LockGuard> = if action.config.lock {
            Some(self.locks.lock_for(&id.namespace).acquire(ctx.lock_timeout)?)
        } else {
            None
        };

        self.pipeline.run(
            self.tree.global_arguments(&id),
            action,
            &mut args,
            &mut globals,
            ctx.interaction,
        )?;

        let function = self
            .registry
            .get(&id)
            .ok_or_else(|| DispatchError::ActionResolution(id.clone()))?;
        let result = function(&Invocation {
            id: &id,
            args: &args,
            globals: &globals,
            auth: auth.as_ref(),
            interaction: ctx.interaction,
        });

        debug!(
            "action [{}] executed in {:.3}s",
            log_id,
            started.elapsed().as_secs_f64()
        );
        result.map_err(Into::into)
    }

    fn authenticate(&self, profile: &str, ctx: &RequestContext<'_>) -> Result<AuthInfo, AuthError> {
        match &ctx.credentials {
            Credentials::Password(password) => self.auth.login(profile, password, false),
            Credentials::Session { id, tokens } => match tokens.get(profile) {
                Some(token) => self.auth.authenticate_session(profile, id, token),
                None => Err(AuthError::AuthenticationRequired(profile.to_string())),
            },
            Credentials::None => {
                if !ctx.interaction.can_prompt() {
                    return Err(AuthError::AuthenticationRequired(profile.to_string()));
                }
                let key = self
                    .auth
                    .profile(profile)?
                    .help
                    .clone()
                    .unwrap_or_else(|| "password".to_string());
                let message = ctx.interaction.translate(&key);
                match ctx
                    .interaction
                    .prompt(&message, PromptKind::Password { confirm: false })
                {
                    Ok(Some(password)) => self.auth.login(profile, &password, false),
                    _ => Err(AuthError::AuthenticationRequired(profile.to_string())),
                }
            }
        }
    }
}

/// Arguments as JSON with password-prompted values masked.
fn redacted(action: &ActionSpec, args: &Arguments) -> Value {
    let mut value = args.to_json();
    if let Value::Object(map) = &mut value {
        for spec in &action.arguments {
            let secret = spec
                .extras
                .iter()
                .any(|p| matches!(p, ExtraParam::Password(_)));
            if secret {
                if let Some(entry) = map.get_mut(&spec.name) {
                    if !entry.is_null() {
                        *entry = Value::String(REDACTED.to_string());
                    }
                }
            }
        }
    }
    value
}

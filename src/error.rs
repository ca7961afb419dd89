//! Error types for the action-tree dispatcher.

use crate::types::ActionId;
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors (cache artifacts, session files)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unsupported artifact version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Action-map document and runtime configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Action map for namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Failed to read action map {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed action map '{namespace}': {message}")]
    Malformed { namespace: String, message: String },

    #[error("Invalid argument '{argument}' in {owner}: {message}")]
    InvalidArgument {
        owner: String,
        argument: String,
        message: String,
    },

    #[error("Invalid extra parameter '{param}' for argument '{argument}': {message}")]
    InvalidExtra {
        argument: String,
        param: String,
        message: String,
    },

    #[error("No valid HTTP route for action {0}")]
    NoValidRoute(ActionId),

    #[error("Route {method} {path} is claimed by both {first} and {second}")]
    DuplicateRoute {
        method: String,
        path: String,
        first: ActionId,
        second: ActionId,
    },

    #[error("Command '{name}' is declared by both '{first}' and '{second}'")]
    CommandConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("Unknown authenticator profile '{profile}' referenced by {owner}")]
    UnknownProfile { profile: String, owner: String },

    #[error("Authenticator profile '{0}' is defined differently by two namespaces")]
    ProfileConflict(String),

    #[error("Unknown authenticator vendor '{vendor}' for profile '{profile}'")]
    UnknownVendor { vendor: String, profile: String },

    #[error("Configuration error: {0}")]
    Settings(String),

    #[error("{} configuration problem(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Settings(err.to_string())
    }
}

/// Errors raised while parsing and validating request arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Argument '{argument}' is required")]
    Required { argument: String },

    #[error("Invalid value for argument '{argument}': {message}")]
    Invalid { argument: String, message: String },

    #[error("Values for argument '{argument}' do not match")]
    Mismatch { argument: String },

    #[error("Invalid extra parameter '{param}' for argument '{argument}': {message}")]
    BadExtra {
        argument: String,
        param: String,
        message: String,
    },

    #[error("Unknown route: {method} {path}")]
    UnknownRoute { method: String, path: String },

    #[error("{0}")]
    Usage(String),
}

impl ValidationError {
    /// Name of the argument that failed, if any.
    pub fn argument(&self) -> Option<&str> {
        match self {
            ValidationError::Required { argument }
            | ValidationError::Invalid { argument, .. }
            | ValidationError::Mismatch { argument }
            | ValidationError::BadExtra { argument, .. } => Some(argument),
            ValidationError::UnknownRoute { .. } | ValidationError::Usage(_) => None,
        }
    }
}

/// Authentication and session errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required for profile '{0}'")]
    AuthenticationRequired(String),

    #[error("Session expired or unknown")]
    SessionExpired,

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Unknown authenticator profile '{0}'")]
    UnknownProfile(String),

    #[error("Authenticator misconfigured: {0}")]
    Misconfigured(String),

    #[error("Authentication backend unavailable: {0}")]
    Unavailable(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Execution lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Another instance is already running for namespace '{namespace}' (pid {holder})")]
    InstanceAlreadyRunning { namespace: String, holder: i32 },

    #[error("Permission denied on lock file {0}")]
    PermissionDenied(PathBuf),

    #[error("Lock I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors returned by action functions
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Failed(String),
}

/// Category of a dispatch failure; drives exit codes and HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Authentication,
    LockTimeout,
    ActionResolution,
    Action,
    Internal,
}

impl ErrorKind {
    /// Process exit code (sysexits.h where one fits).
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Configuration => 78,
            ErrorKind::Validation => 2,
            ErrorKind::Authentication => 77,
            ErrorKind::LockTimeout => 75,
            ErrorKind::ActionResolution => 70,
            ErrorKind::Action => 1,
            ErrorKind::Internal => 74,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Configuration => 500,
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::LockTimeout => 503,
            ErrorKind::ActionResolution => 500,
            ErrorKind::Action => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether details are withheld from remote callers.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            ErrorKind::Configuration | ErrorKind::ActionResolution | ErrorKind::Internal
        )
    }
}

/// Uniform error surfaced by the dispatcher to both front ends
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Unable to resolve action function for {0}")]
    ActionResolution(ActionId),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Configuration(_) => ErrorKind::Configuration,
            DispatchError::Validation(_) => ErrorKind::Validation,
            DispatchError::Authentication(AuthError::Storage(_)) => ErrorKind::Internal,
            DispatchError::Authentication(AuthError::Misconfigured(_)) => {
                ErrorKind::Configuration
            }
            DispatchError::Authentication(_) => ErrorKind::Authentication,
            DispatchError::Lock(LockError::InstanceAlreadyRunning { .. }) => {
                ErrorKind::LockTimeout
            }
            DispatchError::Lock(_) => ErrorKind::Internal,
            DispatchError::ActionResolution(_) => ErrorKind::ActionResolution,
            DispatchError::Action(_) => ErrorKind::Action,
            DispatchError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status. Missing and duplicate resources refine the Action default of 400.
    pub fn http_status(&self) -> u16 {
        match self {
            DispatchError::Validation(ValidationError::UnknownRoute { .. }) => 404,
            DispatchError::Action(ActionError::NotFound(_)) => 404,
            DispatchError::Action(ActionError::AlreadyExists(_)) => 409,
            _ => self.kind().http_status(),
        }
    }

    /// Message safe to return to a remote caller.
    pub fn public_message(&self) -> String {
        let kind = self.kind();
        if kind.is_private() {
            match kind {
                ErrorKind::Configuration => "Server configuration error".to_string(),
                ErrorKind::ActionResolution => "Action is not available".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        }
    }
}

//! Authentication profiles, credential verifiers and sessions.

mod authenticator;
mod session;

pub use authenticator::{
    Authenticator, AuthenticatorFactory, AuthenticatorRegistry, DirectoryClient, DirectoryError,
    DummyAuthenticator, LdapAuthenticator,
};
pub use session::{is_valid_session_id, SessionStore, SessionToken};

use crate::actionmap::tree::{ActionTree, AuthProfile};
use crate::error::{AuthError, ConfigError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Who was authenticated, handed to action functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub profile: String,
    pub subject: Option<String>,
    /// Set when a session was issued
    pub session: Option<SessionToken>,
}

impl AuthInfo {
    pub fn new(profile: &str, subject: Option<String>) -> Self {
        Self {
            profile: profile.to_string(),
            subject,
            session: None,
        }
    }
}

/// Credentials accompanying one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    Password(String),
    /// Session identifier plus one token per profile
    Session {
        id: String,
        tokens: BTreeMap<String, String>,
    },
}

/// Ties profiles, the vendor registry and the session store together.
pub struct AuthService {
    profiles: BTreeMap<String, AuthProfile>,
    registry: AuthenticatorRegistry,
    sessions: SessionStore,
    instances: Mutex<HashMap<String, Arc<dyn Authenticator>>>,
}

impl AuthService {
    /// Every profile's vendor must be registered.
    pub fn new(
        profiles: BTreeMap<String, AuthProfile>,
        registry: AuthenticatorRegistry,
        sessions: SessionStore,
    ) -> Result<Self, ConfigError> {
        for profile in profiles.values() {
            if !registry.has_vendor(&profile.vendor) {
                return Err(ConfigError::UnknownVendor {
                    vendor: profile.vendor.clone(),
                    profile: profile.name.clone(),
                });
            }
        }
        Ok(Self {
            profiles,
            registry,
            sessions,
            instances: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_tree(
        tree: &ActionTree,
        registry: AuthenticatorRegistry,
        sessions: SessionStore,
    ) -> Result<Self, ConfigError> {
        Self::new(tree.profiles()?, registry, sessions)
    }

    pub fn profile(&self, name: &str) -> Result<&AuthProfile, AuthError> {
        self.profiles
            .get(name)
            .ok_or_else(|| AuthError::UnknownProfile(name.to_string()))
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The profile's authenticator, created on first use and cached.
    pub fn authenticator(&self, name: &str) -> Result<Arc<dyn Authenticator>, AuthError> {
        let profile = self.profile(name)?;
        let mut instances = self.instances.lock();
        if let Some(instance) = instances.get(name) {
            return Ok(instance.clone());
        }
        let instance = self.registry.instantiate(profile)?;
        instances.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    /// Verify credentials; with `persist`, also issue a session.
    pub fn login(&self, profile: &str, credentials: &str, persist: bool) -> Result<AuthInfo, AuthError> {
        if persist {
            self.login_into(profile, credentials, None)
        } else {
            self.verify_credentials(profile, credentials)
        }
    }

    /// Verify credentials and issue a session, keeping `session_id` when it is valid.
    pub fn login_into(
        &self,
        profile: &str,
        credentials: &str,
        session_id: Option<&str>,
    ) -> Result<AuthInfo, AuthError> {
        let mut info = self.verify_credentials(profile, credentials)?;
        info.session = Some(self.sessions.issue(profile, session_id)?);
        Ok(info)
    }

    fn verify_credentials(&self, profile: &str, credentials: &str) -> Result<AuthInfo, AuthError> {
        let authenticator = self.authenticator(profile)?;
        match authenticator.authenticate_credentials(credentials) {
            Ok(info) => {
                info!(profile = %profile, vendor = authenticator.vendor(), "Authenticated");
                Ok(info)
            }
            Err(e) => {
                warn!(profile = %profile, error = %e, "Authentication failed");
                Err(e)
            }
        }
    }

    pub fn authenticate_session(
        &self,
        profile: &str,
        id: &str,
        token: &str,
    ) -> Result<AuthInfo, AuthError> {
        self.profile(profile)?;
        self.sessions.verify(profile, id, token)?;
        debug!(profile = %profile, "Session accepted");
        Ok(AuthInfo::new(profile, None))
    }

    /// Revoke one profile's session, or every profile's. Returns how many were removed.
    pub fn logout(&self, id: &str, profile: Option<&str>) -> Result<usize, AuthError> {
        match profile {
            Some(profile) => Ok(usize::from(self.sessions.revoke(profile, id)?)),
            None => self.sessions.revoke_all(id),
        }
    }
}

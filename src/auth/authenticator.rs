//! Credential verifiers and the vendor registry.

use super::AuthInfo;
use crate::actionmap::tree::AuthProfile;
use crate::error::AuthError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Verifies credentials for one authentication profile.
pub trait Authenticator: Send + Sync {
    fn vendor(&self) -> &str;

    fn authenticate_credentials(&self, credentials: &str) -> Result<AuthInfo, AuthError>;
}

/// Builds an authenticator from a profile's parameters.
pub type AuthenticatorFactory =
    Arc<dyn Fn(&AuthProfile) -> Result<Arc<dyn Authenticator>, AuthError> + Send + Sync>;

/// Vendor name to factory. Vendors are registered explicitly; nothing is discovered.
#[derive(Clone, Default)]
pub struct AuthenticatorRegistry {
    factories: HashMap<String, AuthenticatorFactory>,
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("vendors", &self.vendors())
            .finish()
    }
}

impl AuthenticatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `dummy` vendor.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DummyAuthenticator::VENDOR, |profile| {
            Ok(Arc::new(DummyAuthenticator::from_profile(profile)?) as Arc<dyn Authenticator>)
        });
        registry
    }

    /// Add the `ldap` vendor, binding through `client`.
    pub fn with_directory(mut self, client: Arc<dyn DirectoryClient>) -> Self {
        self.register(LdapAuthenticator::VENDOR, move |profile| {
            Ok(
                Arc::new(LdapAuthenticator::from_profile(profile, client.clone())?)
                    as Arc<dyn Authenticator>,
            )
        });
        self
    }

    pub fn register<F>(&mut self, vendor: &str, factory: F)
    where
        F: Fn(&AuthProfile) -> Result<Arc<dyn Authenticator>, AuthError> + Send + Sync + 'static,
    {
        self.factories.insert(vendor.to_string(), Arc::new(factory));
    }

    pub fn has_vendor(&self, vendor: &str) -> bool {
        self.factories.contains_key(vendor)
    }

    pub fn vendors(&self) -> Vec<&str> {
        let mut vendors: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        vendors.sort_unstable();
        vendors
    }

    pub fn instantiate(&self, profile: &AuthProfile) -> Result<Arc<dyn Authenticator>, AuthError> {
        let factory = self.factories.get(&profile.vendor).ok_or_else(|| {
            AuthError::Misconfigured(format!(
                "unknown vendor '{}' for profile '{}'",
                profile.vendor, profile.name
            ))
        })?;
        debug!(profile = %profile.name, vendor = %profile.vendor, "Instantiating authenticator");
        factory(profile)
    }
}

/// Local password check; `password_hash` is a blake3 hex digest.
pub struct DummyAuthenticator {
    profile: String,
    subject: Option<String>,
    expected: blake3::Hash,
}

impl DummyAuthenticator {
    pub const VENDOR: &'static str = "dummy";

    pub fn from_profile(profile: &AuthProfile) -> Result<Self, AuthError> {
        let expected = match (
            profile.parameters.get("password_hash"),
            profile.parameters.get("password"),
        ) {
            (Some(hash), _) => blake3::Hash::from_hex(hash.trim()).map_err(|e| {
                AuthError::Misconfigured(format!(
                    "profile '{}': password_hash is not a blake3 digest: {}",
                    profile.name, e
                ))
            })?,
            (None, Some(password)) => blake3::hash(password.as_bytes()),
            (None, None) => {
                return Err(AuthError::Misconfigured(format!(
                    "profile '{}' needs a password or password_hash parameter",
                    profile.name
                )))
            }
        };
        Ok(Self {
            profile: profile.name.clone(),
            subject: profile.parameters.get("user").cloned(),
            expected,
        })
    }
}

impl Authenticator for DummyAuthenticator {
    fn vendor(&self) -> &str {
        Self::VENDOR
    }

    fn authenticate_credentials(&self, credentials: &str) -> Result<AuthInfo, AuthError> {
        // blake3::Hash equality is constant time.
        if blake3::hash(credentials.as_bytes()) == self.expected {
            Ok(AuthInfo::new(&self.profile, self.subject.clone()))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("directory unreachable: {0}")]
    Unreachable(String),

    #[error("directory error: {0}")]
    Other(String),
}

/// Directory-service binding used by the `ldap` vendor.
pub trait DirectoryClient: Send + Sync {
    fn simple_bind(&self, uri: &str, dn: &str, password: &str) -> Result<(), DirectoryError>;
}

/// Binds `user_rdn,base_dn` with the supplied password.
pub struct LdapAuthenticator {
    profile: String,
    uri: String,
    dn: String,
    client: Arc<dyn DirectoryClient>,
}

impl LdapAuthenticator {
    pub const VENDOR: &'static str = "ldap";

    pub fn from_profile(
        profile: &AuthProfile,
        client: Arc<dyn DirectoryClient>,
    ) -> Result<Self, AuthError> {
        let param = |key: &str| {
            profile.parameters.get(key).cloned().ok_or_else(|| {
                AuthError::Misconfigured(format!(
                    "profile '{}' is missing the '{}' parameter",
                    profile.name, key
                ))
            })
        };
        let uri = param("uri")?;
        let base_dn = param("base_dn")?;
        let user_rdn = param("user_rdn")?;
        Ok(Self {
            profile: profile.name.clone(),
            uri,
            dn: format!("{},{}", user_rdn, base_dn),
            client,
        })
    }
}

impl Authenticator for LdapAuthenticator {
    fn vendor(&self) -> &str {
        Self::VENDOR
    }

    fn authenticate_credentials(&self, credentials: &str) -> Result<AuthInfo, AuthError> {
        match self.client.simple_bind(&self.uri, &self.dn, credentials) {
            Ok(()) => Ok(AuthInfo::new(&self.profile, Some(self.dn.clone()))),
            Err(DirectoryError::InvalidCredentials) => Err(AuthError::InvalidCredentials),
            Err(e) => Err(AuthError::Unavailable(e.to_string())),
        }
    }
}

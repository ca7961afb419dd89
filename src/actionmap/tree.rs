//! Compiled action tree: the immutable, normalized form of a document.
//!
//! Everything here is serde-serializable without attributes that depend on
//! self-describing formats, so a namespace can be cached as bincode.

use crate::error::{ConfigError, ValidationError};
use crate::params::ExtraParam;
use crate::types::{ActionId, ArgValue, Interface};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which interfaces require authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthRequirement {
    Never,
    Always,
    Interfaces(Vec<Interface>),
}

impl AuthRequirement {
    pub fn applies_to(&self, interface: Interface) -> bool {
        match self {
            AuthRequirement::Never => false,
            AuthRequirement::Always => true,
            AuthRequirement::Interfaces(list) => list.contains(&interface),
        }
    }
}

/// A named authenticator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProfile {
    pub name: String,
    pub vendor: String,
    /// Prompt key used when asking for credentials
    pub help: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// Namespace-wide configuration from `_global.configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub authenticate: AuthRequirement,
    /// Default profile name
    pub authenticator: String,
    pub lock: bool,
    pub profiles: BTreeMap<String, AuthProfile>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            authenticate: AuthRequirement::Never,
            authenticator: "default".to_string(),
            lock: true,
            profiles: BTreeMap::new(),
        }
    }
}

/// Resolved per-action configuration (nearest declaration wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub authenticate: AuthRequirement,
    pub authenticator: String,
    pub lock: bool,
}

impl From<&GlobalConfig> for ActionConfig {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            authenticate: global.authenticate.clone(),
            authenticator: global.authenticator.clone(),
            lock: global.lock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgType {
    Str,
    Int,
}

/// How many values an argument takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Exactly one value; required when positional
    Single,
    /// Zero or one value
    Optional,
    /// Zero or more values (`nargs: "*"`, `action: append`)
    Repeated,
    /// One or more values (`nargs: "+"`)
    AtLeastOne,
    /// Switch without a value; the payload is the value stored when present
    Flag(bool),
}

impl Cardinality {
    pub fn is_list(&self) -> bool {
        matches!(self, Cardinality::Repeated | Cardinality::AtLeastOne)
    }
}

/// Where an HTTP front end reads an argument from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgSource {
    Query,
    Path,
}

/// A compiled argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    /// Destination name; also the HTTP parameter name
    pub name: String,
    pub short: Option<char>,
    pub long: Option<String>,
    pub arg_type: ArgType,
    pub cardinality: Cardinality,
    pub choices: Vec<String>,
    pub default: Option<ArgValue>,
    pub help: Option<String>,
    pub metavar: Option<String>,
    /// Sorted in application order
    pub extras: Vec<ExtraParam>,
}

impl ArgumentSpec {
    pub fn is_positional(&self) -> bool {
        self.short.is_none() && self.long.is_none()
    }

    /// Positional arguments that must receive at least one value.
    pub fn is_required_positional(&self) -> bool {
        self.is_positional()
            && matches!(self.cardinality, Cardinality::Single | Cardinality::AtLeastOne)
            && self.default.is_none()
    }

    /// Parse one raw string: choices first, then the declared type.
    pub fn coerce(&self, raw: &str) -> Result<ArgValue, ValidationError> {
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c == raw) {
            return Err(ValidationError::Invalid {
                argument: self.name.clone(),
                message: format!(
                    "'{}' is not one of: {}",
                    raw,
                    self.choices.join(", ")
                ),
            });
        }
        match self.arg_type {
            ArgType::Str => Ok(ArgValue::Str(raw.to_string())),
            ArgType::Int => raw
                .trim()
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| ValidationError::Invalid {
                    argument: self.name.clone(),
                    message: format!("'{}' is not an integer", raw),
                }),
        }
    }

    /// Turn raw front-end values into the argument's value.
    ///
    /// `raw` is `None` when the argument did not appear at all; switches appear with
    /// no values.
    pub fn resolve(&self, raw: Option<Vec<String>>) -> Result<Option<ArgValue>, ValidationError> {
        if let Cardinality::Flag(stored) = self.cardinality {
            return Ok(Some(match raw {
                Some(_) => ArgValue::Bool(stored),
                None => self.default.clone().unwrap_or(ArgValue::Bool(!stored)),
            }));
        }

        let values = match raw {
            Some(values) if !values.is_empty() => values,
            _ => {
                if self.is_required_positional() {
                    return Err(ValidationError::Required {
                        argument: self.name.clone(),
                    });
                }
                return Ok(self.default.clone().map(|d| self.shape_default(d)));
            }
        };

        match self.cardinality {
            Cardinality::Single if values.len() > 1 => Err(ValidationError::Invalid {
                argument: self.name.clone(),
                message: format!("expected one value, got {}", values.len()),
            }),
            Cardinality::Single | Cardinality::Optional => {
                let last = values.last().map(String::as_str).unwrap_or_default();
                self.coerce(last).map(Some)
            }
            Cardinality::Repeated | Cardinality::AtLeastOne => values
                .iter()
                .map(|v| self.coerce(v))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Some(ArgValue::List(items))),
            Cardinality::Flag(stored) => Ok(Some(ArgValue::Bool(stored))),
        }
    }

    /// Wrap a scalar default for list-valued arguments.
    fn shape_default(&self, default: ArgValue) -> ArgValue {
        match default {
            ArgValue::List(_) => default,
            scalar if self.cardinality.is_list() => ArgValue::List(vec![scalar]),
            scalar => scalar,
        }
    }
}

/// A compiled action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub id: ActionId,
    pub help: Option<String>,
    pub arguments: Vec<ArgumentSpec>,
    pub config: ActionConfig,
    /// Raw `api` declarations, validated by the HTTP front end
    pub routes: Vec<String>,
    pub deprecated: bool,
    pub deprecated_alias: Vec<String>,
    pub hide_in_help: bool,
}

impl ActionSpec {
    pub fn argument(&self, name: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcategorySpec {
    pub name: String,
    pub help: Option<String>,
    pub actions: Vec<ActionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub help: Option<String>,
    pub actions: Vec<ActionSpec>,
    pub subcategories: Vec<SubcategorySpec>,
}

/// One compiled namespace (one document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceTree {
    pub name: String,
    pub global: GlobalConfig,
    /// `_global.arguments`, parsed on every action of the namespace
    pub arguments: Vec<ArgumentSpec>,
    pub categories: Vec<CategorySpec>,
}

impl NamespaceTree {
    pub fn category(&self, name: &str) -> Option<&CategorySpec> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn action(&self, id: &ActionId) -> Option<&ActionSpec> {
        if id.namespace != self.name {
            return None;
        }
        let category = self.category(&id.category)?;
        let actions = match &id.subcategory {
            Some(sub) => {
                &category
                    .subcategories
                    .iter()
                    .find(|s| &s.name == sub)?
                    .actions
            }
            None => &category.actions,
        };
        actions.iter().find(|a| a.id.action == id.action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.categories.iter().flat_map(|c| {
            c.actions
                .iter()
                .chain(c.subcategories.iter().flat_map(|s| s.actions.iter()))
        })
    }
}

/// Every loaded namespace, shared read-only by the front ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionTree {
    namespaces: BTreeMap<String, NamespaceTree>,
}

impl ActionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: NamespaceTree) {
        self.namespaces.insert(namespace.name.clone(), namespace);
    }

    pub fn namespace(&self, name: &str) -> Option<&NamespaceTree> {
        self.namespaces.get(name)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &NamespaceTree> {
        self.namespaces.values()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn action(&self, id: &ActionId) -> Option<&ActionSpec> {
        self.namespaces.get(&id.namespace)?.action(id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.namespaces.values().flat_map(NamespaceTree::actions)
    }

    /// Global arguments of the namespace owning `id`.
    pub fn global_arguments(&self, id: &ActionId) -> &[ArgumentSpec] {
        self.namespaces
            .get(&id.namespace)
            .map(|ns| ns.arguments.as_slice())
            .unwrap_or_default()
    }

    /// Authenticator profiles of every namespace. A name defined differently by two
    /// namespaces is a configuration error.
    pub fn profiles(&self) -> Result<BTreeMap<String, AuthProfile>, ConfigError> {
        let mut profiles: BTreeMap<String, AuthProfile> = BTreeMap::new();
        for ns in self.namespaces.values() {
            for (name, profile) in &ns.global.profiles {
                match profiles.get(name) {
                    Some(existing) if existing != profile => {
                        return Err(ConfigError::ProfileConflict(name.clone()));
                    }
                    Some(_) => {}
                    None => {
                        profiles.insert(name.clone(), profile.clone());
                    }
                }
            }
        }
        Ok(profiles)
    }
}

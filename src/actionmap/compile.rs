//! Document to `NamespaceTree` compilation.
//!
//! Validates everything that can be checked without a front end: argument forms,
//! types, extra parameters, configuration overrides and profile references.

use super::document::{
    ActionDoc, ArgumentDoc, AuthenticateDoc, AuthenticatorDoc, ConfigurationDoc, Document,
};
use super::tree::{
    ActionConfig, ActionSpec, ArgType, ArgumentSpec, AuthProfile, AuthRequirement, Cardinality,
    CategorySpec, GlobalConfig, NamespaceTree, SubcategorySpec,
};
use crate::error::{ConfigError, ValidationError};
use crate::params::normalize_extras;
use crate::types::{ActionId, ArgValue, Interface};
use indexmap::IndexMap;
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Compile one parsed document.
pub fn compile(namespace: &str, doc: Document) -> Result<NamespaceTree, ConfigError> {
    let global = compile_global(namespace, doc.global.configuration.as_ref())?;
    let arguments = compile_arguments(&format!("{}._global", namespace), &doc.global.arguments)?;
    if let Some(positional) = arguments.iter().find(|a| a.is_positional()) {
        return Err(ConfigError::InvalidArgument {
            owner: format!("{}._global", namespace),
            argument: positional.name.clone(),
            message: "global arguments must be options".to_string(),
        });
    }

    let defaults = ActionConfig::from(&global);
    let mut categories = Vec::with_capacity(doc.categories.len());
    for (cat_name, cat_doc) in &doc.categories {
        let owner = format!("{}.{}", namespace, cat_name);
        let cat_config = overlay(&defaults, cat_doc.configuration.as_ref(), &owner)?;

        let mut actions = Vec::with_capacity(cat_doc.actions.len());
        for (action_name, action_doc) in &cat_doc.actions {
            let id = ActionId::new(namespace, cat_name, action_name);
            actions.push(compile_action(id, action_doc, &cat_config, &global)?);
        }

        let mut subcategories = Vec::with_capacity(cat_doc.subcategories.len());
        for (sub_name, sub_doc) in &cat_doc.subcategories {
            if cat_doc.actions.contains_key(sub_name) {
                return Err(ConfigError::CommandConflict {
                    name: sub_name.clone(),
                    first: format!("{} action", owner),
                    second: format!("{} subcategory", owner),
                });
            }
            let sub_owner = format!("{}.{}", owner, sub_name);
            let sub_config = overlay(&cat_config, sub_doc.configuration.as_ref(), &sub_owner)?;
            let mut sub_actions = Vec::with_capacity(sub_doc.actions.len());
            for (action_name, action_doc) in &sub_doc.actions {
                let id = ActionId::with_subcategory(namespace, cat_name, sub_name, action_name);
                sub_actions.push(compile_action(id, action_doc, &sub_config, &global)?);
            }
            subcategories.push(SubcategorySpec {
                name: sub_name.clone(),
                help: sub_doc.subcategory_help.clone(),
                actions: sub_actions,
            });
        }

        categories.push(CategorySpec {
            name: cat_name.clone(),
            help: cat_doc.category_help.clone(),
            actions,
            subcategories,
        });
    }

    let tree = NamespaceTree {
        name: namespace.to_string(),
        global,
        arguments,
        categories,
    };
    debug!(
        namespace = %namespace,
        actions = tree.actions().count(),
        "Compiled action map"
    );
    Ok(tree)
}

fn compile_global(
    namespace: &str,
    doc: Option<&ConfigurationDoc>,
) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();
    let Some(doc) = doc else {
        return Ok(global);
    };
    let owner = format!("{}._global", namespace);

    if let Some(authenticate) = &doc.authenticate {
        global.authenticate = auth_requirement(authenticate, &owner)?;
    }
    if let Some(lock) = doc.lock {
        global.lock = lock;
    }
    match &doc.authenticator {
        None => {}
        Some(AuthenticatorDoc::Profile(name)) => global.authenticator = name.clone(),
        Some(AuthenticatorDoc::Profiles(profiles)) => {
            for (name, profile) in profiles {
                let mut parameters = BTreeMap::new();
                for (key, value) in &profile.parameters {
                    parameters.insert(key.clone(), scalar_text(value, &owner, key)?);
                }
                global.profiles.insert(
                    name.clone(),
                    AuthProfile {
                        name: name.clone(),
                        vendor: profile.vendor.clone(),
                        help: profile.help.clone(),
                        parameters,
                    },
                );
            }
            if !profiles.contains_key(&global.authenticator) {
                if let Some(first) = profiles.keys().next() {
                    global.authenticator = first.clone();
                }
            }
        }
    }
    Ok(global)
}

/// Apply a lower-level `configuration` block over its parent.
fn overlay(
    parent: &ActionConfig,
    doc: Option<&ConfigurationDoc>,
    owner: &str,
) -> Result<ActionConfig, ConfigError> {
    let mut config = parent.clone();
    let Some(doc) = doc else {
        return Ok(config);
    };
    if let Some(authenticate) = &doc.authenticate {
        config.authenticate = auth_requirement(authenticate, owner)?;
    }
    match &doc.authenticator {
        None => {}
        Some(AuthenticatorDoc::Profile(name)) => config.authenticator = name.clone(),
        Some(AuthenticatorDoc::Profiles(_)) => {
            return Err(ConfigError::Malformed {
                namespace: owner.to_string(),
                message: "authenticator profiles can only be declared in _global".to_string(),
            })
        }
    }
    if let Some(lock) = doc.lock {
        config.lock = lock;
    }
    Ok(config)
}

fn auth_requirement(doc: &AuthenticateDoc, owner: &str) -> Result<AuthRequirement, ConfigError> {
    let interfaces = |names: &[String]| -> Result<AuthRequirement, ConfigError> {
        let mut list = Vec::with_capacity(names.len());
        for name in names {
            let interface = name.parse::<Interface>().map_err(|e| ConfigError::Malformed {
                namespace: owner.to_string(),
                message: format!("authenticate: {}", e),
            })?;
            if !list.contains(&interface) {
                list.push(interface);
            }
        }
        Ok(if list.is_empty() {
            AuthRequirement::Never
        } else {
            AuthRequirement::Interfaces(list)
        })
    };

    match doc {
        AuthenticateDoc::Flag(false) => Ok(AuthRequirement::Never),
        AuthenticateDoc::Flag(true) => Ok(AuthRequirement::Always),
        AuthenticateDoc::Keyword(word) if word == "all" => Ok(AuthRequirement::Always),
        AuthenticateDoc::Keyword(word) if word == "none" => Ok(AuthRequirement::Never),
        AuthenticateDoc::Keyword(word) => interfaces(std::slice::from_ref(word)),
        AuthenticateDoc::List(names) => interfaces(names),
    }
}

fn compile_action(
    id: ActionId,
    doc: &ActionDoc,
    parent: &ActionConfig,
    global: &GlobalConfig,
) -> Result<ActionSpec, ConfigError> {
    let owner = id.to_string();
    let config = overlay(parent, doc.configuration.as_ref(), &owner)?;
    if config.authenticate != AuthRequirement::Never
        && !global.profiles.contains_key(&config.authenticator)
    {
        return Err(ConfigError::UnknownProfile {
            profile: config.authenticator.clone(),
            owner,
        });
    }

    let arguments = compile_arguments(&owner, &doc.arguments)?;
    Ok(ActionSpec {
        help: doc.action_help.clone(),
        arguments,
        config,
        routes: doc.api.clone().map(|r| r.into_vec()).unwrap_or_default(),
        deprecated: doc.deprecated,
        deprecated_alias: doc.deprecated_alias.clone(),
        hide_in_help: doc.hide_in_help,
        id,
    })
}

fn compile_arguments(
    owner: &str,
    docs: &IndexMap<String, ArgumentDoc>,
) -> Result<Vec<ArgumentSpec>, ConfigError> {
    let mut seen = HashSet::new();
    let mut arguments = Vec::with_capacity(docs.len());
    for (name, doc) in docs {
        let spec = compile_argument(owner, name, doc)?;
        if !seen.insert(spec.name.clone()) {
            return Err(invalid_argument(owner, name, "declared twice"));
        }
        arguments.push(spec);
    }
    Ok(arguments)
}

fn compile_argument(owner: &str, name: &str, doc: &ArgumentDoc) -> Result<ArgumentSpec, ConfigError> {
    let (short, mut long) = if let Some(flag) = name.strip_prefix("--") {
        (None, Some(flag.to_string()))
    } else if let Some(flag) = name.strip_prefix('-') {
        let mut chars = flag.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => (Some(c), None),
            _ => return Err(invalid_argument(owner, name, "short options take one character")),
        }
    } else {
        (None, None)
    };

    if let Some(full) = &doc.full {
        match full.strip_prefix("--") {
            Some(flag) if short.is_some() || long.is_some() => long = Some(flag.to_string()),
            _ => {
                return Err(invalid_argument(
                    owner,
                    name,
                    "'full' must be a --long form of an option",
                ))
            }
        }
    }

    let positional = short.is_none() && long.is_none();
    let dest = match (&long, short) {
        (Some(long), _) => long.replace('-', "_"),
        (None, Some(short)) => short.to_string(),
        (None, None) => name.to_string(),
    };
    if dest.is_empty() {
        return Err(invalid_argument(owner, name, "empty argument name"));
    }

    let arg_type = match doc.arg_type.as_deref() {
        None | Some("str") | Some("string") => ArgType::Str,
        Some("int") | Some("integer") => ArgType::Int,
        Some(other) => {
            return Err(invalid_argument(owner, name, &format!("unknown type '{}'", other)))
        }
    };

    let cardinality = match (doc.action.as_deref(), doc.nargs.as_deref()) {
        (Some("store_true"), None) if !positional => Cardinality::Flag(true),
        (Some("store_false"), None) if !positional => Cardinality::Flag(false),
        (Some("store_true") | Some("store_false"), _) => {
            return Err(invalid_argument(
                owner,
                name,
                "switches must be options without nargs",
            ))
        }
        (Some("append"), None) if !positional => Cardinality::Repeated,
        (Some("append"), _) => {
            return Err(invalid_argument(owner, name, "append requires an option without nargs"))
        }
        (None | Some("store"), None) if positional => Cardinality::Single,
        (None | Some("store"), None) => Cardinality::Optional,
        (None | Some("store"), Some("?")) => Cardinality::Optional,
        (None | Some("store"), Some("*")) => Cardinality::Repeated,
        (None | Some("store"), Some("+")) => Cardinality::AtLeastOne,
        (None | Some("store"), Some(other)) => {
            return Err(invalid_argument(owner, name, &format!("unsupported nargs '{}'", other)))
        }
        (Some(other), _) => {
            return Err(invalid_argument(owner, name, &format!("unsupported action '{}'", other)))
        }
    };

    let mut choices = Vec::with_capacity(doc.choices.len());
    for choice in &doc.choices {
        choices.push(scalar_text(choice, owner, name)?);
    }

    let mut spec = ArgumentSpec {
        name: dest,
        short,
        long,
        arg_type,
        cardinality,
        choices,
        default: None,
        help: doc.help.clone(),
        metavar: doc.metavar.clone(),
        extras: normalize_extras(&doc.extra, name).map_err(|e| extra_error(owner, e))?,
    };
    if let Some(default) = &doc.default {
        spec.default = default_value(&spec, default, owner, name)?;
    }
    Ok(spec)
}

fn default_value(
    spec: &ArgumentSpec,
    raw: &YamlValue,
    owner: &str,
    name: &str,
) -> Result<Option<ArgValue>, ConfigError> {
    let typed = |value: &YamlValue| -> Result<ArgValue, ConfigError> {
        match (spec.arg_type, value) {
            (_, YamlValue::Bool(b)) if matches!(spec.cardinality, Cardinality::Flag(_)) => {
                Ok(ArgValue::Bool(*b))
            }
            (ArgType::Int, YamlValue::Number(n)) => n
                .as_i64()
                .map(ArgValue::Int)
                .ok_or_else(|| invalid_argument(owner, name, "default is not an integer")),
            (ArgType::Int, YamlValue::String(s)) => s
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| invalid_argument(owner, name, "default is not an integer")),
            (ArgType::Str, other) => Ok(ArgValue::Str(scalar_text(other, owner, name)?)),
            _ => Err(invalid_argument(owner, name, "default does not match the type")),
        }
    };

    match raw {
        YamlValue::Null => Ok(None),
        YamlValue::Sequence(items) => Ok(Some(ArgValue::List(
            items.iter().map(typed).collect::<Result<_, _>>()?,
        ))),
        scalar => typed(scalar).map(Some),
    }
}

fn scalar_text(value: &YamlValue, owner: &str, name: &str) -> Result<String, ConfigError> {
    match value {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid_argument(owner, name, "expected a scalar value")),
    }
}

fn invalid_argument(owner: &str, argument: &str, message: &str) -> ConfigError {
    ConfigError::InvalidArgument {
        owner: owner.to_string(),
        argument: argument.to_string(),
        message: message.to_string(),
    }
}

fn extra_error(owner: &str, err: ValidationError) -> ConfigError {
    match err {
        ValidationError::BadExtra {
            argument,
            param,
            message,
        } => ConfigError::InvalidExtra {
            argument: format!("{} {}", owner, argument),
            param,
            message,
        },
        other => ConfigError::Malformed {
            namespace: owner.to_string(),
            message: other.to_string(),
        },
    }
}

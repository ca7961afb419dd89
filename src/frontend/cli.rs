//! Command-line front end: a clap command tree built from the action tree.
//!
//! Categories become top-level subcommands, subcategories nest one level deeper and
//! actions are leaves. The matched subcommand path identifies the action.

use super::{Arguments, ParsedRequest};
use crate::actionmap::tree::{ActionSpec, ActionTree, ArgumentSpec, Cardinality, CategorySpec};
use crate::error::ConfigError;
use crate::types::ActionId;
use clap::builder::PossibleValuesParser;
use clap::error::ErrorKind as ClapErrorKind;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::sync::Arc;
use tracing::{debug, warn};

/// Program name used when no root command is supplied.
pub const DEFAULT_PROGRAM: &str = "actionmap";

/// Help output or a usage error, already rendered by clap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliExit {
    pub code: i32,
    pub text: String,
}

impl CliExit {
    pub fn is_error(&self) -> bool {
        self.code != 0
    }

    fn from_clap(err: clap::Error) -> Self {
        Self {
            code: err.exit_code(),
            text: err.render().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Leaf {
    id: ActionId,
    deprecated: bool,
    /// Set when reached through a deprecated alias
    alias: Option<String>,
}

/// The compiled command tree.
#[derive(Debug, Clone)]
pub struct CliTree {
    command: Command,
    leaves: HashMap<Vec<String>, Leaf>,
    tree: Arc<ActionTree>,
}

impl CliTree {
    pub fn build(tree: Arc<ActionTree>) -> Result<Self, ConfigError> {
        Self::build_with_root(tree, Command::new(DEFAULT_PROGRAM))
    }

    /// Attach the tree under `root`, which may already carry its own global options.
    pub fn build_with_root(tree: Arc<ActionTree>, root: Command) -> Result<Self, ConfigError> {
        let mut root = root
            .subcommand_required(true)
            .arg_required_else_help(true);

        let mut reserved = reserved_names(&root);
        let mut global_owners: HashMap<String, (String, &ArgumentSpec)> = HashMap::new();
        for ns in tree.namespaces() {
            for spec in &ns.arguments {
                if let Some((owner, existing)) = global_owners.get(&spec.name) {
                    if *existing != spec {
                        return Err(ConfigError::CommandConflict {
                            name: spec.name.clone(),
                            first: owner.clone(),
                            second: ns.name.clone(),
                        });
                    }
                    continue;
                }
                for name in spec_names(spec) {
                    if !reserved.insert(name.clone()) {
                        return Err(ConfigError::CommandConflict {
                            name,
                            first: root.get_name().to_string(),
                            second: ns.name.clone(),
                        });
                    }
                }
                root = root.arg(build_arg(spec).global(true));
                global_owners.insert(spec.name.clone(), (ns.name.clone(), spec));
            }
        }

        let mut leaves = HashMap::new();
        let mut category_owner: HashMap<String, String> = HashMap::new();
        for ns in tree.namespaces() {
            for category in &ns.categories {
                if let Some(first) = category_owner.get(&category.name) {
                    return Err(ConfigError::CommandConflict {
                        name: category.name.clone(),
                        first: first.clone(),
                        second: ns.name.clone(),
                    });
                }
                category_owner.insert(category.name.clone(), ns.name.clone());
                root = root.subcommand(build_category(category, &mut leaves)?);
            }
        }

        debug!(actions = leaves.len(), "CLI tree built");
        Ok(Self {
            command: root,
            leaves,
            tree,
        })
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn tree(&self) -> &Arc<ActionTree> {
        &self.tree
    }

    /// Render the top-level help.
    pub fn render_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }

    pub fn parse<I, T>(&self, argv: I) -> Result<ParsedRequest, CliExit>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.parse_matches(argv).map(|(request, _)| request)
    }

    /// Parse and also hand back the leaf matches, so callers can read their own
    /// root-level options.
    pub fn parse_matches<I, T>(&self, argv: I) -> Result<(ParsedRequest, ArgMatches), CliExit>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self
            .command
            .clone()
            .try_get_matches_from(argv)
            .map_err(CliExit::from_clap)?;

        let mut path = Vec::new();
        let mut current = &matches;
        while let Some((name, sub)) = current.subcommand() {
            path.push(name.to_string());
            current = sub;
        }
        let leaf = self.leaves.get(&path).ok_or_else(|| {
            CliExit::from_clap(self.command.clone().error(
                ClapErrorKind::InvalidSubcommand,
                format!("'{}' is not an action", path.join(" ")),
            ))
        })?;

        if let Some(alias) = &leaf.alias {
            warn!(alias = %alias, action = %leaf.id, "Deprecated command alias, use '{}' instead", leaf.id.action);
        } else if leaf.deprecated {
            warn!(action = %leaf.id, "Deprecated command");
        }

        let spec = self.tree.action(&leaf.id).ok_or_else(|| CliExit {
            code: 2,
            text: format!("error: unknown action {}\n", leaf.id),
        })?;
        let usage_error = |e: crate::error::ValidationError| {
            CliExit::from_clap(
                self.command
                    .clone()
                    .error(ClapErrorKind::ValueValidation, e.to_string()),
            )
        };
        let args = Arguments::collect(&spec.arguments, |arg| raw_values(current, arg))
            .map_err(usage_error)?;
        let globals = Arguments::collect(self.tree.global_arguments(&leaf.id), |arg| {
            raw_values(current, arg)
        })
        .map_err(usage_error)?;

        Ok((
            ParsedRequest {
                id: leaf.id.clone(),
                args,
                globals,
            },
            current.clone(),
        ))
    }
}

fn reserved_names(root: &Command) -> HashSet<String> {
    let mut names: HashSet<String> = ["help", "-h", "--help", "version", "-V", "--version"]
        .into_iter()
        .map(str::to_string)
        .collect();
    for arg in root.get_arguments() {
        names.insert(arg.get_id().as_str().to_string());
        if let Some(long) = arg.get_long() {
            names.insert(format!("--{}", long));
        }
        if let Some(short) = arg.get_short() {
            names.insert(format!("-{}", short));
        }
    }
    names
}

fn spec_names(spec: &ArgumentSpec) -> Vec<String> {
    let mut names = vec![spec.name.clone()];
    if let Some(long) = &spec.long {
        names.push(format!("--{}", long));
    }
    if let Some(short) = spec.short {
        names.push(format!("-{}", short));
    }
    names
}

fn build_category(
    category: &CategorySpec,
    leaves: &mut HashMap<Vec<String>, Leaf>,
) -> Result<Command, ConfigError> {
    let mut command = Command::new(category.name.clone())
        .subcommand_required(true)
        .arg_required_else_help(true);
    if let Some(help) = &category.help {
        command = command.about(help.clone());
    }
    let prefix = vec![category.name.clone()];
    command = add_actions(command, &prefix, &category.actions, leaves)?;

    for sub in &category.subcategories {
        let mut sub_command = Command::new(sub.name.clone())
            .subcommand_required(true)
            .arg_required_else_help(true);
        if let Some(help) = &sub.help {
            sub_command = sub_command.about(help.clone());
        }
        let sub_prefix = vec![category.name.clone(), sub.name.clone()];
        sub_command = add_actions(sub_command, &sub_prefix, &sub.actions, leaves)?;
        command = command.subcommand(sub_command);
    }
    Ok(command)
}

fn add_actions(
    mut parent: Command,
    prefix: &[String],
    actions: &[ActionSpec],
    leaves: &mut HashMap<Vec<String>, Leaf>,
) -> Result<Command, ConfigError> {
    for action in actions {
        let name = action.id.action.clone();
        parent = parent.subcommand(build_leaf(&name, action).hide(action.hide_in_help));
        insert_leaf(
            leaves,
            prefix,
            &name,
            Leaf {
                id: action.id.clone(),
                deprecated: action.deprecated,
                alias: None,
            },
        )?;

        for alias in &action.deprecated_alias {
            parent = parent.subcommand(build_leaf(alias, action).hide(true));
            insert_leaf(
                leaves,
                prefix,
                alias,
                Leaf {
                    id: action.id.clone(),
                    deprecated: true,
                    alias: Some(alias.clone()),
                },
            )?;
        }
    }
    Ok(parent)
}

fn insert_leaf(
    leaves: &mut HashMap<Vec<String>, Leaf>,
    prefix: &[String],
    name: &str,
    leaf: Leaf,
) -> Result<(), ConfigError> {
    let mut path = prefix.to_vec();
    path.push(name.to_string());
    if let Some(existing) = leaves.get(&path) {
        return Err(ConfigError::CommandConflict {
            name: path.join(" "),
            first: existing.id.to_string(),
            second: leaf.id.to_string(),
        });
    }
    leaves.insert(path, leaf);
    Ok(())
}

fn build_leaf(name: &str, action: &ActionSpec) -> Command {
    let mut command = Command::new(name.to_string());
    if let Some(help) = &action.help {
        command = command.about(help.clone());
    }
    for spec in &action.arguments {
        command = command.arg(build_arg(spec));
    }
    command
}

/// clap only checks shape and choices; typing and defaults are resolved by
/// `ArgumentSpec::resolve` so both front ends agree.
fn build_arg(spec: &ArgumentSpec) -> Arg {
    let positional = spec.is_positional();
    let mut arg = Arg::new(spec.name.clone());
    if let Some(short) = spec.short {
        arg = arg.short(short);
    }
    if let Some(long) = &spec.long {
        arg = arg.long(long.clone());
    }
    if let Some(help) = &spec.help {
        arg = arg.help(help.clone());
    }
    if let Some(metavar) = &spec.metavar {
        arg = arg.value_name(metavar.clone());
    }

    if let Cardinality::Flag(_) = spec.cardinality {
        return arg.action(ArgAction::SetTrue);
    }

    arg = match spec.cardinality {
        Cardinality::Single => arg
            .action(ArgAction::Set)
            .num_args(1)
            .required(spec.is_required_positional()),
        Cardinality::Optional if positional => arg.action(ArgAction::Set).num_args(0..=1),
        Cardinality::Optional => arg.action(ArgAction::Set).num_args(1),
        Cardinality::Repeated if positional => arg.action(ArgAction::Append).num_args(0..),
        Cardinality::Repeated => arg.action(ArgAction::Append).num_args(1),
        Cardinality::AtLeastOne => arg
            .action(ArgAction::Append)
            .num_args(1..)
            .required(spec.is_required_positional()),
        Cardinality::Flag(_) => arg,
    };

    if spec.choices.is_empty() {
        arg.value_parser(value_parser!(String))
    } else {
        arg.value_parser(PossibleValuesParser::new(spec.choices.clone()))
    }
}

fn raw_values(matches: &ArgMatches, spec: &ArgumentSpec) -> Option<Vec<String>> {
    if let Cardinality::Flag(_) = spec.cardinality {
        return match matches.try_get_one::<bool>(&spec.name) {
            Ok(Some(true)) => Some(Vec::new()),
            _ => None,
        };
    }
    match matches.try_get_many::<String>(&spec.name) {
        Ok(Some(values)) => Some(values.cloned().collect()),
        _ => None,
    }
}

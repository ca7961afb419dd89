//! CLI parse: program-level options. Category and action subcommands come from the
//! loaded action maps and are attached at runtime.

use clap::{ArgMatches, Args, Command, FromArgMatches};
use std::ffi::OsString;
use std::path::PathBuf;

pub const PROGRAM: &str = "actionmap";

/// Options accepted anywhere on the command line.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Namespace to load; repeat for several (default: every installed action map)
    #[arg(long = "namespace", global = true, value_name = "NAMESPACE")]
    pub namespaces: Vec<String>,

    /// Output format (default: pretty)
    #[arg(long, global = true, value_parser = ["json", "plain", "none"])]
    pub output_as: Option<String>,

    /// Password for actions that require authentication
    #[arg(long, global = true, env = "ACTIONMAP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Seconds to wait for the namespace lock
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Recompile action maps instead of reading the cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn from_matches(matches: &ArgMatches) -> Option<Self> {
        Self::from_arg_matches(matches).ok()
    }
}

/// Root command carrying the program options; the action tree is attached to it.
pub fn root_command() -> Command {
    GlobalArgs::augment_args(
        Command::new(PROGRAM)
            .version(env!("CARGO_PKG_VERSION"))
            .about("Run actions declared in action maps"),
    )
}

/// Read program options before the action tree exists.
///
/// Only options placed before the first category are seen here; everything from the
/// category on is left for the full parse.
pub fn bootstrap<I, T>(argv: I) -> GlobalArgs
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let command = GlobalArgs::augment_args(Command::new(PROGRAM))
        .ignore_errors(true)
        .allow_external_subcommands(true)
        .disable_help_flag(true)
        .disable_version_flag(true);
    command
        .try_get_matches_from(argv)
        .ok()
        .and_then(|matches| GlobalArgs::from_matches(&matches))
        .unwrap_or_default()
}

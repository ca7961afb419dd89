//! CLI domain: parse, route and output only.
//! Commands come from the loaded action maps; the dispatcher does the rest.

mod output;
mod parse;
mod route;

pub use output::{map_error, render, OutputFormat};
pub use parse::{bootstrap, root_command, GlobalArgs, PROGRAM};
pub use route::{CliOutcome, RunContext};

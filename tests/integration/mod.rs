//! Integration tests for the action map dispatcher: loading, both front ends,
//! sessions, namespace locks and the binaries.

mod binary_cli;
mod cache_integration;
mod cli_dispatch;
mod config_integration;
mod http_scenario;
mod lock_exclusion;
mod route_table;
mod test_utils;

pub use test_utils::*;

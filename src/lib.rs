//! Actionmap: Declarative Action-Tree Dispatcher
//!
//! A single YAML document per namespace describes categories, subcategories and actions
//! with typed arguments. The document is compiled once into an immutable action tree from
//! which two equivalent front ends are built: a hierarchical command-line parser and an
//! HTTP route table. Both resolve to the same registered action functions, guarded by an
//! authentication-profile system and a cross-process execution lock.

pub mod actionmap;
pub mod auth;
pub mod cli;
pub mod config;
pub mod demo;
pub mod dispatcher;
pub mod error;
pub mod frontend;
pub mod interaction;
pub mod lock;
pub mod logging;
pub mod params;
pub mod registry;
pub mod server;
pub mod types;

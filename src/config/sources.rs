//! Config file sources layered by the loader.

pub mod explicit_file;
pub mod global_file;

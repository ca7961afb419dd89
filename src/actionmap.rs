//! Action map: declarative documents compiled into an immutable action tree.

pub mod compile;
pub mod document;
pub mod loader;
pub mod tree;

pub use loader::{ActionMapLoader, Fingerprint, LoadSource};
pub use tree::{
    ActionConfig, ActionSpec, ActionTree, ArgSource, ArgType, ArgumentSpec, AuthProfile,
    AuthRequirement, Cardinality, CategorySpec, GlobalConfig, NamespaceTree, SubcategorySpec,
};

//! Action functions, registered explicitly by identifier.

use crate::actionmap::tree::ActionTree;
use crate::auth::AuthInfo;
use crate::error::{ActionError, ConfigError};
use crate::frontend::Arguments;
use crate::interaction::Interaction;
use crate::types::ActionId;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything an action function receives.
pub struct Invocation<'a> {
    pub id: &'a ActionId,
    pub args: &'a Arguments,
    pub globals: &'a Arguments,
    /// Present when the action required authentication
    pub auth: Option<&'a AuthInfo>,
    pub interaction: &'a dyn Interaction,
}

pub type ActionFn = Arc<dyn Fn(&Invocation<'_>) -> Result<Value, ActionError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionId, ActionFn>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.actions.keys().map(ToString::to_string).collect();
        ids.sort();
        f.debug_struct("ActionRegistry").field("actions", &ids).finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under a dotted id such as `demo.widget.part.add`.
    pub fn register<F>(&mut self, id: &str, function: F) -> Result<(), ConfigError>
    where
        F: Fn(&Invocation<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        let id = ActionId::parse(id)
            .ok_or_else(|| ConfigError::Settings(format!("invalid action id '{}'", id)))?;
        self.actions.insert(id, Arc::new(function));
        Ok(())
    }

    pub fn get(&self, id: &ActionId) -> Option<ActionFn> {
        self.actions.get(id).cloned()
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.actions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions declared in `tree` with no registered function.
    pub fn missing(&self, tree: &ActionTree) -> Vec<ActionId> {
        tree.actions()
            .filter(|action| !self.actions.contains_key(&action.id))
            .map(|action| action.id.clone())
            .collect()
    }
}

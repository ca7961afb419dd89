//! Front ends compiled from the action tree.
//!
//! The CLI tree and the HTTP route table are built independently from the same
//! `ActionTree` and both produce a `ParsedRequest`; nothing downstream knows which one
//! parsed the request.

pub mod cli;
pub mod http;

use crate::actionmap::tree::ArgumentSpec;
use crate::types::{ActionId, ArgValue};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Ordered argument values keyed by destination name.
///
/// Every declared argument has an entry; `None` marks one that received no value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    values: IndexMap<String, Option<ArgValue>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name).and_then(Option::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: Option<ArgValue>) {
        self.values.insert(name.to_string(), value);
    }

    /// Remove the value, leaving the entry in place.
    pub fn take(&mut self, name: &str) -> Option<ArgValue> {
        self.values.get_mut(name).and_then(Option::take)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_int)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(ArgValue::as_bool).unwrap_or(false)
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(ArgValue::List(items)) => items.iter().map(ArgValue::to_text).collect(),
            Some(single) => vec![single.to_text()],
            None => Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&ArgValue>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object with `null` for arguments without a value.
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.values.len());
        for (name, value) in &self.values {
            map.insert(
                name.clone(),
                value.as_ref().map(ArgValue::to_json).unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }

    /// Resolve each spec against raw values fetched by `lookup`.
    pub(crate) fn collect<F>(
        specs: &[ArgumentSpec],
        mut lookup: F,
    ) -> Result<Self, crate::error::ValidationError>
    where
        F: FnMut(&ArgumentSpec) -> Option<Vec<String>>,
    {
        let mut arguments = Self::new();
        for spec in specs {
            let value = spec.resolve(lookup(spec))?;
            arguments.set(&spec.name, value);
        }
        Ok(arguments)
    }
}

/// Output of either front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub id: ActionId,
    pub args: Arguments,
    /// Values of the namespace's global arguments
    pub globals: Arguments,
}

//! Core identifiers and argument values shared by every front end.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Front end through which a request arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// Single-shot command line invocation
    Cli,
    /// HTTP route table
    Api,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Cli => "cli",
            Interface::Api => "api",
        }
    }

    /// Whether a human can be asked for input on this interface.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Interface::Cli)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(Interface::Cli),
            "api" => Ok(Interface::Api),
            other => Err(format!("unknown interface '{}'", other)),
        }
    }
}

/// Action identifier: (namespace, category, [subcategory], action).
///
/// Uniquely names one operation across every loaded namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId {
    pub namespace: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub action: String,
}

impl ActionId {
    pub fn new(
        namespace: impl Into<String>,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            category: category.into(),
            subcategory: None,
            action: action.into(),
        }
    }

    pub fn with_subcategory(
        namespace: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            category: category.into(),
            subcategory: Some(subcategory.into()),
            action: action.into(),
        }
    }

    /// Conventional function name: `category_[subcategory_]action`, dashes mapped to
    /// underscores.
    pub fn function_name(&self) -> String {
        let mut name = self.category.replace('-', "_");
        if let Some(sub) = &self.subcategory {
            name.push('_');
            name.push_str(&sub.replace('-', "_"));
        }
        name.push('_');
        name.push_str(&self.action.replace('-', "_"));
        name
    }

    /// Parse a dotted identifier (`ns.cat.action` or `ns.cat.sub.action`).
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [ns, cat, action] => Some(Self::new(*ns, *cat, *action)),
            [ns, cat, sub, action] => Some(Self::with_subcategory(*ns, *cat, *sub, *action)),
            _ => None,
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.category)?;
        if let Some(sub) = &self.subcategory {
            write!(f, ".{}", sub)?;
        }
        write!(f, ".{}", self.action)
    }
}

/// A parsed argument value.
///
/// Kept free of `serde_json::Value` so compiled trees stay bincode-serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Empty strings and empty lists count as "no value" for the pipeline.
    pub fn is_empty(&self) -> bool {
        match self {
            ArgValue::Str(s) => s.is_empty(),
            ArgValue::List(items) => items.is_empty(),
            ArgValue::Int(_) | ArgValue::Bool(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Text form used for pattern matching and display.
    pub fn to_text(&self) -> String {
        match self {
            ArgValue::Str(s) => s.clone(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::List(items) => items
                .iter()
                .map(ArgValue::to_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgValue::Str(s) => serde_json::Value::String(s.clone()),
            ArgValue::Int(i) => serde_json::Value::from(*i),
            ArgValue::Bool(b) => serde_json::Value::Bool(*b),
            ArgValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ArgValue::to_json).collect())
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        ArgValue::Int(i)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

//! Raw document shape, as written by hand in YAML.
//!
//! Only deserialization lives here; normalization happens in `compile`.

use indexmap::IndexMap;
use serde::Deserialize;

/// One namespace document: category names plus the reserved `_global` key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(rename = "_global", default)]
    pub global: GlobalSection,

    #[serde(flatten)]
    pub categories: IndexMap<String, CategoryDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSection {
    #[serde(default)]
    pub configuration: Option<ConfigurationDoc>,

    #[serde(default)]
    pub arguments: IndexMap<String, ArgumentDoc>,
}

/// `configuration` block, valid at every level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationDoc {
    #[serde(default)]
    pub authenticate: Option<AuthenticateDoc>,

    #[serde(default)]
    pub authenticator: Option<AuthenticatorDoc>,

    #[serde(default)]
    pub lock: Option<bool>,
}

/// `authenticate: false | true | all | api | [cli, api]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthenticateDoc {
    Flag(bool),
    Keyword(String),
    List(Vec<String>),
}

/// A profile name (any level) or the profile table (`_global` only).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthenticatorDoc {
    Profile(String),
    Profiles(IndexMap<String, ProfileDoc>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDoc {
    pub vendor: String,

    #[serde(default)]
    pub help: Option<String>,

    #[serde(default)]
    pub parameters: IndexMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryDoc {
    #[serde(default)]
    pub category_help: Option<String>,

    #[serde(default)]
    pub configuration: Option<ConfigurationDoc>,

    #[serde(default)]
    pub actions: IndexMap<String, ActionDoc>,

    #[serde(default)]
    pub subcategories: IndexMap<String, SubcategoryDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubcategoryDoc {
    #[serde(default)]
    pub subcategory_help: Option<String>,

    #[serde(default)]
    pub configuration: Option<ConfigurationDoc>,

    #[serde(default)]
    pub actions: IndexMap<String, ActionDoc>,
}

/// `api: "GET /path"` or a list of such strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoutesDoc {
    One(String),
    Many(Vec<String>),
}

impl RoutesDoc {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            RoutesDoc::One(route) => vec![route],
            RoutesDoc::Many(routes) => routes,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDoc {
    #[serde(default)]
    pub action_help: Option<String>,

    #[serde(default)]
    pub api: Option<RoutesDoc>,

    #[serde(default)]
    pub configuration: Option<ConfigurationDoc>,

    #[serde(default)]
    pub arguments: IndexMap<String, ArgumentDoc>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub deprecated_alias: Vec<String>,

    #[serde(default)]
    pub hide_in_help: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgumentDoc {
    #[serde(default)]
    pub full: Option<String>,

    #[serde(default)]
    pub help: Option<String>,

    #[serde(rename = "type", default)]
    pub arg_type: Option<String>,

    #[serde(default)]
    pub nargs: Option<String>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub choices: Vec<serde_yaml::Value>,

    #[serde(default)]
    pub default: Option<serde_yaml::Value>,

    #[serde(default)]
    pub metavar: Option<String>,

    #[serde(default)]
    pub extra: IndexMap<String, serde_yaml::Value>,
}

/// Parse document text. The namespace only labels errors.
pub fn parse(namespace: &str, text: &str) -> Result<Document, crate::error::ConfigError> {
    if text.trim().is_empty() {
        return Ok(Document::default());
    }
    serde_yaml::from_str(text).map_err(|e| crate::error::ConfigError::Malformed {
        namespace: namespace.to_string(),
        message: e.to_string(),
    })
}

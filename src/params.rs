//! Extra-parameter pipeline.
//!
//! Arguments may carry `extra` parameters in the document. They are validated and
//! normalized once at compile time and applied to every parsed request, in a fixed order:
//! comment, ask, password, required, pattern.

use crate::actionmap::tree::{ActionSpec, ArgumentSpec};
use crate::error::ValidationError;
use crate::frontend::Arguments;
use crate::interaction::{DisplayStyle, Interaction, PromptError, PromptKind};
use crate::types::{ArgValue, Interface};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use tracing::warn;

/// Message key used when a legacy pattern declares no message.
pub const DEFAULT_PATTERN_MESSAGE: &str = "pattern_not_match";

/// A validated extra parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtraParam {
    Comment(String),
    Ask(String),
    Password(String),
    Required(bool),
    Pattern { regex: AnchoredPattern, message: String },
}

/// A pattern compiled once, anchored at the start of the value. Serializes as its source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnchoredPattern {
    source: String,
    compiled: Regex,
}

impl AnchoredPattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            compiled: Regex::new(&format!("^(?:{})", source))?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.compiled.is_match(value)
    }
}

impl PartialEq for AnchoredPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for AnchoredPattern {}

impl TryFrom<String> for AnchoredPattern {
    type Error = regex::Error;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::new(&source)
    }
}

impl From<AnchoredPattern> for String {
    fn from(pattern: AnchoredPattern) -> Self {
        pattern.source
    }
}

/// Extra-parameter kinds, declared in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKind {
    Comment,
    Ask,
    Password,
    Required,
    Pattern,
}

impl ParamKind {
    pub const ALL: [ParamKind; 5] = [
        ParamKind::Comment,
        ParamKind::Ask,
        ParamKind::Password,
        ParamKind::Required,
        ParamKind::Pattern,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Comment => "comment",
            ParamKind::Ask => "ask",
            ParamKind::Password => "password",
            ParamKind::Required => "required",
            ParamKind::Pattern => "pattern",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Kinds that need a human on the other side.
    pub fn is_interactive(&self) -> bool {
        matches!(self, ParamKind::Comment | ParamKind::Ask | ParamKind::Password)
    }

    /// Check a raw document value and normalize legacy shapes.
    pub fn validate(&self, raw: &YamlValue, arg_name: &str) -> Result<ExtraParam, ValidationError> {
        match self {
            ParamKind::Comment | ParamKind::Ask | ParamKind::Password => {
                let message = self.message_value(raw, arg_name)?;
                Ok(match self {
                    ParamKind::Comment => ExtraParam::Comment(message),
                    ParamKind::Ask => ExtraParam::Ask(message),
                    _ => ExtraParam::Password(message),
                })
            }
            ParamKind::Required => match raw {
                YamlValue::Bool(required) => Ok(ExtraParam::Required(*required)),
                _ => Err(self.bad(arg_name, "expected a boolean")),
            },
            ParamKind::Pattern => {
                let (regex, message) = match raw {
                    YamlValue::String(regex) => {
                        warn!(
                            argument = %arg_name,
                            "Pattern without a message, using '{}'",
                            DEFAULT_PATTERN_MESSAGE
                        );
                        (regex.clone(), DEFAULT_PATTERN_MESSAGE.to_string())
                    }
                    YamlValue::Sequence(items) => match items.as_slice() {
                        [YamlValue::String(regex), YamlValue::String(message)] => {
                            (regex.clone(), message.clone())
                        }
                        _ => {
                            return Err(
                                self.bad(arg_name, "expected [regex, message] as two strings")
                            )
                        }
                    },
                    _ => return Err(self.bad(arg_name, "expected [regex, message]")),
                };
                let regex = AnchoredPattern::new(&regex)
                    .map_err(|e| self.bad(arg_name, &format!("invalid regex: {}", e)))?;
                Ok(ExtraParam::Pattern { regex, message })
            }
        }
    }

    fn message_value(&self, raw: &YamlValue, arg_name: &str) -> Result<String, ValidationError> {
        match raw {
            YamlValue::String(message) if !message.is_empty() => Ok(message.clone()),
            YamlValue::String(_) | YamlValue::Bool(_) => {
                warn!(
                    argument = %arg_name,
                    param = self.name(),
                    "Expected a message key, using the argument name"
                );
                Ok(arg_name.to_string())
            }
            _ => Err(self.bad(arg_name, "expected a message string")),
        }
    }

    fn bad(&self, arg_name: &str, message: &str) -> ValidationError {
        ValidationError::BadExtra {
            argument: arg_name.to_string(),
            param: self.name().to_string(),
            message: message.to_string(),
        }
    }
}

/// Validate an argument's `extra` table. Unknown names are dropped with a warning; the
/// result is sorted in application order.
pub fn normalize_extras(
    raw: &IndexMap<String, YamlValue>,
    arg_name: &str,
) -> Result<Vec<ExtraParam>, ValidationError> {
    let mut extras = Vec::with_capacity(raw.len());
    for (name, value) in raw {
        match ParamKind::from_name(name) {
            Some(kind) => extras.push(kind.validate(value, arg_name)?),
            None => warn!(argument = %arg_name, param = %name, "Unknown extra parameter dropped"),
        }
    }
    extras.sort_by_key(ExtraParam::kind);
    Ok(extras)
}

impl ExtraParam {
    pub fn kind(&self) -> ParamKind {
        match self {
            ExtraParam::Comment(_) => ParamKind::Comment,
            ExtraParam::Ask(_) => ParamKind::Ask,
            ExtraParam::Password(_) => ParamKind::Password,
            ExtraParam::Required(_) => ParamKind::Required,
            ExtraParam::Pattern { .. } => ParamKind::Pattern,
        }
    }

    /// Transform or check one argument value.
    pub fn apply(
        &self,
        arg_name: &str,
        value: Option<ArgValue>,
        interaction: &dyn Interaction,
    ) -> Result<Option<ArgValue>, ValidationError> {
        match self {
            ExtraParam::Comment(message) => {
                interaction.display(message, DisplayStyle::Info);
                Ok(value)
            }
            ExtraParam::Ask(message) => prompt_if_missing(
                arg_name,
                value,
                interaction,
                message,
                PromptKind::Plain,
            ),
            ExtraParam::Password(message) => prompt_if_missing(
                arg_name,
                value,
                interaction,
                message,
                PromptKind::Password { confirm: true },
            ),
            ExtraParam::Required(true) => match &value {
                Some(v) if !v.is_empty() => Ok(value),
                _ => Err(ValidationError::Required {
                    argument: arg_name.to_string(),
                }),
            },
            ExtraParam::Required(false) => Ok(value),
            ExtraParam::Pattern { regex, message } => {
                let Some(current) = &value else {
                    return Ok(value);
                };
                let items: Vec<&ArgValue> = match current {
                    ArgValue::List(items) => items.iter().collect(),
                    single => vec![single],
                };
                for item in items {
                    if item.is_empty() {
                        continue;
                    }
                    if !regex.is_match(&item.to_text()) {
                        return Err(ValidationError::Invalid {
                            argument: arg_name.to_string(),
                            message: interaction.translate(message),
                        });
                    }
                }
                Ok(value)
            }
        }
    }
}

fn prompt_if_missing(
    arg_name: &str,
    value: Option<ArgValue>,
    interaction: &dyn Interaction,
    message: &str,
    kind: PromptKind,
) -> Result<Option<ArgValue>, ValidationError> {
    if matches!(&value, Some(v) if !v.is_empty()) {
        return Ok(value);
    }
    match interaction.prompt(message, kind) {
        Ok(Some(answer)) => Ok(Some(ArgValue::Str(answer))),
        Ok(None) => Ok(value),
        Err(PromptError::Mismatch) => Err(ValidationError::Mismatch {
            argument: arg_name.to_string(),
        }),
        Err(PromptError::Io(e)) => Err(ValidationError::Invalid {
            argument: arg_name.to_string(),
            message: e,
        }),
    }
}

/// The ordered set of kinds applied on one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    kinds: Vec<ParamKind>,
}

impl Pipeline {
    /// Every kind on the CLI; no prompts or displays over HTTP.
    pub fn for_interface(interface: Interface) -> Self {
        let kinds = ParamKind::ALL
            .into_iter()
            .filter(|kind| interface.is_interactive() || !kind.is_interactive())
            .collect();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[ParamKind] {
        &self.kinds
    }

    /// Apply every enabled extra of `arg` to `value`.
    pub fn apply_argument(
        &self,
        arg: &ArgumentSpec,
        value: Option<ArgValue>,
        interaction: &dyn Interaction,
    ) -> Result<Option<ArgValue>, ValidationError> {
        let mut value = value;
        for kind in &self.kinds {
            for param in arg.extras.iter().filter(|p| p.kind() == *kind) {
                let before_missing = !matches!(&value, Some(v) if !v.is_empty());
                value = param.apply(&arg.name, value, interaction)?;
                if before_missing && matches!(kind, ParamKind::Ask | ParamKind::Password) {
                    value = shape_prompted(arg, value)?;
                }
            }
        }
        Ok(value)
    }

    /// Apply global-argument extras, then the action's own.
    pub fn run(
        &self,
        global_specs: &[ArgumentSpec],
        action: &ActionSpec,
        args: &mut Arguments,
        globals: &mut Arguments,
        interaction: &dyn Interaction,
    ) -> Result<(), ValidationError> {
        apply_all(self, global_specs, globals, interaction)?;
        apply_all(self, &action.arguments, args, interaction)
    }
}

fn apply_all(
    pipeline: &Pipeline,
    specs: &[ArgumentSpec],
    values: &mut Arguments,
    interaction: &dyn Interaction,
) -> Result<(), ValidationError> {
    for spec in specs {
        if spec.extras.is_empty() {
            continue;
        }
        let current = values.take(&spec.name);
        let updated = pipeline.apply_argument(spec, current, interaction)?;
        values.set(&spec.name, updated);
    }
    Ok(())
}

/// A prompted answer is raw text: give it the argument's type and shape.
fn shape_prompted(
    arg: &ArgumentSpec,
    value: Option<ArgValue>,
) -> Result<Option<ArgValue>, ValidationError> {
    match value {
        Some(ArgValue::Str(answer)) => {
            let typed = arg.coerce(&answer)?;
            Ok(Some(if arg.cardinality.is_list() {
                ArgValue::List(vec![typed])
            } else {
                typed
            }))
        }
        other => Ok(other),
    }
}

//! Interaction hooks: how the core prompts for values and shows messages.
//!
//! The dispatcher never talks to a terminal directly. Each request carries an
//! `Interaction`; the CLI supplies a terminal-backed one, the HTTP adapter one that
//! cannot prompt.

use dialoguer::{Input, Password};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::IsTerminal;
use thiserror::Error;
use tracing::debug;

/// What kind of answer a prompt expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Plain,
    /// Hidden input; `confirm` asks twice and requires both entries to match
    Password { confirm: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStyle {
    Info,
    Success,
    Warning,
    Error,
}

impl DisplayStyle {
    pub fn name(&self) -> &'static str {
        match self {
            DisplayStyle::Info => "info",
            DisplayStyle::Success => "success",
            DisplayStyle::Warning => "warning",
            DisplayStyle::Error => "error",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("entries do not match")]
    Mismatch,

    #[error("prompt failed: {0}")]
    Io(String),
}

/// Hooks the core uses to reach the caller.
pub trait Interaction: Send + Sync {
    /// Whether `prompt` can ever produce an answer.
    fn can_prompt(&self) -> bool;

    /// Ask for a value. `Ok(None)` means no answer could be obtained.
    fn prompt(&self, message: &str, kind: PromptKind) -> Result<Option<String>, PromptError>;

    fn display(&self, message: &str, style: DisplayStyle);

    /// Turn a message key into text. Unknown keys come back unchanged.
    fn translate(&self, key: &str) -> String {
        translate(key)
    }
}

/// English text for the keys the core itself emits.
pub fn translate(key: &str) -> String {
    let text = match key {
        "password" => "Password",
        "pattern_not_match" => "Value does not match the expected pattern",
        "values_mismatch" => "Values do not match",
        "argument_required" => "Argument is required",
        "logged_in" => "Logged in",
        "logged_out" => "Logged out",
        "not_logged_in" => "Not logged in",
        "instance_already_running" => "An instance is already running",
        "websocket_request_expected" => "A WebSocket request was expected",
        "deprecated_command" => "This command is deprecated and will be removed",
        "deprecated_command_alias" => "This command alias is deprecated",
        // demo namespace
        "widget_color" => "Widget color (red, green, blue)",
        "widget_created" => "Widget created",
        "widget_delete_warning" => "Deleting a widget also drops its parts",
        "widget_name_invalid" => "Widget names are lowercase letters, digits and dashes",
        other => return other.to_string(),
    };
    text.to_string()
}

/// Terminal-backed interaction for the CLI.
pub struct TerminalInteraction {
    interactive: bool,
    color: bool,
}

impl TerminalInteraction {
    /// Prompts only when stdin is a terminal.
    pub fn new() -> Self {
        Self {
            interactive: std::io::stdin().is_terminal(),
            color: std::io::stderr().is_terminal(),
        }
    }
}

impl Default for TerminalInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl Interaction for TerminalInteraction {
    fn can_prompt(&self) -> bool {
        self.interactive
    }

    fn prompt(&self, message: &str, kind: PromptKind) -> Result<Option<String>, PromptError> {
        if !self.interactive {
            return Ok(None);
        }
        let message = self.translate(message);
        let answer = match kind {
            PromptKind::Plain => Input::<String>::new()
                .with_prompt(&message)
                .allow_empty(true)
                .interact_text()
                .map_err(|e| PromptError::Io(e.to_string()))?,
            PromptKind::Password { confirm } => {
                let first = Password::new()
                    .with_prompt(&message)
                    .allow_empty_password(true)
                    .interact()
                    .map_err(|e| PromptError::Io(e.to_string()))?;
                if confirm {
                    let second = Password::new()
                        .with_prompt(format!("Confirm {}", message.to_lowercase()))
                        .allow_empty_password(true)
                        .interact()
                        .map_err(|e| PromptError::Io(e.to_string()))?;
                    if first != second {
                        return Err(PromptError::Mismatch);
                    }
                }
                first
            }
        };
        Ok(if answer.is_empty() { None } else { Some(answer) })
    }

    fn display(&self, message: &str, style: DisplayStyle) {
        let message = self.translate(message);
        if !self.color {
            match style {
                DisplayStyle::Info => eprintln!("{}", message),
                DisplayStyle::Success => eprintln!("Success! {}", message),
                DisplayStyle::Warning => eprintln!("Warning: {}", message),
                DisplayStyle::Error => eprintln!("Error: {}", message),
            }
            return;
        }
        match style {
            DisplayStyle::Info => eprintln!("{}", message),
            DisplayStyle::Success => eprintln!("{} {}", "Success!".green().bold(), message),
            DisplayStyle::Warning => eprintln!("{} {}", "Warning:".yellow().bold(), message),
            DisplayStyle::Error => eprintln!("{} {}", "Error:".red().bold(), message),
        }
    }
}

/// Interaction for callers that cannot be asked anything and show nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Interaction for NonInteractive {
    fn can_prompt(&self) -> bool {
        false
    }

    fn prompt(&self, _message: &str, _kind: PromptKind) -> Result<Option<String>, PromptError> {
        Ok(None)
    }

    fn display(&self, message: &str, _style: DisplayStyle) {
        debug!(message = %message, "Display suppressed for non-interactive caller");
    }
}

/// Pre-seeded answers; records every prompt and display. For tests and scripted runs.
#[derive(Debug, Default)]
pub struct ScriptedInteraction {
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    displayed: Mutex<Vec<(DisplayStyle, String)>>,
}

impl ScriptedInteraction {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            displayed: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn displayed(&self) -> Vec<(DisplayStyle, String)> {
        self.displayed.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().len()
    }
}

impl Interaction for ScriptedInteraction {
    fn can_prompt(&self) -> bool {
        true
    }

    fn prompt(&self, message: &str, kind: PromptKind) -> Result<Option<String>, PromptError> {
        self.prompts.lock().push(message.to_string());
        let mut answers = self.answers.lock();
        let first = match answers.pop_front() {
            Some(answer) => answer,
            None => return Ok(None),
        };
        if let PromptKind::Password { confirm: true } = kind {
            if answers.pop_front().as_deref() != Some(first.as_str()) {
                return Err(PromptError::Mismatch);
            }
        }
        Ok(if first.is_empty() { None } else { Some(first) })
    }

    fn display(&self, message: &str, style: DisplayStyle) {
        self.displayed.lock().push((style, message.to_string()));
    }
}

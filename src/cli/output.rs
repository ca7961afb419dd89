//! CLI output: result rendering and error mapping to a stable CLI surface.

use crate::error::DispatchError;
use owo_colors::OwoColorize;
use serde_json::Value;
use std::fmt::Write;

/// How action results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Indented, coloured keys
    #[default]
    Pretty,
    Json,
    /// `#key` headers, for scripts
    Plain,
    None,
}

impl OutputFormat {
    /// From `--output-as`; unknown or missing means pretty.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("json") => OutputFormat::Json,
            Some("plain") => OutputFormat::Plain,
            Some("none") => OutputFormat::None,
            _ => OutputFormat::Pretty,
        }
    }
}

/// Render a result; `None` when there is nothing to print.
pub fn render(value: &Value, format: OutputFormat, color: bool) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let text = match format {
        OutputFormat::None => return None,
        OutputFormat::Json => value.to_string(),
        OutputFormat::Plain => {
            let mut out = String::new();
            plain(&mut out, skip_single_key(value), 0);
            out
        }
        OutputFormat::Pretty => match value {
            Value::String(s) => s.clone(),
            Value::Object(_) => {
                let mut out = String::new();
                pretty(&mut out, value, 0, color);
                out
            }
            Value::Array(items) => {
                let mut out = String::new();
                pretty_list(&mut out, items, 0, color);
                out
            }
            other => other.to_string(),
        },
    };
    Some(text.trim_end_matches('\n').to_string())
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn skip_single_key(value: &Value) -> &Value {
    match value {
        Value::Object(map) if map.len() == 1 => map.values().next().unwrap_or(value),
        other => other,
    }
}

fn plain(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Array(items) => {
            for item in items {
                plain(out, item, depth + 1);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let _ = writeln!(out, "{}{}", "#".repeat(depth + 1), key);
                plain(out, item, depth + 1);
            }
        }
        other => {
            let _ = writeln!(out, "{}", scalar(other));
        }
    }
}

fn key_text(key: &str, color: bool) -> String {
    if color {
        key.purple().to_string()
    } else {
        key.to_string()
    }
}

fn pretty(out: &mut String, value: &Value, depth: usize, color: bool) {
    let Value::Object(map) = value else {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), scalar(value));
        return;
    };
    let indent = "  ".repeat(depth);
    for (key, item) in map {
        let key = key_text(key, color);
        let item = match item {
            Value::Array(items) if items.len() == 1 => &items[0],
            other => other,
        };
        match item {
            Value::Object(_) => {
                let _ = writeln!(out, "{}{}: ", indent, key);
                pretty(out, item, depth + 1, color);
            }
            Value::Array(items) => {
                let _ = writeln!(out, "{}{}: ", indent, key);
                pretty_list(out, items, depth + 1, color);
            }
            other => {
                let _ = writeln!(out, "{}{}: {}", indent, key, scalar(other));
            }
        }
    }
}

fn pretty_list(out: &mut String, items: &[Value], depth: usize, color: bool) {
    let indent = "  ".repeat(depth);
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::Object(_) => {
                let _ = writeln!(out, "{}{}: ", indent, key_text(&index.to_string(), color));
                pretty(out, item, depth + 1, color);
            }
            other => {
                let _ = writeln!(out, "{}- {}", indent, scalar(other));
            }
        }
    }
}

/// Map a dispatch failure to the line printed on stderr.
pub fn map_error(e: &DispatchError) -> String {
    match e {
        // clap already rendered usage errors in full.
        DispatchError::Validation(crate::error::ValidationError::Usage(text)) => {
            text.trim_end().to_string()
        }
        other => format!("Error: {}", other),
    }
}

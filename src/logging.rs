//! Logging System
//!
//! Structured logging implementation using the `tracing` crate. Provides configurable
//! log levels, output formats, and destinations. The CLI logs to stderr by default so
//! that action results written to stdout stay machine readable.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Disable to install no subscriber at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output includes "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format only, stdout/stderr only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    std::env::temp_dir().join("actionmap").join("actionmap.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. CLI arguments (folded into the config by the binary)
/// 2. Environment variables (ACTIONMAP_LOG, ACTIONMAP_LOG_FORMAT, etc.)
/// 3. Configuration file
/// 4. Defaults
///
/// Installing a second global subscriber is an error; callers that may run twice (tests)
/// should ignore it.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ConfigError> {
    if let Some(config) = config {
        if !config.enabled {
            return Ok(());
        }
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true) && !output.file;

    let writer = match (output.file, output.stdout, output.stderr) {
        (true, _, true) => BoxMakeWriter::new(Mutex::new(open_log_file(config)?).and(std::io::stderr)),
        (true, _, _) => BoxMakeWriter::new(Mutex::new(open_log_file(config)?)),
        (false, true, _) => BoxMakeWriter::new(std::io::stdout),
        (false, false, _) => BoxMakeWriter::new(std::io::stderr),
    };

    let base_subscriber = Registry::default().with(filter);
    let result = if format == "json" {
        base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init()
    };

    result.map_err(|e| ConfigError::Settings(format!("Failed to install logger: {}", e)))
}

fn open_log_file(config: Option<&LoggingConfig>) -> Result<std::fs::File, ConfigError> {
    let log_file = config
        .map(|c| c.file.clone())
        .unwrap_or_else(default_log_file);

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::Settings(format!("Failed to create log directory: {}", e))
        })?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|e| {
            ConfigError::Settings(format!("Failed to open log file {:?}: {}", log_file, e))
        })
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_env("ACTIONMAP_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("warn");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level);
            filter = filter.add_directive(directive.parse().map_err(|e| {
                ConfigError::Settings(format!("Invalid log directive: {}", e))
            })?);
        }
    }

    if let Ok(modules_str) = std::env::var("ACTIONMAP_LOG_MODULES") {
        for module_spec in modules_str.split(',') {
            if let Some((module, module_level)) = module_spec.split_once('=') {
                let directive = format!("{}={}", module.trim(), module_level.trim());
                filter = filter.add_directive(directive.parse().map_err(|e| {
                    ConfigError::Settings(format!("Invalid log directive from env: {}", e))
                })?);
            }
        }
    }

    Ok(filter)
}

/// Determine output format from config or environment
fn determine_format(config: Option<&LoggingConfig>) -> Result<String, ConfigError> {
    if let Ok(format) = std::env::var("ACTIONMAP_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(ConfigError::Settings(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }

    Ok(format.to_string())
}

/// Output destinations
#[derive(Debug, PartialEq)]
struct OutputDestinations {
    stdout: bool,
    stderr: bool,
    file: bool,
}

/// Determine output destinations from config or environment
fn determine_output(config: Option<&LoggingConfig>) -> Result<OutputDestinations, ConfigError> {
    if let Ok(output) = std::env::var("ACTIONMAP_LOG_OUTPUT") {
        return parse_output_destinations(&output);
    }

    let output = config.map(|c| c.output.as_str()).unwrap_or("stderr");
    parse_output_destinations(output)
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations, ConfigError> {
    match output {
        "stdout" => Ok(OutputDestinations {
            stdout: true,
            stderr: false,
            file: false,
        }),
        "stderr" => Ok(OutputDestinations {
            stdout: false,
            stderr: true,
            file: false,
        }),
        "file" => Ok(OutputDestinations {
            stdout: false,
            stderr: false,
            file: true,
        }),
        "file+stderr" => Ok(OutputDestinations {
            stdout: false,
            stderr: true,
            file: true,
        }),
        _ => Err(ConfigError::Settings(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr', 'file', or 'file+stderr')",
            output
        ))),
    }
}

/// Check a logging section without installing anything.
pub fn validate(config: &LoggingConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if config.format != "json" && config.format != "text" {
        problems.push(format!("logging.format: unknown format '{}'", config.format));
    }
    if let Err(e) = parse_output_destinations(&config.output) {
        problems.push(format!("logging.output: {}", e));
    }
    if !matches!(
        config.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        problems.push(format!("logging.level: unknown level '{}'", config.level));
    }
    problems
}

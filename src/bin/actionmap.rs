//! Actionmap CLI Binary
//!
//! Runs one action from the installed action maps and prints its result.

use actionmap::cli::{self, CliOutcome, GlobalArgs, RunContext};
use actionmap::config::{ActionMapConfig, ConfigLoader};
use actionmap::demo::{self, WidgetStore};
use actionmap::interaction::TerminalInteraction;
use actionmap::lock::release_held_locks;
use actionmap::logging::{init_logging, LoggingConfig};
use actionmap::registry::ActionRegistry;
use std::io::IsTerminal;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Exit status after Ctrl-C (128 + SIGINT).
const INTERRUPTED: i32 = 130;

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let globals = cli::bootstrap(&argv);

    let config = match ConfigLoader::load(globals.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(78);
        }
    };

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&globals, &config);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Actionmap CLI starting");
    install_interrupt_handler();

    let mut registry = ActionRegistry::new();
    if let Err(e) = demo::register(&mut registry, Arc::new(WidgetStore::new())) {
        eprintln!("Error: {}", e);
        process::exit(78);
    }

    let context = match RunContext::new(config, globals, registry) {
        Ok(ctx) => {
            debug!("CLI context initialized");
            ctx
        }
        Err(e) => {
            error!("Error initializing action maps: {}", e);
            eprintln!("{}", cli::map_error(&e));
            process::exit(e.kind().exit_code());
        }
    };

    let interaction = TerminalInteraction::new();
    match context.execute(&argv, &interaction) {
        Ok(CliOutcome::Help(text)) => print!("{}", text),
        Ok(CliOutcome::Result { value, format }) => {
            info!("Command completed successfully");
            if let Some(text) = cli::render(&value, format, std::io::stdout().is_terminal()) {
                println!("{}", text);
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", cli::map_error(&e));
            process::exit(e.kind().exit_code());
        }
    }
}

/// Release held namespace locks on Ctrl-C before exiting.
fn install_interrupt_handler() {
    let spawned = std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(|| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start interrupt handler: {}", e);
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                let released = release_held_locks();
                info!(released, "Interrupted");
                process::exit(INTERRUPTED);
            }
        });
    if let Err(e) = spawned {
        error!("Failed to spawn interrupt handler: {}", e);
    }
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(globals: &GlobalArgs, config: &ActionMapConfig) -> LoggingConfig {
    let mut logging = config.logging.clone();

    if globals.quiet {
        logging.enabled = false;
    }
    if globals.verbose {
        logging.level = "debug".to_string();
        // Keep verbose output visible when logs otherwise go only to a file.
        if logging.output == "file" {
            logging.output = "file+stderr".to_string();
        }
    }
    if let Some(ref level) = globals.log_level {
        logging.level = level.clone();
    }
    if let Some(ref format) = globals.log_format {
        logging.format = format.clone();
    }
    if let Some(ref output) = globals.log_output {
        logging.output = output.clone();
    }
    if let Some(ref file) = globals.log_file {
        logging.file = file.clone();
    }

    logging
}

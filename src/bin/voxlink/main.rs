//! VoxLink entrypoint: parses the CLI, installs logging, then serves the JSON-lines front end.
//!
//! # Architecture
//!
//! - Stdin reader: parses one JSON command per line
//! - Main loop: owns every chat and voice screen and writes events to stdout
//! - Connect/reader threads: one per Wi-Fi chat
//! - Speech worker: one per voice session, shared by every subscribed device

use anyhow::Result;
use std::panic;
use voxlink::config::AppConfig;
use voxlink::ipc::run_ipc_mode;
use voxlink::{init_logging, init_tracing, log_debug, log_file_path, log_panic};

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous(info);
    }));
}

fn main() -> Result<()> {
    let config = match AppConfig::parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(2);
        }
    };

    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();

    log_debug("=== VoxLink Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.default_endpoint(),
        recognizer = !config.recognizer_argv.is_empty(),
        "voxlink starting"
    );

    let result = run_ipc_mode(config);
    if let Err(err) = &result {
        log_debug(&format!("VoxLink exiting with error: {err:#}"));
    }
    tracing::info!(ok = result.is_ok(), "voxlink stopped");
    result
}

//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

pub(crate) use validation::is_valid_host;

use crate::device::Endpoint;
use crate::speech::{ModelSource, RestartPolicy};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_CONTROLLER_HOST, DEFAULT_CONTROLLER_PORT,
    DEFAULT_MODEL_PATH, DEFAULT_RESTART_DELAY_MS, DEFAULT_SAMPLE_RATE, MAX_CONNECT_TIMEOUT_MS,
    MAX_RESTART_DELAY_MS, MIN_CONNECT_TIMEOUT_MS, MIN_RESTART_DELAY_MS,
};

/// CLI options for the VoxLink bridge. Validated values keep the recognizer subprocess safe.
#[derive(Debug, Parser, Clone)]
#[command(about = "VoxLink device chat and voice bridge", author, version)]
pub struct AppConfig {
    /// Controller host used when a chat is opened without an explicit endpoint
    #[arg(long, env = "VOXLINK_HOST", default_value = DEFAULT_CONTROLLER_HOST)]
    pub host: String,

    /// Controller port used when a chat is opened without an explicit endpoint
    #[arg(long, env = "VOXLINK_PORT", default_value_t = DEFAULT_CONTROLLER_PORT)]
    pub port: u16,

    /// How long a connect attempt may block before it is reported as failed (milliseconds)
    #[arg(long = "connect-timeout-ms", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Offline acoustic model handed to the recognizer
    #[arg(long = "model-path", env = "VOXLINK_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// Recognizer command line; it must print one JSON hypothesis per stdout line
    #[arg(long = "recognizer-cmd", env = "VOXLINK_RECOGNIZER_CMD")]
    pub recognizer_cmd: Option<String>,

    /// Sample rate exported to the recognizer (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Delay before the recognizer is restarted after an error, timeout, or utterance end
    #[arg(long = "restart-delay-ms", default_value_t = DEFAULT_RESTART_DELAY_MS)]
    pub restart_delay_ms: u64,

    /// Give up after this many consecutive restarts (unbounded when omitted)
    #[arg(long = "max-engine-restarts")]
    pub max_engine_restarts: Option<u64>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VOXLINK_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VOXLINK_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging message text and transcripts (debug log only)
    #[arg(
        long = "log-content",
        env = "VOXLINK_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Write structured JSON traces (see VOXLINK_TRACE_LOG)
    #[arg(long = "trace", default_value_t = false)]
    pub trace: bool,

    /// Program plus arguments split out of --recognizer-cmd during validation
    #[arg(skip)]
    pub recognizer_argv: Vec<String>,
}

impl AppConfig {
    pub fn default_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn model_source(&self) -> ModelSource {
        ModelSource::new(self.model_path.clone())
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        let policy = RestartPolicy::fixed(Duration::from_millis(self.restart_delay_ms));
        match self.max_engine_restarts {
            Some(limit) => policy.with_max_restarts(limit),
            None => policy,
        }
    }
}

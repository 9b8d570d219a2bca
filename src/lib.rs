pub mod config;
pub mod device;
pub mod ipc;
pub mod router;
pub mod speech;
pub mod surface;
pub mod transport;
pub mod voice;

mod app;
mod lock;
mod telemetry;

pub use app::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub(crate) use lock::lock_or_recover;
pub use telemetry::init_tracing;

//! JSON IPC mode for driving the bridge from an external front end.
//!
//! Architecture:
//! - Stdin reader thread: parses JSON commands and forwards them over a channel
//! - Main loop: the single presentation context; handles commands, drains every
//!   surface inbox and the engine notice queue, emits events
//!
//! Protocol:
//! - Each line is a JSON object
//! - Events (Rust → client): {"event": "...", ...}
//! - Commands (client → Rust): {"cmd": "...", ...}

mod handlers;
mod protocol;
mod session;

#[cfg(test)]
mod tests;

pub use protocol::{IpcCommand, IpcEvent};
pub use session::run_ipc_mode;

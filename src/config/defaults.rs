/// Address the controller's soft access point hands out to itself.
pub const DEFAULT_CONTROLLER_HOST: &str = "192.168.4.1";
/// Telnet-style control port the controller firmware listens on.
pub const DEFAULT_CONTROLLER_PORT: u16 = 23;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const MIN_CONNECT_TIMEOUT_MS: u64 = 100;
pub const MAX_CONNECT_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_MODEL_PATH: &str = "model";
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Gap between a recognizer fault (or end of utterance) and the next listen.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 500;
pub const MIN_RESTART_DELAY_MS: u64 = 50;
pub const MAX_RESTART_DELAY_MS: u64 = 10_000;

pub(super) const MAX_HOST_LEN: usize = 253;
pub(super) const MAX_RECOGNIZER_ARGS: usize = 32;
pub(super) const MAX_RECOGNIZER_ARG_BYTES: usize = 4096;

use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 2 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;

static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_WRITER: Mutex<Option<LogWriter>> = Mutex::new(None);

/// Debug log location; `VOXLINK_LOG` overrides the temp-dir default.
pub fn log_file_path() -> PathBuf {
    env::var("VOXLINK_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("voxlink.log"))
}

/// Crash log location. Entries hold panic locations, not message text.
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("voxlink_crash.log")
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

/// Append-only log that moves a full file to `<path>.1` and starts over.
struct LogWriter {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    len: u64,
}

impl LogWriter {
    fn open(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        let len = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        Some(Self {
            path,
            file,
            max_bytes,
            len,
        })
    }

    fn roll(&mut self) {
        let _ = fs::rename(&self.path, backup_path(&self.path));
        if let Ok(file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            self.file = file;
            self.len = 0;
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.len > 0 && self.len + line.len() as u64 > self.max_bytes {
            self.roll();
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.len += line.len() as u64;
        }
    }
}

// Not `lock_or_recover`: it reports poisoning through this very log.
fn writer() -> MutexGuard<'static, Option<LogWriter>> {
    LOG_WRITER.lock().unwrap_or_else(PoisonError::into_inner)
}

fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

/// `[secs.millis] [thread] message`; worker threads are named `voxlink-*`.
fn format_line(msg: &str) -> String {
    let current = thread::current();
    let name = current.name().unwrap_or("unnamed");
    format!("[{}] [{name}] {msg}\n", timestamp())
}

/// Apply the logging flags. Content logging needs base logging.
pub fn init_logging(config: &AppConfig) {
    let enabled = config.logs && !config.no_logs;
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && config.log_content, Ordering::Relaxed);
    *writer() = if enabled {
        LogWriter::open(log_file_path(), LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Write to the debug log file. Stdout is reserved for IPC events.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format_line(msg);
    if let Some(log) = writer().as_mut() {
        log.write_line(&line);
    }
}

/// For lines that carry chat text or transcripts; dropped unless `--log-content`.
pub fn log_debug_content(msg: &str) {
    if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        log_debug(msg);
    }
}

fn panic_payload(info: &panic::PanicHookInfo<'_>) -> String {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return "payload omitted".to_string();
    }
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string payload".to_string())
}

/// Record a panic in the crash log when logging is enabled.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let line = format_line(&format!(
        "panic at {location}: {} (voxlink {})",
        panic_payload(info),
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(mut writer) = LogWriter::open(crash_log_path(), CRASH_LOG_MAX_BYTES) {
        writer.write_line(&line);
    }
}

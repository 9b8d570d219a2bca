use crate::config::AppConfig;
use crate::device::DeviceId;
use crate::router::MessageRouter;
use crate::speech::{
    BackendFactory, CommandBackend, EngineNotice, SpeechBackend, UnavailableBackend,
};
use crate::surface::{ChatSurface, UiEvent, VoiceSurface};
use crate::voice::VoiceSessionManager;
use crate::{log_debug, log_debug_content};
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver as NoticeReceiver};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
#[cfg(any(test, feature = "mutants"))]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
#[cfg(any(test, feature = "mutants"))]
use std::sync::Mutex;
#[cfg(any(test, feature = "mutants"))]
use std::sync::OnceLock;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
#[cfg(any(test, feature = "mutants"))]
use std::time::Instant;

use super::handlers::handle_command;
use super::protocol::{IpcCommand, IpcEvent};

// ============================================================================
// IPC State
// ============================================================================

pub(super) struct IpcState {
    pub(super) config: AppConfig,
    pub(super) router: Arc<MessageRouter>,
    pub(super) sessions: Arc<VoiceSessionManager>,
    pub(super) engine_notices: NoticeReceiver<EngineNotice>,
    pub(super) chats: BTreeMap<DeviceId, ChatSurface>,
    pub(super) voices: BTreeMap<DeviceId, VoiceSurface>,
    pub(super) session_id: String,
    pub(super) quit_requested: bool,
}

impl IpcState {
    pub(super) fn new(config: AppConfig) -> Self {
        let factory: Arc<dyn BackendFactory> = if config.recognizer_argv.is_empty() {
            log_debug("No recognizer command configured; voice sessions will report load failures");
            Arc::new(|| -> Box<dyn SpeechBackend> { Box::new(UnavailableBackend) })
        } else {
            let argv = config.recognizer_argv.clone();
            let sample_rate = config.sample_rate;
            Arc::new(move || -> Box<dyn SpeechBackend> {
                Box::new(CommandBackend::new(argv.clone(), sample_rate))
            })
        };
        Self::with_backend(config, factory)
    }

    pub(super) fn with_backend(config: AppConfig, factory: Arc<dyn BackendFactory>) -> Self {
        let session_id = format!(
            "{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
        );

        let router = Arc::new(MessageRouter::new());
        let (notice_tx, engine_notices) = unbounded();
        let sessions = Arc::new(
            VoiceSessionManager::new(
                Arc::clone(&router),
                factory,
                config.model_source(),
                config.restart_policy(),
            )
            .with_notice_sink(move |notice| {
                let _ = notice_tx.send(notice.clone());
            }),
        );

        Self {
            config,
            router,
            sessions,
            engine_notices,
            chats: BTreeMap::new(),
            voices: BTreeMap::new(),
            session_id,
            quit_requested: false,
        }
    }

    pub(super) fn emit_capabilities(&self) {
        send_event(&IpcEvent::Capabilities {
            session_id: self.session_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_endpoint: self.config.default_endpoint().to_string(),
            model_path: self.config.model_path.display().to_string(),
            recognizer_configured: !self.config.recognizer_argv.is_empty(),
            open_chats: self.chats.keys().map(DeviceId::to_string).collect(),
            open_voices: self.voices.keys().map(DeviceId::to_string).collect(),
        });
    }

    pub(super) fn emit_active_devices(&self) {
        send_event(&IpcEvent::ActiveDevices {
            phase: self.sessions.phase(),
            active: self
                .sessions
                .list_active()
                .iter()
                .map(DeviceId::to_string)
                .collect(),
            minimized: self
                .sessions
                .list_minimized()
                .iter()
                .map(DeviceId::to_string)
                .collect(),
        });
    }

    /// Drain every surface inbox and the engine notice queue.
    pub(super) fn pump(&mut self) {
        for (device, chat) in self.chats.iter_mut() {
            for event in chat.pump() {
                emit_ui_event(device, event);
            }
        }
        for (device, voice) in self.voices.iter_mut() {
            for event in voice.pump() {
                emit_ui_event(device, event);
            }
        }
        for notice in self.engine_notices.try_iter() {
            send_event(&IpcEvent::Engine { notice });
        }
    }

    /// Close every surface; voice screens leave the session too.
    pub(super) fn shutdown(&mut self) {
        for (_, mut chat) in std::mem::take(&mut self.chats) {
            chat.close();
        }
        for (_, mut voice) in std::mem::take(&mut self.voices) {
            voice.close();
        }
        let remaining = self.sessions.stop_all();
        if !remaining.is_empty() {
            log_debug(&format!("Stopped voice session for {} minimized device(s)", remaining.len()));
        }
    }
}

pub(super) fn emit_ui_event(device: &DeviceId, event: UiEvent) {
    let device = device.to_string();
    let ipc_event = match event {
        UiEvent::Message(message) => IpcEvent::Message {
            device,
            sender: message.sender,
            content: message.content,
        },
        UiEvent::Connection(status) => IpcEvent::Connection { device, status },
        UiEvent::LiveTranscript(text) => IpcEvent::LiveTranscript { device, text },
        UiEvent::Notice(message) => IpcEvent::Notice { device, message },
    };
    send_event(&ipc_event);
}

// ============================================================================
// Event Sending
// ============================================================================

pub(super) fn send_event(event: &IpcEvent) {
    #[cfg(any(test, feature = "mutants"))]
    if capture_test_event(event) {
        return;
    }
    if let Ok(json) = serde_json::to_string(event) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{json}");
        let _ = stdout.flush();
    }
}

#[cfg(any(test, feature = "mutants"))]
static EVENT_SINK: OnceLock<Mutex<Vec<IpcEvent>>> = OnceLock::new();
#[cfg(any(test, feature = "mutants"))]
pub(super) static IPC_LOOP_COUNT: AtomicU64 = AtomicU64::new(0);

#[cfg(any(test, feature = "mutants"))]
fn capture_test_event(event: &IpcEvent) -> bool {
    if let Some(sink) = EVENT_SINK.get() {
        if let Ok(mut events) = sink.lock() {
            events.push(event.clone());
            return true;
        }
    }
    false
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn init_event_sink() {
    let _ = EVENT_SINK.get_or_init(|| Mutex::new(Vec::new()));
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn ipc_loop_count() -> u64 {
    IPC_LOOP_COUNT.load(Ordering::SeqCst)
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn event_snapshot() -> usize {
    init_event_sink();
    EVENT_SINK
        .get()
        .and_then(|sink| sink.lock().ok().map(|events| events.len()))
        .unwrap_or(0)
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn events_since(start: usize) -> Vec<IpcEvent> {
    EVENT_SINK
        .get()
        .and_then(|sink| {
            sink.lock()
                .ok()
                .map(|events| events.iter().skip(start).cloned().collect())
        })
        .unwrap_or_default()
}

// ============================================================================
// Stdin Reader Thread
// ============================================================================

#[cfg_attr(any(test, feature = "mutants"), allow(dead_code))]
fn spawn_stdin_reader(tx: Sender<IpcCommand>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<IpcCommand>(trimmed) {
                Ok(cmd) => {
                    if tx.send(cmd).is_err() {
                        break; // Main loop has exited
                    }
                }
                Err(e) => {
                    send_event(&IpcEvent::Error {
                        message: format!("Invalid command: {e}"),
                        recoverable: true,
                    });
                }
            }
        }
        log_debug("Stdin reader thread exiting");
    })
}

// ============================================================================
// Main Event Loop
// ============================================================================

pub fn run_ipc_mode(config: AppConfig) -> Result<()> {
    log_debug("Starting JSON IPC mode");
    tracing::info!(endpoint = %config.default_endpoint(), "ipc mode starting");

    let mut state = IpcState::new(config);
    state.emit_capabilities();

    let (cmd_tx, cmd_rx) = mpsc::channel();
    #[cfg(any(test, feature = "mutants"))]
    {
        drop(cmd_tx);
        run_ipc_loop(&mut state, &cmd_rx, Some(10))
    }
    #[cfg(not(any(test, feature = "mutants")))]
    {
        let _stdin_handle = spawn_stdin_reader(cmd_tx);
        run_ipc_loop(&mut state, &cmd_rx, None)
    }
}

#[cfg(any(test, feature = "mutants"))]
pub(super) fn ipc_guard_tripped(elapsed: Duration) -> bool {
    elapsed > Duration::from_secs(5)
}

pub(super) fn run_ipc_loop(
    state: &mut IpcState,
    cmd_rx: &Receiver<IpcCommand>,
    max_loops: Option<u64>,
) -> Result<()> {
    #[cfg(any(test, feature = "mutants"))]
    let guard_start = Instant::now();
    let mut loop_count: u64 = 0;
    loop {
        #[cfg(any(test, feature = "mutants"))]
        if ipc_guard_tripped(guard_start.elapsed()) {
            panic!("IPC loop guard exceeded");
        }
        loop_count += 1;
        #[cfg(any(test, feature = "mutants"))]
        IPC_LOOP_COUNT.store(loop_count, Ordering::SeqCst);
        if loop_count.is_multiple_of(1000) {
            log_debug(&format!(
                "IPC loop iteration {loop_count}, chats: {}, voices: {}",
                state.chats.len(),
                state.voices.len()
            ));
        }

        if let Some(limit) = max_loops {
            if loop_count >= limit {
                log_debug("IPC loop reached test limit, exiting");
                break;
            }
        }

        match cmd_rx.try_recv() {
            Ok(cmd) => {
                log_debug_content(&format!("IPC command received: {cmd:?}"));
                handle_command(state, cmd);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                log_debug("Command channel disconnected, exiting");
                state.pump();
                break;
            }
        }

        state.pump();

        if state.quit_requested {
            log_debug("Quit requested");
            break;
        }

        thread::sleep(Duration::from_millis(5));
    }

    state.shutdown();
    state.pump();
    tracing::info!("ipc mode exiting");
    log_debug("IPC mode exiting");
    Ok(())
}

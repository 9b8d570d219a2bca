//! Speech engine adapter.
//!
//! Wraps a [`SpeechBackend`] in a worker thread that loads the model, listens,
//! forwards every non-blank hypothesis, and restarts listening whenever a
//! session ends. The adapter is single-use: one `start`, one `stop`.

mod backend;
mod command;
mod hypothesis;
mod retry;


pub use backend::{BackendFactory, ModelSource, RecognizerEvent, SpeechBackend, UnavailableBackend};
pub use command::{CommandBackend, SAMPLE_RATE_ENV};
pub use hypothesis::extract_text;
pub use retry::{RestartPolicy, DEFAULT_RESTART_DELAY};

use crate::lock_or_recover;
use crate::{log_debug, log_debug_content};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Loading,
    Listening,
}

/// Lifecycle signal from the engine worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineNotice {
    Loading,
    Listening,
    ModelLoadFailed { message: String },
    Restarting { reason: String, attempt: u64 },
    GaveUp { attempts: u64 },
    Stopped,
}

pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type NoticeCallback = Arc<dyn Fn(&EngineNotice) + Send + Sync>;

struct EngineShared {
    state: Mutex<EngineState>,
    // Cleared by `stop`; gates `on_text` so nothing is delivered afterwards.
    active: AtomicBool,
}

impl EngineShared {
    fn set_state(&self, state: EngineState) {
        *lock_or_recover(&self.state, "engine state") = state;
    }
}

pub struct SpeechAdapter {
    factory: Arc<dyn BackendFactory>,
    model: ModelSource,
    policy: RestartPolicy,
    shared: Arc<EngineShared>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl SpeechAdapter {
    pub fn new(factory: Arc<dyn BackendFactory>, model: ModelSource, policy: RestartPolicy) -> Self {
        Self {
            factory,
            model,
            policy,
            shared: Arc::new(EngineShared {
                state: Mutex::new(EngineState::Stopped),
                active: AtomicBool::new(false),
            }),
            stop_tx: None,
            worker: None,
            started: false,
        }
    }

    pub fn state(&self) -> EngineState {
        *lock_or_recover(&self.shared.state, "engine state")
    }

    /// Spawn the worker. Returns false if this adapter was already started.
    pub fn start(&mut self, on_text: TextCallback, on_notice: NoticeCallback) -> bool {
        if self.started {
            return false;
        }
        self.started = true;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        self.shared.active.store(true, Ordering::SeqCst);
        self.shared.set_state(EngineState::Loading);
        let worker = EngineWorker {
            factory: Arc::clone(&self.factory),
            model: self.model.clone(),
            policy: self.policy,
            shared: Arc::clone(&self.shared),
            stop_rx,
            on_text,
            on_notice,
        };
        match thread::Builder::new()
            .name("voxlink-speech".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(handle);
                tracing::info!(model = %self.model.path().display(), "speech engine started");
                true
            }
            Err(err) => {
                log_debug(&format!("speech: failed to spawn worker: {err}"));
                self.shared.active.store(false, Ordering::SeqCst);
                self.shared.set_state(EngineState::Stopped);
                false
            }
        }
    }

    /// Cancel any pending restart, release the backend, and wait for the worker.
    ///
    /// Idempotent. When called from the worker thread itself the join is skipped.
    pub fn stop(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        // Dropping the sender disconnects the worker's stop channel.
        let had_worker = self.stop_tx.take().is_some();
        if let Some(handle) = self.worker.take() {
            if handle.thread().id() == thread::current().id() {
                log_debug("speech: stop requested from worker; not joining");
            } else if handle.join().is_err() {
                log_debug("speech: worker panicked");
            }
        }
        if had_worker {
            tracing::info!("speech engine stopped");
        }
        self.shared.set_state(EngineState::Stopped);
    }
}

impl Drop for SpeechAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

enum SessionEnd {
    Stopped,
    Restart(String),
}

struct EngineWorker {
    factory: Arc<dyn BackendFactory>,
    model: ModelSource,
    policy: RestartPolicy,
    shared: Arc<EngineShared>,
    stop_rx: Receiver<()>,
    on_text: TextCallback,
    on_notice: NoticeCallback,
}

impl EngineWorker {
    fn notify(&self, notice: EngineNotice) {
        if self.shared.active.load(Ordering::SeqCst) {
            (self.on_notice)(&notice);
        }
    }

    fn stop_requested(&self) -> bool {
        !self.shared.active.load(Ordering::SeqCst)
    }

    fn run(self) {
        let mut backend = self.factory.create();
        self.notify(EngineNotice::Loading);
        if let Err(err) = backend.load_model(&self.model) {
            let message = format!("{err:#}");
            tracing::warn!(error = %message, "speech model load failed");
            log_debug(&format!("speech: model load failed: {message}"));
            backend.release();
            self.shared.set_state(EngineState::Stopped);
            self.notify(EngineNotice::ModelLoadFailed { message });
            return;
        }

        let mut attempt: u64 = 0;
        loop {
            if self.stop_requested() {
                break;
            }
            let mut recognized = false;
            let end = match backend.start_listening() {
                Ok(events) => {
                    self.shared.set_state(EngineState::Listening);
                    self.notify(EngineNotice::Listening);
                    self.pump(&events, &mut recognized)
                }
                Err(err) => SessionEnd::Restart(format!("start failed: {err:#}")),
            };
            backend.stop_listening();

            let reason = match end {
                SessionEnd::Stopped => break,
                SessionEnd::Restart(reason) => reason,
            };
            if recognized {
                attempt = 0;
            }
            attempt += 1;
            let Some(delay) = self.policy.delay_for(attempt) else {
                log_debug(&format!("speech: giving up after {} restarts", attempt - 1));
                tracing::warn!(attempts = attempt - 1, "speech engine gave up restarting");
                self.notify(EngineNotice::GaveUp {
                    attempts: attempt - 1,
                });
                break;
            };
            log_debug(&format!("speech: restarting ({reason}), attempt {attempt}"));
            tracing::debug!(reason = %reason, attempt, "speech engine restarting");
            self.notify(EngineNotice::Restarting { reason, attempt });
            match self.stop_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        }

        backend.release();
        self.shared.set_state(EngineState::Stopped);
        self.notify(EngineNotice::Stopped);
        log_debug("speech: worker exiting");
    }

    fn pump(&self, events: &Receiver<RecognizerEvent>, recognized: &mut bool) -> SessionEnd {
        loop {
            select! {
                recv(self.stop_rx) -> _ => return SessionEnd::Stopped,
                recv(events) -> event => match event {
                    Err(_) => return SessionEnd::Restart("event stream closed".to_string()),
                    Ok(RecognizerEvent::Partial(raw)) | Ok(RecognizerEvent::Result(raw)) => {
                        *recognized |= self.forward(&raw);
                    }
                    Ok(RecognizerEvent::FinalResult(raw)) => {
                        *recognized |= self.forward(&raw);
                        return SessionEnd::Restart("end of utterance".to_string());
                    }
                    Ok(RecognizerEvent::Error(message)) => return SessionEnd::Restart(message),
                    Ok(RecognizerEvent::Timeout) => return SessionEnd::Restart("timeout".to_string()),
                },
            }
        }
    }

    fn forward(&self, raw: &str) -> bool {
        let text = extract_text(raw);
        if text.trim().is_empty() {
            return false;
        }
        if self.stop_requested() {
            return false;
        }
        log_debug_content(&format!("speech: recognized {text:?}"));
        (self.on_text)(&text);
        true
    }
}

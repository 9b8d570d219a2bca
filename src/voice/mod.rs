//! Shared voice session.
//!
//! Every voice surface subscribes here. The first subscriber starts the one
//! speech engine; the last unsubscribe stops it. Each transcription goes to the
//! most recent subscriber's live callback and is then routed to every active
//! device, subscriber included.


use crate::device::DeviceId;
use crate::router::MessageRouter;
use crate::speech::{
    BackendFactory, EngineNotice, EngineState, ModelSource, NoticeCallback, RestartPolicy,
    SpeechAdapter, TextCallback,
};
use crate::{lock_or_recover, log_debug};
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Listening,
}

#[derive(Default)]
struct SessionState {
    /// Insertion ordered.
    active: Vec<DeviceId>,
    /// Always a subset of `active`.
    minimized: Vec<DeviceId>,
    live: Option<(DeviceId, TextCallback)>,
    engine: Option<SpeechAdapter>,
}

struct Shared {
    router: Arc<MessageRouter>,
    state: Mutex<SessionState>,
}

impl Shared {
    fn broadcast(&self, text: &str) {
        let (live, targets) = {
            let state = lock_or_recover(&self.state, "voice broadcast");
            (
                state.live.as_ref().map(|(_, callback)| Arc::clone(callback)),
                state.active.clone(),
            )
        };
        if let Some(live) = live {
            live(text);
        }
        for id in &targets {
            self.router.route(id.as_str(), text);
        }
    }
}

pub struct VoiceSessionManager {
    shared: Arc<Shared>,
    factory: Arc<dyn BackendFactory>,
    model: ModelSource,
    policy: RestartPolicy,
    notice_sink: Option<NoticeCallback>,
}

impl VoiceSessionManager {
    pub fn new(
        router: Arc<MessageRouter>,
        factory: Arc<dyn BackendFactory>,
        model: ModelSource,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                router,
                state: Mutex::new(SessionState::default()),
            }),
            factory,
            model,
            policy,
            notice_sink: None,
        }
    }

    /// Receive engine notices (model load failures, restarts).
    pub fn with_notice_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&EngineNotice) + Send + Sync + 'static,
    {
        self.notice_sink = Some(Arc::new(sink));
        self
    }

    /// Add `id` to the session and make `on_text` the live callback.
    ///
    /// An engine whose worker has already exited (model load failure, gave up
    /// restarting) is replaced. Returns true when this call started an engine.
    pub fn subscribe(&self, id: impl Into<DeviceId>, on_text: TextCallback) -> bool {
        let id = id.into();
        let stale = {
            let mut state = lock_or_recover(&self.shared.state, "voice subscribe");
            if !state.active.contains(&id) {
                state.active.push(id.clone());
            }
            state.minimized.retain(|device| device != &id);
            state.live = Some((id.clone(), on_text));
            let running = state
                .engine
                .as_ref()
                .is_some_and(|engine| engine.state() != EngineState::Stopped);
            if running {
                log_debug(&format!("voice: {id} joined running session"));
                return false;
            }
            state.engine.take()
        };
        if let Some(mut stale) = stale {
            stale.stop();
            log_debug(&format!("voice: {id} replaced a stopped engine"));
        }

        let mut state = lock_or_recover(&self.shared.state, "voice subscribe");
        // Another subscriber may have started an engine, or `id` left, while unlocked.
        if state.engine.is_some() || !state.active.contains(&id) {
            return false;
        }
        let mut engine =
            SpeechAdapter::new(Arc::clone(&self.factory), self.model.clone(), self.policy);
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let on_text: TextCallback = Arc::new(move |text: &str| {
            if let Some(shared) = weak.upgrade() {
                shared.broadcast(text);
            }
        });
        let on_notice: NoticeCallback = match &self.notice_sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(|_: &EngineNotice| {}),
        };
        let started = engine.start(on_text, on_notice);
        state.engine = Some(engine);
        log_debug(&format!("voice: {id} started session"));
        started
    }

    /// Remove `id`; stops the engine when it was the last subscriber.
    ///
    /// Returns true when this call stopped the engine.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let engine = {
            let mut state = lock_or_recover(&self.shared.state, "voice unsubscribe");
            state.active.retain(|device| device.as_str() != id);
            state.minimized.retain(|device| device.as_str() != id);
            if state
                .live
                .as_ref()
                .is_some_and(|(owner, _)| owner.as_str() == id)
            {
                state.live = None;
            }
            if state.active.is_empty() {
                state.live = None;
                state.engine.take()
            } else {
                None
            }
        };
        match engine {
            Some(mut engine) => {
                engine.stop();
                log_debug(&format!("voice: last subscriber {id} left; engine stopped"));
                true
            }
            None => false,
        }
    }

    /// Mark `id` minimized. Returns false when `id` is not active.
    pub fn minimize(&self, id: &str) -> bool {
        let mut state = lock_or_recover(&self.shared.state, "voice minimize");
        let Some(device) = state.active.iter().find(|d| d.as_str() == id).cloned() else {
            return false;
        };
        if !state.minimized.contains(&device) {
            state.minimized.push(device);
        }
        true
    }

    /// End the whole session. Returns the devices that were active.
    pub fn stop_all(&self) -> Vec<DeviceId> {
        let (engine, devices) = {
            let mut state = lock_or_recover(&self.shared.state, "voice stop_all");
            state.minimized.clear();
            state.live = None;
            (state.engine.take(), std::mem::take(&mut state.active))
        };
        if let Some(mut engine) = engine {
            engine.stop();
            log_debug(&format!("voice: session closed for {} device(s)", devices.len()));
        }
        devices
    }

    pub fn list_active(&self) -> Vec<DeviceId> {
        lock_or_recover(&self.shared.state, "voice list_active")
            .active
            .clone()
    }

    pub fn list_minimized(&self) -> Vec<DeviceId> {
        lock_or_recover(&self.shared.state, "voice list_minimized")
            .minimized
            .clone()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_listening() {
            SessionPhase::Listening
        } else {
            SessionPhase::Idle
        }
    }

    /// True while an engine is loading or listening. An engine whose worker has
    /// exited does not count; the next `subscribe` replaces it.
    pub fn is_listening(&self) -> bool {
        lock_or_recover(&self.shared.state, "voice phase")
            .engine
            .as_ref()
            .is_some_and(|engine| engine.state() != EngineState::Stopped)
    }

    /// State of the running engine, if there is one.
    pub fn engine_state(&self) -> Option<EngineState> {
        lock_or_recover(&self.shared.state, "voice engine_state")
            .engine
            .as_ref()
            .map(SpeechAdapter::state)
    }
}

impl Drop for VoiceSessionManager {
    fn drop(&mut self) {
        let _ = self.stop_all();
    }
}

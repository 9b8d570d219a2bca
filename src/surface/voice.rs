use super::presentation::{presentation_channel, ChatLog, ChatMessage, UiEvent, UiInbox};
use crate::device::DeviceId;
use crate::log_debug;
use crate::router::{MessageRouter, Registration, RegistrationToken};
use crate::voice::VoiceSessionManager;
use std::sync::Arc;

/// Voice screen for one device: live transcript plus a display-only log.
pub struct VoiceSurface {
    device: DeviceId,
    router: Arc<MessageRouter>,
    sessions: Arc<VoiceSessionManager>,
    inbox: UiInbox,
    log: ChatLog,
    live_text: String,
    started_engine: bool,
    token: Option<RegistrationToken>,
    subscribed: bool,
}

impl VoiceSurface {
    pub fn open(
        device: DeviceId,
        router: Arc<MessageRouter>,
        sessions: Arc<VoiceSessionManager>,
    ) -> Self {
        let (ui, inbox) = presentation_channel();

        let live_ui = ui.clone();
        let started_engine = sessions.subscribe(
            device.clone(),
            Arc::new(move |text: &str| live_ui.post(UiEvent::LiveTranscript(text.to_string()))),
        );
        let token = router.overlay(
            device.clone(),
            Registration::new(move |text| ui.post(UiEvent::Message(ChatMessage::device(text)))),
        );
        log_debug(&format!("voice surface: opened {device}"));

        Self {
            device,
            router,
            sessions,
            inbox,
            log: ChatLog::default(),
            live_text: String::new(),
            started_engine,
            token: Some(token),
            subscribed: true,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Whether opening this surface started the shared engine.
    pub fn started_engine(&self) -> bool {
        self.started_engine
    }

    pub fn pump(&mut self) -> Vec<UiEvent> {
        let events = self.inbox.drain();
        for event in &events {
            match event {
                UiEvent::LiveTranscript(text) => {
                    self.live_text.clone_from(text);
                    self.log.push(ChatMessage::voice(text.as_str()));
                }
                UiEvent::Message(message) => self.log.push(message.clone()),
                UiEvent::Connection(_) | UiEvent::Notice(_) => {}
            }
        }
        events
    }

    pub fn live_text(&self) -> &str {
        &self.live_text
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    /// Leave the session running in the background and release this screen's handler.
    pub fn minimize(&mut self) -> bool {
        let minimized = self.sessions.minimize(self.device.as_str());
        self.release_handler();
        self.subscribed = false;
        minimized
    }

    /// Leave the session. Returns true when this stopped the engine.
    pub fn close(&mut self) -> bool {
        let stopped = if self.subscribed {
            self.subscribed = false;
            self.sessions.unsubscribe(self.device.as_str())
        } else {
            false
        };
        self.release_handler();
        stopped
    }

    /// Hand the id back to whatever was registered before this screen opened.
    fn release_handler(&mut self) {
        if let Some(token) = self.token.take() {
            self.router.release(self.device.as_str(), token);
        }
    }
}

impl Drop for VoiceSurface {
    // The session itself is only ended by an explicit close or stop.
    fn drop(&mut self) {
        self.release_handler();
    }
}

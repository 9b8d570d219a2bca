//! Chat surface for one device.
//!
//! Wi-Fi hosts get a real line transport, connected on a background thread
//! that then stays in the receive loop. Every other kind echoes sends back as
//! a fake device reply.

use super::presentation::{presentation_channel, ChatLog, ChatMessage, UiEvent, UiHandle, UiInbox};
use crate::device::{DeviceId, Endpoint};
use crate::router::{MessageRouter, Registration, RegistrationToken, TextHandler};
use crate::transport::{ConnectionStatus, LineTransport, TransportError};
use crate::{log_debug, log_debug_content};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

pub struct ChatSurface {
    device: DeviceId,
    router: Arc<MessageRouter>,
    transport: Option<Arc<LineTransport>>,
    token: RegistrationToken,
    send: TextHandler,
    inbox: UiInbox,
    log: ChatLog,
    status: ConnectionStatus,
    closed: bool,
}

impl ChatSurface {
    pub fn open(
        device: DeviceId,
        router: Arc<MessageRouter>,
        endpoint: Endpoint,
        connect_timeout: Duration,
    ) -> Self {
        let (ui, inbox) = presentation_channel();
        let kind = device.kind();

        let (transport, send) = if kind.has_transport() {
            let transport = Arc::new(LineTransport::new(endpoint).with_status_observer({
                let ui = ui.clone();
                move |status| ui.post(UiEvent::Connection(status))
            }));
            spawn_connect(
                Arc::clone(&transport),
                Arc::clone(&router),
                device.clone(),
                ui.clone(),
                connect_timeout,
            );
            let send = transport_sender(Arc::downgrade(&transport), ui.clone());
            (Some(transport), send)
        } else {
            ui.post(UiEvent::Notice(format!(
                "{} link not implemented; replies are simulated",
                kind.label()
            )));
            (None, loopback_sender(ui.clone()))
        };

        let deliver_ui = ui.clone();
        let forward = Arc::clone(&send);
        let token = router.overlay(
            device.clone(),
            Registration::new(move |text| {
                deliver_ui.post(UiEvent::Message(ChatMessage::device(text)));
            })
            .with_sender(move |text| forward(text)),
        );
        log_debug(&format!("chat: opened {device} ({})", kind.label()));

        Self {
            device,
            router,
            token,
            transport,
            send,
            inbox,
            log: ChatLog::default(),
            status: ConnectionStatus::Disconnected,
            closed: false,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Log typed text as `You` and send it. Blank input is ignored.
    pub fn submit(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.closed {
            return false;
        }
        self.log.push(ChatMessage::you(text));
        (self.send)(text);
        true
    }

    /// Apply queued background work to this surface and return it for display.
    pub fn pump(&mut self) -> Vec<UiEvent> {
        let events = self.inbox.drain();
        for event in &events {
            match event {
                UiEvent::Message(message) => self.log.push(message.clone()),
                UiEvent::Connection(status) => self.status = *status,
                UiEvent::LiveTranscript(_) | UiEvent::Notice(_) => {}
            }
        }
        events
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Release this chat's registration and shut the transport down. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.router.release(self.device.as_str(), self.token);
        if let Some(transport) = &self.transport {
            transport.close();
        }
        log_debug(&format!("chat: closed {}", self.device));
    }
}

impl Drop for ChatSurface {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_connect(
    transport: Arc<LineTransport>,
    router: Arc<MessageRouter>,
    device: DeviceId,
    ui: UiHandle,
    timeout: Duration,
) {
    let spawned = thread::Builder::new()
        .name("voxlink-connect".to_string())
        .spawn(move || {
            if let Err(err) = transport.connect(timeout) {
                if !matches!(err, TransportError::Closed) {
                    ui.post(UiEvent::Notice(format!("Failed to connect to device: {err}")));
                }
                return;
            }
            ui.post(UiEvent::Notice(format!(
                "Connected to {}",
                transport.endpoint()
            )));
            let result = transport.receive_loop(|line| {
                router.deliver(device.as_str(), line);
            });
            if let Err(err) = result {
                log_debug(&format!("chat: receive loop for {device} ended: {err}"));
            }
        });
    if let Err(err) = spawned {
        log_debug(&format!("chat: failed to spawn connect thread: {err}"));
    }
}

fn transport_sender(transport: Weak<LineTransport>, ui: UiHandle) -> TextHandler {
    Arc::new(move |text: &str| {
        let Some(transport) = transport.upgrade() else {
            ui.post(UiEvent::Notice("Device not connected".to_string()));
            return;
        };
        match transport.send(text) {
            Ok(()) => log_debug_content(&format!("chat: sent {text:?}")),
            Err(TransportError::NotConnected) => {
                ui.post(UiEvent::Notice("Device not connected".to_string()));
            }
            Err(err) => ui.post(UiEvent::Notice(format!("Send failed: {err}"))),
        }
    })
}

fn loopback_sender(ui: UiHandle) -> TextHandler {
    Arc::new(move |text: &str| {
        ui.post(UiEvent::Message(ChatMessage::device(format!(
            "Received: {text} (fake)"
        ))));
    })
}

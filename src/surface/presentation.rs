use crate::transport::ConnectionStatus;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

pub const SENDER_YOU: &str = "You";
pub const SENDER_DEVICE: &str = "Device";
pub const SENDER_VOICE: &str = "You (Voice)";

/// One entry in a surface's message log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }

    pub fn you(content: impl Into<String>) -> Self {
        Self::new(SENDER_YOU, content)
    }

    pub fn device(content: impl Into<String>) -> Self {
        Self::new(SENDER_DEVICE, content)
    }

    pub fn voice(content: impl Into<String>) -> Self {
        Self::new(SENDER_VOICE, content)
    }
}

/// Append-only message list; insertion order is display order.
#[derive(Clone, Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn push(&mut self, message: ChatMessage) {
        self.entries.push(message);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Work posted from background threads to the presentation context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Message(ChatMessage),
    Connection(ConnectionStatus),
    LiveTranscript(String),
    Notice(String),
}

/// Clonable posting side of a surface's presentation queue.
#[derive(Clone, Debug)]
pub struct UiHandle {
    tx: Sender<UiEvent>,
}

impl UiHandle {
    /// Never blocks. Events posted after the surface is gone are dropped.
    pub fn post(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug)]
pub struct UiInbox {
    rx: Receiver<UiEvent>,
}

impl UiInbox {
    pub fn drain(&self) -> Vec<UiEvent> {
        self.rx.try_iter().collect()
    }
}

pub fn presentation_channel() -> (UiHandle, UiInbox) {
    let (tx, rx) = unbounded();
    (UiHandle { tx }, UiInbox { rx })
}

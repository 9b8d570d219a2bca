//! JSON-lines protocol between the bridge and a front end.
//!
//! Every message is one JSON object per line. Events carry an `"event"` tag,
//! commands a `"cmd"` tag.

use crate::speech::EngineNotice;
use crate::surface::ChatMessage;
use crate::transport::ConnectionStatus;
use crate::voice::SessionPhase;
use serde::{Deserialize, Serialize};

// ============================================================================
// IPC Events (Rust → client)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IpcEvent {
    /// Sent once on startup and on request
    Capabilities {
        session_id: String,
        version: String,
        default_endpoint: String,
        model_path: String,
        recognizer_configured: bool,
        open_chats: Vec<String>,
        open_voices: Vec<String>,
    },

    ChatOpened {
        device: String,
        kind: String,
        has_transport: bool,
    },

    ChatClosed { device: String },

    /// Transport status change for a chat
    Connection {
        device: String,
        status: ConnectionStatus,
    },

    /// New entry in a surface's log (chat or voice)
    Message {
        device: String,
        sender: String,
        content: String,
    },

    LiveTranscript { device: String, text: String },

    /// User-facing notice tied to a device (connect failure, send refused, ...)
    Notice { device: String, message: String },

    VoiceOpened {
        device: String,
        started_engine: bool,
    },

    VoiceClosed {
        device: String,
        minimized: bool,
        stopped_engine: bool,
    },

    ActiveDevices {
        phase: SessionPhase,
        active: Vec<String>,
        minimized: Vec<String>,
    },

    /// Speech engine lifecycle
    Engine { notice: EngineNotice },

    History {
        device: String,
        messages: Vec<ChatMessage>,
    },

    Routed { device: String, delivered: bool },

    /// Error (recoverable or fatal)
    Error { message: String, recoverable: bool },
}

// ============================================================================
// IPC Commands (client → Rust)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Open a chat; `host`/`port` override the configured controller endpoint
    OpenChat {
        device: String,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        port: Option<u16>,
    },

    SendText { device: String, text: String },

    ClearChat { device: String },

    CloseChat { device: String },

    OpenVoice { device: String },

    /// Keep the device in the voice session but close its screen
    MinimizeVoice { device: String },

    CloseVoice { device: String },

    /// Remove one device from the voice session, screen or not
    StopVoiceSession { device: String },

    StopAllVoice,

    ListActive,

    /// Push text through the router as if it were recognized speech
    Route { device: String, text: String },

    History { device: String },

    GetCapabilities,

    Quit,
}

use crate::config::is_valid_host;
use crate::device::{DeviceId, Endpoint};
use crate::log_debug;
use crate::surface::{ChatMessage, ChatSurface, VoiceSurface};
use std::sync::Arc;

use super::protocol::{IpcCommand, IpcEvent};
use super::session::{send_event, IpcState};

pub(super) fn handle_command(state: &mut IpcState, cmd: IpcCommand) {
    match cmd {
        IpcCommand::OpenChat { device, host, port } => handle_open_chat(state, &device, host, port),
        IpcCommand::SendText { device, text } => handle_send_text(state, &device, &text),
        IpcCommand::ClearChat { device } => handle_clear_chat(state, &device),
        IpcCommand::CloseChat { device } => handle_close_chat(state, &device),
        IpcCommand::OpenVoice { device } => handle_open_voice(state, &device),
        IpcCommand::MinimizeVoice { device } => handle_minimize_voice(state, &device),
        IpcCommand::CloseVoice { device } => handle_close_voice(state, &device),
        IpcCommand::StopVoiceSession { device } => handle_stop_voice_session(state, &device),
        IpcCommand::StopAllVoice => handle_stop_all_voice(state),
        IpcCommand::ListActive => state.emit_active_devices(),
        IpcCommand::Route { device, text } => handle_route(state, &device, &text),
        IpcCommand::History { device } => handle_history(state, &device),
        IpcCommand::GetCapabilities => state.emit_capabilities(),
        IpcCommand::Quit => state.quit_requested = true,
    }
}

fn send_error(message: impl Into<String>) {
    send_event(&IpcEvent::Error {
        message: message.into(),
        recoverable: true,
    });
}

fn parse_device(device: &str) -> Option<DeviceId> {
    if device.is_empty() {
        send_error("Device name must not be empty");
        return None;
    }
    Some(DeviceId::from(device))
}

fn resolve_endpoint(
    state: &IpcState,
    host: Option<String>,
    port: Option<u16>,
) -> Result<Endpoint, String> {
    let host = match host {
        Some(host) => {
            let host = host.trim().to_string();
            if !is_valid_host(&host) {
                return Err(format!("Invalid host '{host}'"));
            }
            host
        }
        None => state.config.host.clone(),
    };
    let port = port.unwrap_or(state.config.port);
    if port == 0 {
        return Err("Port must be between 1 and 65535".to_string());
    }
    Ok(Endpoint::new(host, port))
}

pub(super) fn handle_open_chat(
    state: &mut IpcState,
    device: &str,
    host: Option<String>,
    port: Option<u16>,
) {
    let Some(id) = parse_device(device) else {
        return;
    };
    if state.chats.contains_key(&id) {
        send_error(format!("Chat already open for {id}"));
        return;
    }
    let endpoint = match resolve_endpoint(state, host, port) {
        Ok(endpoint) => endpoint,
        Err(message) => {
            send_error(message);
            return;
        }
    };

    let chat = ChatSurface::open(
        id.clone(),
        Arc::clone(&state.router),
        endpoint,
        state.config.connect_timeout(),
    );
    send_event(&IpcEvent::ChatOpened {
        device: id.to_string(),
        kind: id.kind().label().to_string(),
        has_transport: chat.has_transport(),
    });
    state.chats.insert(id, chat);
}

pub(super) fn handle_send_text(state: &mut IpcState, device: &str, text: &str) {
    let Some(chat) = state.chats.get_mut(device) else {
        send_error(format!("No chat open for {device}"));
        return;
    };
    if chat.submit(text) {
        let message = ChatMessage::you(text.trim());
        send_event(&IpcEvent::Message {
            device: device.to_string(),
            sender: message.sender,
            content: message.content,
        });
    }
}

pub(super) fn handle_clear_chat(state: &mut IpcState, device: &str) {
    let Some(chat) = state.chats.get_mut(device) else {
        send_error(format!("No chat open for {device}"));
        return;
    };
    chat.clear();
    send_event(&IpcEvent::History {
        device: device.to_string(),
        messages: Vec::new(),
    });
}

pub(super) fn handle_close_chat(state: &mut IpcState, device: &str) {
    let Some(mut chat) = state.chats.remove(device) else {
        send_error(format!("No chat open for {device}"));
        return;
    };
    chat.close();
    send_event(&IpcEvent::ChatClosed {
        device: device.to_string(),
    });
}

pub(super) fn handle_open_voice(state: &mut IpcState, device: &str) {
    let Some(id) = parse_device(device) else {
        return;
    };
    if state.voices.contains_key(&id) {
        send_error(format!("Voice screen already open for {id}"));
        return;
    }
    let voice = VoiceSurface::open(
        id.clone(),
        Arc::clone(&state.router),
        Arc::clone(&state.sessions),
    );
    send_event(&IpcEvent::VoiceOpened {
        device: id.to_string(),
        started_engine: voice.started_engine(),
    });
    state.voices.insert(id, voice);
    state.emit_active_devices();
}

pub(super) fn handle_minimize_voice(state: &mut IpcState, device: &str) {
    let Some(mut voice) = state.voices.remove(device) else {
        send_error(format!("No voice screen open for {device}"));
        return;
    };
    voice.minimize();
    send_event(&IpcEvent::VoiceClosed {
        device: device.to_string(),
        minimized: true,
        stopped_engine: false,
    });
    state.emit_active_devices();
}

pub(super) fn handle_close_voice(state: &mut IpcState, device: &str) {
    let Some(mut voice) = state.voices.remove(device) else {
        send_error(format!("No voice screen open for {device}"));
        return;
    };
    let stopped_engine = voice.close();
    send_event(&IpcEvent::VoiceClosed {
        device: device.to_string(),
        minimized: false,
        stopped_engine,
    });
    state.emit_active_devices();
}

pub(super) fn handle_stop_voice_session(state: &mut IpcState, device: &str) {
    let in_session = state
        .sessions
        .list_active()
        .iter()
        .any(|id| id.as_str() == device);
    let screen = state.voices.remove(device);
    if !in_session && screen.is_none() {
        send_error(format!("{device} is not in the voice session"));
        return;
    }
    let stopped_engine = match screen {
        Some(mut voice) => voice.close(),
        None => state.sessions.unsubscribe(device),
    };
    send_event(&IpcEvent::VoiceClosed {
        device: device.to_string(),
        minimized: false,
        stopped_engine,
    });
    state.emit_active_devices();
}

pub(super) fn handle_stop_all_voice(state: &mut IpcState) {
    // Screens only release their handlers; the session is ended in one step below.
    let screens = std::mem::take(&mut state.voices);
    drop(screens);
    let devices = state.sessions.stop_all();
    log_debug(&format!("Closed voice session for {} device(s)", devices.len()));
    let last = devices.len().saturating_sub(1);
    for (index, device) in devices.iter().enumerate() {
        send_event(&IpcEvent::VoiceClosed {
            device: device.to_string(),
            minimized: false,
            stopped_engine: index == last,
        });
    }
    state.emit_active_devices();
}

pub(super) fn handle_route(state: &mut IpcState, device: &str, text: &str) {
    let delivered = state.router.route(device, text);
    send_event(&IpcEvent::Routed {
        device: device.to_string(),
        delivered,
    });
}

pub(super) fn handle_history(state: &mut IpcState, device: &str) {
    let log = state
        .chats
        .get(device)
        .map(ChatSurface::log)
        .or_else(|| state.voices.get(device).map(VoiceSurface::log));
    match log {
        Some(log) => send_event(&IpcEvent::History {
            device: device.to_string(),
            messages: log.entries().to_vec(),
        }),
        None => send_error(format!("No chat or voice screen open for {device}")),
    }
}

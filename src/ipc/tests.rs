use super::handlers::*;
use super::protocol::*;
use super::session::*;
use crate::config::AppConfig;
use crate::speech::{BackendFactory, ModelSource, RecognizerEvent, SpeechBackend};
use crate::transport::ConnectionStatus;
use crate::voice::SessionPhase;
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver as FeedReceiver, Sender as FeedSender};
use std::io::Write;
use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct FeedBackend {
    feed: FeedReceiver<RecognizerEvent>,
}

impl SpeechBackend for FeedBackend {
    fn load_model(&mut self, _source: &ModelSource) -> anyhow::Result<()> {
        Ok(())
    }

    fn start_listening(&mut self) -> anyhow::Result<FeedReceiver<RecognizerEvent>> {
        Ok(self.feed.clone())
    }

    fn stop_listening(&mut self) {}

    fn release(&mut self) {}
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::parse_from(["voxlink", "--restart-delay-ms", "50"]);
    config.validate().expect("default config is valid");
    config
}

fn new_test_state() -> (IpcState, FeedSender<RecognizerEvent>) {
    let (feed, feed_rx) = unbounded();
    let factory: Arc<dyn BackendFactory> = Arc::new(move || -> Box<dyn SpeechBackend> {
        Box::new(FeedBackend {
            feed: feed_rx.clone(),
        })
    });
    (IpcState::with_backend(test_config(), factory), feed)
}

fn say(feed: &FeedSender<RecognizerEvent>, text: &str) {
    let raw = serde_json::json!({ "text": text }).to_string();
    feed.send(RecognizerEvent::Result(raw)).unwrap();
}

/// Pump until an event for this test's device matches, or time out.
fn pump_until(
    state: &mut IpcState,
    snapshot: usize,
    matches: impl Fn(&IpcEvent) -> bool,
) -> Vec<IpcEvent> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        state.pump();
        let events = events_since(snapshot);
        if events.iter().any(&matches) || Instant::now() >= deadline {
            return events;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn is_error_containing(event: &IpcEvent, needle: &str) -> bool {
    matches!(event, IpcEvent::Error { message, recoverable: true } if message.contains(needle))
}

// -------------------------------------------------------------------------
// Protocol
// -------------------------------------------------------------------------

#[test]
fn commands_parse_from_json_lines() {
    let cmd: IpcCommand =
        serde_json::from_str(r#"{"cmd": "open_chat", "device": "ArduinoAP (WIFI HOST)"}"#).unwrap();
    assert!(matches!(
        cmd,
        IpcCommand::OpenChat { ref device, host: None, port: None } if device == "ArduinoAP (WIFI HOST)"
    ));

    let cmd: IpcCommand =
        serde_json::from_str(r#"{"cmd": "open_chat", "device": "x", "host": "10.0.0.2", "port": 2323}"#)
            .unwrap();
    assert!(matches!(cmd, IpcCommand::OpenChat { port: Some(2323), .. }));

    let cmd: IpcCommand = serde_json::from_str(r#"{"cmd": "stop_all_voice"}"#).unwrap();
    assert!(matches!(cmd, IpcCommand::StopAllVoice));

    assert!(serde_json::from_str::<IpcCommand>(r#"{"cmd": "send_text", "device": "a"}"#).is_err());
    assert!(serde_json::from_str::<IpcCommand>(r#"{"cmd": "dance"}"#).is_err());
}

#[test]
fn events_serialize_with_event_tag() {
    let json = serde_json::to_value(IpcEvent::Connection {
        device: "ArduinoAP (WIFI HOST)".to_string(),
        status: ConnectionStatus::Failed,
    })
    .unwrap();
    assert_eq!(json["event"], "connection");
    assert_eq!(json["status"], "failed");

    let json = serde_json::to_value(IpcEvent::ActiveDevices {
        phase: SessionPhase::Listening,
        active: vec!["A".to_string()],
        minimized: Vec::new(),
    })
    .unwrap();
    assert_eq!(json["event"], "active_devices");
    assert_eq!(json["phase"], "listening");
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

#[test]
fn emit_capabilities_reports_configuration() {
    let snapshot = event_snapshot();
    let (state, _feed) = new_test_state();
    state.emit_capabilities();
    let events = events_since(snapshot);
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Capabilities { default_endpoint, recognizer_configured: false, .. }
            if default_endpoint == "192.168.4.1:23"
    )));
}

#[test]
fn loopback_chat_round_trip() {
    let snapshot = event_snapshot();
    let (mut state, _feed) = new_test_state();
    let device = "ipc-loopback-1";

    handle_command(
        &mut state,
        IpcCommand::OpenChat {
            device: device.to_string(),
            host: None,
            port: None,
        },
    );
    handle_command(
        &mut state,
        IpcCommand::SendText {
            device: device.to_string(),
            text: "LED ON".to_string(),
        },
    );
    let events = pump_until(&mut state, snapshot, |event| {
        matches!(event, IpcEvent::Message { device: d, content, .. }
            if d == device && content == "Received: LED ON (fake)")
    });

    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::ChatOpened { device: d, has_transport: false, .. } if d == device
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Message { device: d, sender, content }
            if d == device && sender == "You" && content == "LED ON"
    )));

    let snapshot = event_snapshot();
    handle_command(
        &mut state,
        IpcCommand::History {
            device: device.to_string(),
        },
    );
    let events = events_since(snapshot);
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::History { device: d, messages } if d == device && messages.len() == 2
    )));

    handle_command(
        &mut state,
        IpcCommand::CloseChat {
            device: device.to_string(),
        },
    );
    assert!(!state.router.is_registered(device));
}

#[test]
fn duplicate_and_missing_chats_are_recoverable_errors() {
    let snapshot = event_snapshot();
    let (mut state, _feed) = new_test_state();
    let device = "ipc-dup-1";
    handle_open_chat(&mut state, device, None, None);
    handle_open_chat(&mut state, device, None, None);
    handle_send_text(&mut state, "ipc-missing-1", "hello");
    handle_close_chat(&mut state, "ipc-missing-1");
    handle_open_chat(&mut state, "ipc-badhost-1", Some("bad host!".to_string()), None);
    handle_open_chat(&mut state, "", None, None);

    let events = events_since(snapshot);
    assert!(events
        .iter()
        .any(|event| is_error_containing(event, "Chat already open for ipc-dup-1")));
    assert!(events
        .iter()
        .any(|event| is_error_containing(event, "No chat open for ipc-missing-1")));
    assert!(events
        .iter()
        .any(|event| is_error_containing(event, "Invalid host 'bad host!'")));
    assert!(events
        .iter()
        .any(|event| is_error_containing(event, "must not be empty")));
    assert_eq!(state.chats.len(), 1);
}

#[test]
fn wifi_chat_reports_connection_and_device_lines() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let snapshot = event_snapshot();
    let (mut state, _feed) = new_test_state();
    let device = "ipc-board (WIFI HOST)";

    handle_open_chat(&mut state, device, Some("127.0.0.1".to_string()), Some(port));
    let (mut peer, _) = listener.accept().unwrap();
    peer.write_all(b"ready\n").unwrap();

    let events = pump_until(&mut state, snapshot, |event| {
        matches!(event, IpcEvent::Message { device: d, content, .. } if d == device && content == "ready")
    });
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Connection { device: d, status: ConnectionStatus::Connected } if d == device
    )));
    state.shutdown();
}

#[test]
fn voice_fan_out_reaches_chat_and_voice_screens() {
    let snapshot = event_snapshot();
    let (mut state, feed) = new_test_state();
    let device = "ipc-voice-1";

    handle_open_voice(&mut state, device);
    handle_minimize_voice(&mut state, device);
    handle_open_chat(&mut state, device, None, None);
    say(&feed, "go");

    let events = pump_until(&mut state, snapshot, |event| {
        matches!(event, IpcEvent::Message { device: d, content, .. }
            if d == device && content == "Received: go (fake)")
    });
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::VoiceOpened { device: d, started_engine: true } if d == device
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::VoiceClosed { device: d, minimized: true, .. } if d == device
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::ActiveDevices { active, minimized, .. }
            if active.iter().any(|d| d == device) && minimized.iter().any(|d| d == device)
    )));

    let snapshot = event_snapshot();
    handle_stop_voice_session(&mut state, device);
    let events = events_since(snapshot);
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::VoiceClosed { device: d, stopped_engine: true, .. } if d == device
    )));
    assert!(!state.sessions.is_listening());
    state.shutdown();
}

#[test]
fn live_transcript_is_emitted_for_open_voice_screen() {
    let snapshot = event_snapshot();
    let (mut state, feed) = new_test_state();
    let device = "ipc-voice-2";
    handle_open_voice(&mut state, device);
    say(&feed, "left");

    let events = pump_until(&mut state, snapshot, |event| {
        matches!(event, IpcEvent::LiveTranscript { device: d, text } if d == device && text == "left")
    });
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Message { device: d, sender, content }
            if d == device && sender == "You (Voice)" && content == "left"
    )));

    handle_close_voice(&mut state, device);
    assert!(state.voices.is_empty());
    assert!(!state.sessions.is_listening());
}

#[test]
fn stop_all_voice_ends_session_for_every_device() {
    let snapshot = event_snapshot();
    let (mut state, _feed) = new_test_state();
    handle_open_voice(&mut state, "ipc-all-1");
    handle_open_voice(&mut state, "ipc-all-2");
    handle_minimize_voice(&mut state, "ipc-all-1");

    handle_stop_all_voice(&mut state);
    let events = events_since(snapshot);
    for device in ["ipc-all-1", "ipc-all-2"] {
        assert!(events.iter().any(|event| matches!(
            event,
            IpcEvent::VoiceClosed { device: d, minimized: false, .. } if d == device
        )));
    }
    assert!(state.voices.is_empty());
    assert!(state.sessions.list_active().is_empty());
    assert!(!state.router.is_registered("ipc-all-2"));
}

#[test]
fn route_reports_whether_device_was_registered() {
    let snapshot = event_snapshot();
    let (mut state, _feed) = new_test_state();
    handle_open_chat(&mut state, "ipc-route-1", None, None);
    handle_route(&mut state, "ipc-route-1", "ping");
    handle_route(&mut state, "ipc-route-nobody", "ping");

    let events = events_since(snapshot);
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Routed { device, delivered: true } if device == "ipc-route-1"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Routed { device, delivered: false } if device == "ipc-route-nobody"
    )));
}

#[test]
fn engine_notices_surface_when_no_recognizer_is_configured() {
    let snapshot = event_snapshot();
    let mut state = IpcState::new(test_config());
    handle_open_voice(&mut state, "ipc-noengine-1");
    let events = pump_until(&mut state, snapshot, |event| {
        matches!(event, IpcEvent::Engine { notice: crate::speech::EngineNotice::ModelLoadFailed { message } }
            if message.contains("no recognizer configured"))
    });
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Engine { notice: crate::speech::EngineNotice::ModelLoadFailed { .. } }
    )));
    state.shutdown();
}

// -------------------------------------------------------------------------
// Event loop
// -------------------------------------------------------------------------

#[test]
fn run_ipc_mode_emits_capabilities_on_start() {
    let snapshot = event_snapshot();
    run_ipc_mode(test_config()).unwrap();
    let events = events_since(snapshot);
    assert!(events
        .iter()
        .any(|event| matches!(event, IpcEvent::Capabilities { .. })));
}

#[test]
fn run_ipc_loop_processes_commands_until_quit() {
    let snapshot = event_snapshot();
    let (mut state, _feed) = new_test_state();
    let (tx, rx) = mpsc::channel();
    tx.send(IpcCommand::OpenChat {
        device: "ipc-loop-1".to_string(),
        host: None,
        port: None,
    })
    .unwrap();
    tx.send(IpcCommand::ListActive).unwrap();
    tx.send(IpcCommand::Quit).unwrap();
    tx.send(IpcCommand::GetCapabilities).unwrap();

    run_ipc_loop(&mut state, &rx, Some(50)).unwrap();
    let events = events_since(snapshot);
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::ChatOpened { device, .. } if device == "ipc-loop-1"
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, IpcEvent::ActiveDevices { .. })));
    assert!(state.chats.is_empty());
    assert!(rx.try_recv().is_ok(), "commands after quit stay unread");
    assert!(!state.router.is_registered("ipc-loop-1"));
}

#[test]
fn run_ipc_loop_respects_max_loops_with_live_channel() {
    let (mut state, _feed) = new_test_state();
    let (_tx, rx) = mpsc::channel();
    let start = Instant::now();
    run_ipc_loop(&mut state, &rx, Some(3)).unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn ipc_guard_trips_only_after_threshold() {
    assert!(!ipc_guard_tripped(Duration::from_secs(5)));
    assert!(ipc_guard_tripped(
        Duration::from_secs(5) + Duration::from_millis(1)
    ));
}

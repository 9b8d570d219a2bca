use std::io::Write;
use std::process::{Command, Stdio};

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn voxlink_bin() -> &'static str {
    env!("CARGO_BIN_EXE_voxlink")
}

fn voxlink_command() -> Command {
    let mut command = Command::new(voxlink_bin());
    command
        .env_remove("VOXLINK_HOST")
        .env_remove("VOXLINK_PORT")
        .env_remove("VOXLINK_RECOGNIZER_CMD")
        .env_remove("VOXLINK_LOGS")
        .env("VOXLINK_NO_LOGS", "1");
    command
}

#[test]
fn voxlink_help_mentions_name() {
    let output = voxlink_command()
        .arg("--help")
        .output()
        .expect("run voxlink --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("VoxLink"));
    assert!(combined.contains("--recognizer-cmd"));
}

#[test]
fn voxlink_rejects_invalid_port() {
    let output = voxlink_command()
        .args(["--port", "0"])
        .output()
        .expect("run voxlink --port 0");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("--port"));
}

#[test]
fn voxlink_closed_stdin_reports_capabilities_and_exits() {
    let output = voxlink_command()
        .stdin(Stdio::null())
        .output()
        .expect("run voxlink with closed stdin");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().expect("capabilities line");
    let event: serde_json::Value = serde_json::from_str(first).expect("json event");
    assert_eq!(event["event"], "capabilities");
    assert_eq!(event["recognizer_configured"], false);
}

#[test]
fn voxlink_loopback_chat_over_stdin() {
    let mut child = voxlink_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn voxlink");
    {
        let mut stdin = child.stdin.take().expect("child stdin");
        writeln!(stdin, r#"{{"cmd":"open_chat","device":"Desk Lamp"}}"#).unwrap();
        writeln!(stdin, "not json").unwrap();
        writeln!(stdin, r#"{{"cmd":"send_text","device":"Desk Lamp","text":"hi"}}"#).unwrap();
        writeln!(stdin, r#"{{"cmd":"quit"}}"#).unwrap();
    }
    let output = child.wait_with_output().expect("wait for voxlink");
    assert!(output.status.success());

    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    assert!(events
        .iter()
        .any(|event| event["event"] == "chat_opened" && event["has_transport"] == false));
    assert!(events.iter().any(|event| {
        event["event"] == "error"
            && event["message"]
                .as_str()
                .is_some_and(|message| message.starts_with("Invalid command"))
    }));
    assert!(events.iter().any(|event| {
        event["event"] == "message" && event["content"] == "Received: hi (fake)"
    }));
}

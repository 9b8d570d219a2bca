//! Recognizer backed by an external program.
//!
//! The program receives the model path as its last argument and the sample
//! rate in `VOXLINK_SAMPLE_RATE`, captures audio itself, and prints one JSON
//! hypothesis per stdout line. Its exit ends the listening session.

use super::backend::{ModelSource, RecognizerEvent, SpeechBackend};
use super::hypothesis::is_partial;
use crate::{log_debug, log_debug_content};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;

pub const SAMPLE_RATE_ENV: &str = "VOXLINK_SAMPLE_RATE";

pub struct CommandBackend {
    argv: Vec<String>,
    sample_rate: u32,
    model: Option<PathBuf>,
    child: Option<Child>,
}

impl CommandBackend {
    /// `argv[0]` is the program; the rest are leading arguments.
    pub fn new(argv: Vec<String>, sample_rate: u32) -> Self {
        Self {
            argv,
            sample_rate,
            model: None,
            child: None,
        }
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl SpeechBackend for CommandBackend {
    fn load_model(&mut self, source: &ModelSource) -> Result<()> {
        if self.argv.is_empty() {
            bail!("recognizer command is empty");
        }
        let path = source.path();
        if !path.exists() {
            bail!("model not found at {}", path.display());
        }
        self.model = Some(path.to_path_buf());
        log_debug(&format!("recognizer model ready: {}", path.display()));
        Ok(())
    }

    fn start_listening(&mut self) -> Result<Receiver<RecognizerEvent>> {
        self.reap();
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("model not loaded"))?;
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("recognizer command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .arg(model)
            .env(SAMPLE_RATE_ENV, self.sample_rate.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start recognizer {program}"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture recognizer stdout"))?;
        let stderr = child.stderr.take();
        let (tx, rx) = unbounded();
        spawn_stdout_reader(stdout, tx);
        if let Some(stderr) = stderr {
            spawn_stderr_logger(stderr);
        }
        log_debug(&format!("recognizer started (pid {})", child.id()));
        self.child = Some(child);
        Ok(rx)
    }

    fn stop_listening(&mut self) {
        self.reap();
    }

    fn release(&mut self) {
        self.reap();
        self.model = None;
    }
}

impl Drop for CommandBackend {
    fn drop(&mut self) {
        self.reap();
    }
}

fn classify_line(line: &str) -> RecognizerEvent {
    if is_partial(line) {
        RecognizerEvent::Partial(line.to_string())
    } else {
        RecognizerEvent::Result(line.to_string())
    }
}

fn spawn_stdout_reader(stdout: ChildStdout, tx: Sender<RecognizerEvent>) {
    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines().map_while(Result::ok) {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if tx.send(classify_line(trimmed)).is_err() {
                return;
            }
        }
        let _ = tx.send(RecognizerEvent::Error("recognizer exited".to_string()));
    });
}

fn spawn_stderr_logger(stderr: ChildStderr) {
    thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.lines().map_while(Result::ok) {
            if !line.trim().is_empty() {
                log_debug_content(&format!("[recognizer] {line}"));
            }
        }
    });
}

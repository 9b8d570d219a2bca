//! Recognizer seam.
//!
//! A backend owns the model and produces a stream of [`RecognizerEvent`]s per
//! listening session. The adapter drives it from a single worker thread, so
//! implementations only need to be `Send`.

use anyhow::{bail, Result};
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};

/// One callback from the recognizer; hypothesis payloads are raw JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognizerEvent {
    Partial(String),
    Result(String),
    /// End of utterance. Listening must be restarted afterwards.
    FinalResult(String),
    Error(String),
    Timeout,
}

/// Location of a pre-trained offline model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSource {
    path: PathBuf,
}

impl ModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub trait SpeechBackend: Send {
    /// Load the model. Called once, before the first `start_listening`.
    fn load_model(&mut self, source: &ModelSource) -> Result<()>;

    /// Begin a listening session. The stream ends when the session does.
    fn start_listening(&mut self) -> Result<Receiver<RecognizerEvent>>;

    /// End the current session, if any.
    fn stop_listening(&mut self);

    /// Drop the model and any session resources.
    fn release(&mut self);
}

/// Builds a fresh backend for each engine start.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Box<dyn SpeechBackend>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Box<dyn SpeechBackend> + Send + Sync,
{
    fn create(&self) -> Box<dyn SpeechBackend> {
        self()
    }
}

/// Stand-in used when no recognizer command is configured; every load fails.
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl SpeechBackend for UnavailableBackend {
    fn load_model(&mut self, _source: &ModelSource) -> Result<()> {
        bail!("no recognizer configured (set --recognizer-cmd)")
    }

    fn start_listening(&mut self) -> Result<Receiver<RecognizerEvent>> {
        bail!("no recognizer configured")
    }

    fn stop_listening(&mut self) {}

    fn release(&mut self) {}
}

//! The seam between the controller and whatever actually makes sound.
//!
//! The controller never touches `rodio` directly: it asks an `AudioBackend`
//! for a `Voice` per session and drives its volume from fade timers.

use super::analysis::AnalysisChain;
use super::types::AudioError;

/// What the backend needs to know when opening a voice.
#[derive(Clone, Default)]
pub struct VoiceOptions {
    /// Analysis chain to insert into the voice's signal path.
    pub analysis: Option<AnalysisChain>,
}

/// Result of asking a voice to start.
#[derive(Debug)]
pub enum StartOutcome {
    Started,
    /// The start is in flight; poll with `Voice::poll_start`.
    Pending,
    Rejected(AudioError),
}

/// One playable stream owned by exactly one session.
pub trait Voice {
    /// Begin playback. Volume is expected to already be 0.
    fn start(&mut self) -> StartOutcome;
    /// Only meaningful after `start` answered `Pending`. `None` while still pending.
    fn poll_start(&mut self) -> Option<Result<(), AudioError>>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn set_volume(&mut self, volume: f32);
    /// True once a started stream reached its end.
    fn is_finished(&self) -> bool;
    /// Rewind to the beginning after the stream finished.
    fn restart(&mut self) -> Result<(), AudioError>;
    /// Halt and release output resources. Called exactly once, at teardown.
    fn stop(&mut self);
}

pub trait AudioBackend {
    fn open(&mut self, source: &str, options: VoiceOptions) -> Result<Box<dyn Voice>, AudioError>;
}

/// Backend used when no output device could be opened: every open fails.
#[derive(Debug, Default)]
pub struct SilentBackend {
    reason: String,
}

impl SilentBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioBackend for SilentBackend {
    fn open(&mut self, _source: &str, _options: VoiceOptions) -> Result<Box<dyn Voice>, AudioError> {
        Err(AudioError::NoDevice(self.reason.clone()))
    }
}

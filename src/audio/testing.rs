//! In-memory backend recording everything the controller does to its voices.

use std::cell::RefCell;
use std::rc::Rc;

use super::analysis::AnalysisChain;
use super::backend::{AudioBackend, StartOutcome, Voice, VoiceOptions};
use super::types::AudioError;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(crate) enum StartMode {
    #[default]
    Immediate,
    /// `start` answers `Pending`; the test sets `VoiceLog::resolution`.
    Deferred,
    /// `start` answers `Rejected`, like a blocked autoplay.
    Reject,
}

#[derive(Default)]
pub(crate) struct VoiceLog {
    pub source: String,
    pub volumes: Vec<f32>,
    pub started: bool,
    pub paused: bool,
    pub stops: u32,
    pub restarts: u32,
    pub writes_after_stop: u32,
    pub finished: bool,
    pub resolution: Option<Result<(), String>>,
    pub analysis: Option<AnalysisChain>,
}

impl VoiceLog {
    pub fn last_volume(&self) -> f32 {
        self.volumes.last().copied().unwrap_or(0.0)
    }
}

#[derive(Default)]
struct FakeState {
    voices: Vec<Rc<RefCell<VoiceLog>>>,
    mode: StartMode,
    missing: Vec<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    inner: Rc<RefCell<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn AudioBackend> {
        Box::new(self.clone())
    }

    pub fn set_start_mode(&self, mode: StartMode) {
        self.inner.borrow_mut().mode = mode;
    }

    /// Opening `source` fails as if the file did not exist.
    pub fn mark_missing(&self, source: &str) {
        self.inner.borrow_mut().missing.push(source.to_string());
    }

    pub fn voice(&self, index: usize) -> Rc<RefCell<VoiceLog>> {
        self.inner.borrow().voices[index].clone()
    }

    pub fn voice_count(&self) -> usize {
        self.inner.borrow().voices.len()
    }
}

impl AudioBackend for FakeBackend {
    fn open(&mut self, source: &str, options: VoiceOptions) -> Result<Box<dyn Voice>, AudioError> {
        let mut state = self.inner.borrow_mut();
        if state.missing.iter().any(|m| m == source) {
            return Err(AudioError::Open {
                source_id: source.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            });
        }
        let log = Rc::new(RefCell::new(VoiceLog {
            source: source.to_string(),
            analysis: options.analysis,
            ..VoiceLog::default()
        }));
        state.voices.push(log.clone());
        Ok(Box::new(FakeVoice {
            log,
            mode: state.mode,
        }))
    }
}

struct FakeVoice {
    log: Rc<RefCell<VoiceLog>>,
    mode: StartMode,
}

impl Voice for FakeVoice {
    fn start(&mut self) -> StartOutcome {
        match self.mode {
            StartMode::Immediate => {
                self.log.borrow_mut().started = true;
                StartOutcome::Started
            }
            StartMode::Deferred => StartOutcome::Pending,
            StartMode::Reject => {
                StartOutcome::Rejected(AudioError::Rejected("autoplay blocked".to_string()))
            }
        }
    }

    fn poll_start(&mut self) -> Option<Result<(), AudioError>> {
        let mut log = self.log.borrow_mut();
        let resolution = log.resolution.take()?;
        if resolution.is_ok() {
            log.started = true;
        }
        Some(resolution.map_err(AudioError::Rejected))
    }

    fn pause(&mut self) {
        self.log.borrow_mut().paused = true;
    }

    fn resume(&mut self) {
        self.log.borrow_mut().paused = false;
    }

    fn set_volume(&mut self, volume: f32) {
        let mut log = self.log.borrow_mut();
        if log.stops > 0 {
            log.writes_after_stop += 1;
        }
        log.volumes.push(volume);
    }

    fn is_finished(&self) -> bool {
        self.log.borrow().finished
    }

    fn restart(&mut self) -> Result<(), AudioError> {
        let mut log = self.log.borrow_mut();
        log.restarts += 1;
        log.finished = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.log.borrow_mut().stops += 1;
    }
}

//! Audio-related small types.
//!
//! This module defines the enums, options and errors shared by the
//! controller, the backends and the UI.

use std::time::Duration;

use thiserror::Error;

use crate::config::{AudioSettings, VisualizationSetting};

/// Identifier of one playback session. Never reused within a controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Lifecycle of a single playback session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Created at volume 0; waiting for the backend to confirm playback.
    Idle,
    FadingIn,
    Playing,
    Paused,
    FadingOut,
    /// Torn down. Terminal.
    Stopped,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "Starting",
            SessionState::FadingIn => "Fading in",
            SessionState::Playing => "Playing",
            SessionState::Paused => "Paused",
            SessionState::FadingOut => "Fading out",
            SessionState::Stopped => "Stopped",
        }
    }
}

/// Coarse playback state shown by the UI and published over MPRIS.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ToneBand {
    Bass,
    Mid,
    Treble,
}

impl ToneBand {
    pub const ALL: [ToneBand; 3] = [ToneBand::Bass, ToneBand::Mid, ToneBand::Treble];

    pub fn index(self) -> usize {
        match self {
            ToneBand::Bass => 0,
            ToneBand::Mid => 1,
            ToneBand::Treble => 2,
        }
    }

    pub fn next(self) -> Self {
        match self {
            ToneBand::Bass => ToneBand::Mid,
            ToneBand::Mid => ToneBand::Treble,
            ToneBand::Treble => ToneBand::Bass,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ToneBand::Bass => "Bass",
            ToneBand::Mid => "Mid",
            ToneBand::Treble => "Treble",
        }
    }
}

/// Lowest accepted tone gain (dB).
pub const TONE_GAIN_MIN_DB: f32 = -5.0;
/// Highest accepted tone gain (dB).
pub const TONE_GAIN_MAX_DB: f32 = 5.0;

/// Gain of each tone stage in dB, always within the accepted range.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ToneProfile {
    gains: [f32; 3],
}

impl ToneProfile {
    pub fn gain(&self, band: ToneBand) -> f32 {
        self.gains[band.index()]
    }

    /// Store `gain_db` clamped to the accepted range; returns the stored value.
    pub fn set_gain(&mut self, band: ToneBand, gain_db: f32) -> f32 {
        let g = clamp_tone_gain(gain_db);
        self.gains[band.index()] = g;
        g
    }
}

pub fn clamp_tone_gain(gain_db: f32) -> f32 {
    if gain_db.is_nan() {
        return 0.0;
    }
    gain_db.clamp(TONE_GAIN_MIN_DB, TONE_GAIN_MAX_DB)
}

/// Clamp a volume into `[0, 1]`; NaN counts as silence.
pub fn clamp_volume(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum VisualizationMode {
    #[default]
    Bars,
    Wave,
    Circular,
}

impl VisualizationMode {
    pub fn next(self) -> Self {
        match self {
            VisualizationMode::Bars => VisualizationMode::Wave,
            VisualizationMode::Wave => VisualizationMode::Circular,
            VisualizationMode::Circular => VisualizationMode::Bars,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VisualizationMode::Bars => "bars",
            VisualizationMode::Wave => "wave",
            VisualizationMode::Circular => "circular",
        }
    }
}

/// Per-call options for `AudioController::play`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PlayOptions {
    /// Overrides the controller's loop flag for this and later sessions.
    pub looping: Option<bool>,
    /// Fade-in target; defaults to the controller's current volume.
    pub initial_target_volume: Option<f32>,
}

/// Timing parameters of the fade algorithm.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FadeConfig {
    pub fade_in: Duration,
    pub fade_in_steps: u32,
    pub fade_out_step: f32,
    pub fade_out_tick: Duration,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            fade_in: Duration::from_millis(500),
            fade_in_steps: 20,
            fade_out_step: 0.1,
            fade_out_tick: Duration::from_millis(50),
        }
    }
}

impl From<&AudioSettings> for FadeConfig {
    fn from(s: &AudioSettings) -> Self {
        Self {
            fade_in: Duration::from_millis(s.fade_in_ms),
            fade_in_steps: s.fade_in_steps.max(1),
            fade_out_step: s.fade_out_step,
            fade_out_tick: Duration::from_millis(s.fade_tick_ms.max(1)),
        }
    }
}

/// Read-only view of the controller used by the UI and MPRIS.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub session: Option<SessionId>,
    pub source: Option<String>,
    pub state: Option<SessionState>,
    pub volume: f32,
    pub looping: bool,
    pub tone: ToneProfile,
    pub mode: VisualizationMode,
    /// A session is still fading out after `stop`.
    pub fading_out: bool,
}

impl ControllerSnapshot {
    pub fn playback(&self) -> PlaybackState {
        match self.state {
            Some(SessionState::Paused) => PlaybackState::Paused,
            Some(SessionState::Stopped) | None => PlaybackState::Stopped,
            Some(_) => PlaybackState::Playing,
        }
    }
}

pub fn mode_from_setting(setting: VisualizationSetting) -> Option<VisualizationMode> {
    match setting {
        VisualizationSetting::Bars => Some(VisualizationMode::Bars),
        VisualizationSetting::Wave => Some(VisualizationMode::Wave),
        VisualizationSetting::Circular => Some(VisualizationMode::Circular),
        VisualizationSetting::Off => None,
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device: {0}")]
    NoDevice(String),

    #[error("failed to open sound {source_id}")]
    Open {
        source_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode sound {0}")]
    Decode(String),

    #[error("failed to download sound {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("playback start rejected: {0}")]
    Rejected(String),
}

//! The single "now playing" slot.
//!
//! `AudioController` owns at most one live session plus at most one session
//! fading out after `stop`. Everything time-based happens in `tick`, which
//! the event loop calls on every iteration, so no timer outlives the session
//! that owns it.

use std::time::Instant;

use super::analysis::AnalysisChain;
use super::backend::{AudioBackend, StartOutcome, Voice, VoiceOptions};
use super::fade::{FadeKind, FadeStep, FadeTimer};
use super::types::{
    AudioError, ControllerSnapshot, FadeConfig, PlayOptions, SessionId, SessionState, ToneBand,
    ToneProfile, VisualizationMode, clamp_volume,
};
use super::visualizer::{RenderLoop, VisualFrame};

/// One logical playing/paused sound plus its fade and analysis state.
pub struct PlaybackSession {
    id: SessionId,
    source: String,
    volume: f32,
    target_volume: f32,
    looping: bool,
    state: SessionState,
    /// State to return to when a paused session resumes.
    resume_state: SessionState,
    voice: Box<dyn Voice>,
    analysis: Option<AnalysisChain>,
    fade: Option<FadeTimer>,
}

impl PlaybackSession {
    pub fn target_volume(&self) -> f32 {
        self.target_volume
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn write_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.voice.set_volume(volume);
    }

    /// Run every due firing of the session's fade. Returns true when the fade completed.
    fn run_fade(&mut self, now: Instant) -> bool {
        let Some(mut fade) = self.fade.take() else {
            return false;
        };
        while fade.fire_if_due(now) {
            match fade.apply(self.volume) {
                FadeStep::Continue(v) => self.write_volume(v),
                FadeStep::Done(v) => {
                    self.write_volume(v);
                    return true;
                }
                FadeStep::Finished => return true,
            }
        }
        self.fade = Some(fade);
        false
    }

    /// Halt playback, disconnect the analysis chain and release the voice.
    /// Consumes the session, so it can only happen once.
    fn teardown(mut self) -> SessionId {
        self.fade = None;
        self.voice.set_volume(0.0);
        self.voice.stop();
        if let Some(chain) = self.analysis.take() {
            chain.disconnect();
        }
        self.state = SessionState::Stopped;
        tracing::debug!(session = self.id.0, source = %self.source, "session torn down");
        self.id
    }
}

pub struct AudioController {
    backend: Box<dyn AudioBackend>,
    fades: FadeConfig,
    live: Option<PlaybackSession>,
    outgoing: Option<PlaybackSession>,
    next_id: u64,
    /// Gain for the live session and default target for the next one.
    volume: f32,
    looping: bool,
    tone: ToneProfile,
    analysis_enabled: bool,
    visualizer_attached: bool,
    mode: VisualizationMode,
    render_loop: Option<RenderLoop>,
    last_error: Option<String>,
}

impl AudioController {
    pub fn new(backend: Box<dyn AudioBackend>, fades: FadeConfig) -> Self {
        Self {
            backend,
            fades,
            live: None,
            outgoing: None,
            next_id: 1,
            volume: 0.5,
            looping: true,
            tone: ToneProfile::default(),
            analysis_enabled: true,
            visualizer_attached: false,
            mode: VisualizationMode::default(),
            render_loop: None,
            last_error: None,
        }
    }

    /// Whether new sessions get a tone/analysis chain.
    pub fn set_analysis_enabled(&mut self, enabled: bool) {
        self.analysis_enabled = enabled;
    }

    /// Start `source` as the new live session, tearing down whatever was
    /// playing or fading out first. Failures are logged and remembered in
    /// `last_error`; `None` means no session exists afterwards.
    pub fn play(&mut self, source: &str, options: PlayOptions, now: Instant) -> Option<SessionId> {
        self.teardown_sessions();

        if let Some(looping) = options.looping {
            self.looping = looping;
        }
        let target = clamp_volume(options.initial_target_volume.unwrap_or(self.volume));
        let analysis = self
            .analysis_enabled
            .then(|| AnalysisChain::new(self.tone));

        let voice = match self.backend.open(
            source,
            VoiceOptions {
                analysis: analysis.clone(),
            },
        ) {
            Ok(voice) => voice,
            Err(e) => {
                if let Some(chain) = analysis {
                    chain.disconnect();
                }
                self.report(source, &e);
                return None;
            }
        };

        let id = SessionId(self.next_id);
        self.next_id += 1;

        let mut session = PlaybackSession {
            id,
            source: source.to_string(),
            volume: 0.0,
            target_volume: target,
            looping: self.looping,
            state: SessionState::Idle,
            resume_state: SessionState::Idle,
            voice,
            analysis,
            fade: None,
        };
        session.write_volume(0.0);

        match session.voice.start() {
            StartOutcome::Started => {
                self.live = Some(session);
                self.on_started(now);
            }
            StartOutcome::Pending => {
                tracing::debug!(session = id.0, source, "playback start pending");
                self.live = Some(session);
            }
            StartOutcome::Rejected(e) => {
                self.report(source, &e);
                session.teardown();
                return None;
            }
        }
        self.last_error = None;
        Some(id)
    }

    fn on_started(&mut self, now: Instant) {
        let Some(s) = self.live.as_mut() else {
            return;
        };
        s.state = SessionState::FadingIn;
        s.fade = Some(FadeTimer::fade_in(
            now,
            s.target_volume,
            self.fades.fade_in,
            self.fades.fade_in_steps,
        ));
        tracing::info!(session = s.id.0, source = %s.source, target = s.target_volume, "playback started");
        self.start_render_loop();
    }

    fn start_render_loop(&mut self) {
        if !self.visualizer_attached {
            return;
        }
        let tap = self
            .live
            .as_ref()
            .filter(|s| matches!(s.state, SessionState::FadingIn | SessionState::Playing))
            .and_then(|s| s.analysis.clone());
        self.render_loop = tap.map(RenderLoop::start);
    }

    /// Suspend the live session. An in-flight fade is suspended with it.
    pub fn pause(&mut self, now: Instant) {
        self.render_loop = None;
        let Some(s) = self.live.as_mut() else {
            return;
        };
        if !matches!(s.state, SessionState::FadingIn | SessionState::Playing) {
            return;
        }
        s.voice.pause();
        if let Some(fade) = s.fade.as_mut() {
            fade.suspend(now);
        }
        s.resume_state = s.state;
        s.state = SessionState::Paused;
        tracing::debug!(session = s.id.0, "paused");
    }

    pub fn resume(&mut self, now: Instant) {
        let Some(s) = self.live.as_mut() else {
            return;
        };
        if s.state != SessionState::Paused {
            return;
        }
        s.voice.resume();
        if let Some(fade) = s.fade.as_mut() {
            fade.resume(now);
        }
        s.state = s.resume_state;
        tracing::debug!(session = s.id.0, "resumed");
        self.start_render_loop();
    }

    pub fn toggle_pause(&mut self, now: Instant) {
        match self.live.as_ref().map(|s| s.state) {
            Some(SessionState::Paused) => self.resume(now),
            Some(SessionState::FadingIn | SessionState::Playing) => self.pause(now),
            _ => {}
        }
    }

    /// Fade the live session out and tear it down once silent. Paused or
    /// not-yet-started sessions are torn down immediately. No-op without a session.
    pub fn stop(&mut self, now: Instant) {
        self.render_loop = None;
        let Some(mut s) = self.live.take() else {
            return;
        };
        if let Some(previous) = self.outgoing.take() {
            previous.teardown();
        }
        match s.state {
            SessionState::FadingIn | SessionState::Playing => {
                s.fade = Some(FadeTimer::fade_out(
                    now,
                    self.fades.fade_out_step,
                    self.fades.fade_out_tick,
                ));
                s.state = SessionState::FadingOut;
                tracing::debug!(session = s.id.0, from = s.volume, "fading out");
                self.outgoing = Some(s);
            }
            _ => {
                s.teardown();
            }
        }
    }

    /// Set the output gain. Applies to the live session at once (cancelling
    /// a fade-in in progress) and becomes the default for the next session.
    pub fn set_volume(&mut self, volume: f32) {
        let v = clamp_volume(volume);
        self.volume = v;
        let Some(s) = self.live.as_mut() else {
            return;
        };
        s.target_volume = v;
        if s.state == SessionState::Idle {
            return;
        }
        if s.fade.as_ref().map(|f| f.kind()) == Some(FadeKind::In) {
            s.fade = None;
            if s.state == SessionState::FadingIn {
                s.state = SessionState::Playing;
            }
            if s.resume_state == SessionState::FadingIn {
                s.resume_state = SessionState::Playing;
            }
        }
        s.write_volume(v);
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.looping = enabled;
        if let Some(s) = self.live.as_mut() {
            s.looping = enabled;
        }
    }

    /// Adjust one tone stage. Without a live analysis chain only the profile
    /// used for later sessions changes.
    pub fn set_tone_gain(&mut self, band: ToneBand, gain_db: f32) {
        let g = self.tone.set_gain(band, gain_db);
        if let Some(chain) = self.live.as_ref().and_then(|s| s.analysis.as_ref()) {
            chain.set_gain(band, g);
        }
    }

    pub fn set_visualization_mode(&mut self, mode: VisualizationMode) {
        self.mode = mode;
    }

    /// Whether a render loop should run while a session plays.
    pub fn attach_visualizer(&mut self, attached: bool) {
        self.visualizer_attached = attached;
        if attached {
            if self.render_loop.is_none() {
                self.start_render_loop();
            }
        } else {
            self.render_loop = None;
        }
    }

    /// One visualizer frame, or `None` when no render loop is running.
    pub fn render_frame(&mut self) -> Option<VisualFrame> {
        let mode = self.mode;
        self.render_loop.as_mut().map(|rl| rl.next_frame(mode))
    }

    pub fn visualizer_attached(&self) -> bool {
        self.visualizer_attached
    }

    #[cfg(test)]
    pub(crate) fn render_loop_active(&self) -> bool {
        self.render_loop.is_some()
    }

    /// Drive pending starts, fades and end-of-stream handling up to `now`.
    pub fn tick(&mut self, now: Instant) {
        self.poll_pending_start(now);

        let fade_in_done = self
            .live
            .as_mut()
            .filter(|s| s.state == SessionState::FadingIn)
            .map(|s| s.run_fade(now))
            .unwrap_or(false);
        if fade_in_done {
            if let Some(s) = self.live.as_mut() {
                s.state = SessionState::Playing;
                tracing::debug!(session = s.id.0, volume = s.volume, "fade-in complete");
            }
        }

        self.handle_end_of_stream();

        let fade_out_done = self
            .outgoing
            .as_mut()
            .map(|s| s.run_fade(now))
            .unwrap_or(false);
        if fade_out_done {
            if let Some(s) = self.outgoing.take() {
                s.teardown();
            }
        }
    }

    fn poll_pending_start(&mut self, now: Instant) {
        let Some(s) = self.live.as_mut() else {
            return;
        };
        if s.state != SessionState::Idle {
            return;
        }
        match s.voice.poll_start() {
            None => {}
            Some(Ok(())) => self.on_started(now),
            Some(Err(e)) => {
                let source = s.source.clone();
                self.report(&source, &e);
                if let Some(s) = self.live.take() {
                    s.teardown();
                }
            }
        }
    }

    fn handle_end_of_stream(&mut self) {
        let Some(s) = self.live.as_mut() else {
            return;
        };
        if !matches!(s.state, SessionState::FadingIn | SessionState::Playing)
            || !s.voice.is_finished()
        {
            return;
        }
        if s.looping {
            match s.voice.restart() {
                Ok(()) => {
                    tracing::debug!(session = s.id.0, "looped");
                    return;
                }
                Err(e) => {
                    let source = s.source.clone();
                    self.report(&source, &e);
                }
            }
        }
        self.render_loop = None;
        if let Some(s) = self.live.take() {
            s.teardown();
        }
    }

    /// Tear down everything, immediately.
    pub fn shutdown(&mut self) {
        self.teardown_sessions();
    }

    fn teardown_sessions(&mut self) {
        self.render_loop = None;
        if let Some(s) = self.outgoing.take() {
            s.teardown();
        }
        if let Some(s) = self.live.take() {
            s.teardown();
        }
    }

    fn report(&mut self, source: &str, error: &AudioError) {
        tracing::warn!(source, error = %error, "playback failed");
        self.last_error = Some(error.to_string());
    }

    pub fn live(&self) -> Option<&PlaybackSession> {
        self.live.as_ref()
    }

    /// The live session's current gain.
    pub fn live_volume(&self) -> Option<f32> {
        self.live.as_ref().map(|s| s.volume)
    }

    /// Gain the next session will fade in to.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn tone(&self) -> ToneProfile {
        self.tone
    }

    pub fn mode(&self) -> VisualizationMode {
        self.mode
    }

    pub fn is_fading_out(&self) -> bool {
        self.outgoing.is_some()
    }

    /// Most recent playback failure, cleared by the next successful `play`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            session: self.live.as_ref().map(|s| s.id),
            source: self.live.as_ref().map(|s| s.source.clone()),
            state: self.live.as_ref().map(|s| s.state),
            volume: self.live_volume().unwrap_or(self.volume),
            looping: self.looping,
            tone: self.tone,
            mode: self.mode,
            fading_out: self.outgoing.is_some(),
        }
    }
}

impl Drop for AudioController {
    fn drop(&mut self) {
        self.teardown_sessions();
    }
}

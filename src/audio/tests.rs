use std::time::{Duration, Instant};

use super::testing::{FakeBackend, StartMode};
use super::*;

/// Fake event loop: advances time in small steps, ticking the controller.
struct Clock {
    now: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    fn advance(&mut self, c: &mut AudioController, ms: u64) {
        let end = self.now + Duration::from_millis(ms);
        while self.now < end {
            self.now = (self.now + Duration::from_millis(5)).min(end);
            c.tick(self.now);
        }
    }
}

fn controller(fake: &FakeBackend) -> AudioController {
    AudioController::new(fake.boxed(), FadeConfig::default())
}

fn with_target(v: f32) -> PlayOptions {
    PlayOptions {
        initial_target_volume: Some(v),
        ..PlayOptions::default()
    }
}

#[test]
fn set_volume_reads_back_clamped() {
    for (input, expected) in [
        (0.0, 0.0),
        (0.25, 0.25),
        (0.5, 0.5),
        (1.0, 1.0),
        (-0.3, 0.0),
        (1.7, 1.0),
        (f32::NAN, 0.0),
    ] {
        let fake = FakeBackend::new();
        let mut c = controller(&fake);
        let mut clock = Clock::new();
        c.play("sounds/japan.ogg", PlayOptions::default(), clock.now);
        clock.advance(&mut c, 100);

        c.set_volume(input);
        assert_eq!(c.live_volume(), Some(expected), "input {input}");
        assert_eq!(fake.voice(0).borrow().last_volume(), expected);

        // A cancelled fade-in must not move it afterwards.
        clock.advance(&mut c, 1000);
        assert_eq!(c.live_volume(), Some(expected), "input {input}");
        assert_eq!(c.volume(), expected);
    }
}

#[test]
fn set_volume_without_session_sets_next_default() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.set_volume(0.8);
    assert_eq!(c.live_volume(), None);

    c.play("a.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 1000);
    let v = c.live_volume().unwrap();
    assert!((v - 0.8).abs() < 1e-4, "{v}");
}

#[test]
fn fade_in_follows_fixed_step_schedule() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let t0 = Instant::now();

    c.play("a.ogg", with_target(0.5), t0);
    assert_eq!(c.snapshot().state, Some(SessionState::FadingIn));
    assert_eq!(c.live_volume(), Some(0.0));

    // 20 steps over 500ms: one step of 0.025 every 25ms.
    c.tick(t0 + Duration::from_millis(250));
    let v = c.live_volume().unwrap();
    assert!((v - 0.25).abs() < 1e-5, "{v}");
    assert_eq!(c.snapshot().state, Some(SessionState::FadingIn));

    c.tick(t0 + Duration::from_millis(500));
    let v = c.live_volume().unwrap();
    assert!((v - 0.5).abs() < 1e-4, "{v}");
    assert_eq!(c.snapshot().state, Some(SessionState::Playing));
}

#[test]
fn fade_in_never_exceeds_target_or_full_scale() {
    for target in [0.0, 0.1, 0.33, 0.5, 0.77, 0.99, 1.0, 1.4] {
        let fake = FakeBackend::new();
        let mut c = controller(&fake);
        let mut clock = Clock::new();

        c.play("a.ogg", with_target(target), clock.now);
        clock.advance(&mut c, 1000);

        let ceiling = target.min(1.0);
        let log = fake.voice(0);
        let log = log.borrow();
        for &v in &log.volumes {
            assert!(v <= ceiling + 1e-6, "target {target}: wrote {v}");
            assert!(v <= 1.0);
        }
        assert!((log.last_volume() - ceiling).abs() < 1e-4, "target {target}");
        assert_eq!(c.snapshot().state, Some(SessionState::Playing));
    }
}

#[test]
fn fade_out_duration_is_proportional_to_volume() {
    for (start, expected_ticks) in [(1.0, 10), (0.5, 5), (0.25, 3), (0.05, 1)] {
        let fake = FakeBackend::new();
        let mut c = controller(&fake);
        let mut clock = Clock::new();

        c.play("a.ogg", PlayOptions::default(), clock.now);
        c.set_volume(start);
        c.stop(clock.now);
        assert!(c.is_fading_out());
        assert_eq!(c.live_volume(), None);

        let mut ticks = 0;
        while c.is_fading_out() {
            assert!(ticks < 100, "fade-out from {start} never finished");
            clock.now += Duration::from_millis(50);
            c.tick(clock.now);
            ticks += 1;
        }
        assert_eq!(ticks, expected_ticks, "start {start}");

        let log = fake.voice(0);
        let log = log.borrow();
        assert_eq!(log.stops, 1);
        assert_eq!(log.last_volume(), 0.0);
    }
}

#[test]
fn stop_without_session_is_a_noop() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let now = Instant::now();

    c.stop(now);
    c.tick(now + Duration::from_secs(1));
    c.stop(now + Duration::from_secs(2));

    assert_eq!(c.snapshot().state, None);
    assert!(!c.is_fading_out());
    assert_eq!(fake.voice_count(), 0);
    assert!(c.last_error().is_none());
}

#[test]
fn play_during_fade_out_leaves_exactly_one_audible_session() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.play("a.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 600);
    c.stop(clock.now);
    clock.advance(&mut c, 100);
    assert!(c.is_fading_out());

    c.play("b.ogg", PlayOptions::default(), clock.now);
    assert!(!c.is_fading_out());

    let a = fake.voice(0);
    let writes_at_replace = a.borrow().volumes.len();
    assert_eq!(a.borrow().stops, 1);

    clock.advance(&mut c, 2000);

    let a = a.borrow();
    assert_eq!(a.volumes.len(), writes_at_replace);
    assert_eq!(a.writes_after_stop, 0);
    assert_eq!(a.stops, 1);

    let b = fake.voice(1);
    let b = b.borrow();
    assert_eq!(b.stops, 0);
    assert!((b.last_volume() - 0.5).abs() < 1e-4);
    assert_eq!(c.snapshot().source.as_deref(), Some("b.ogg"));
    assert_eq!(c.snapshot().state, Some(SessionState::Playing));
}

#[test]
fn back_to_back_play_discards_the_first_session() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.play("src1.ogg", PlayOptions::default(), clock.now);
    c.play("src2.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 2000);

    let first = fake.voice(0);
    let first = first.borrow();
    assert_eq!(first.stops, 1);
    assert_eq!(first.writes_after_stop, 0);
    assert!(first.volumes.iter().all(|&v| v == 0.0));

    assert_eq!(c.snapshot().source.as_deref(), Some("src2.ogg"));
    assert!((fake.voice(1).borrow().last_volume() - 0.5).abs() < 1e-4);
}

#[test]
fn rejected_start_leaves_no_session_and_can_be_retried() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    fake.set_start_mode(StartMode::Reject);
    assert_eq!(c.play("a.ogg", PlayOptions::default(), clock.now), None);
    assert!(c.live().is_none());
    assert!(c.last_error().unwrap().contains("autoplay blocked"));
    assert_eq!(fake.voice(0).borrow().stops, 1);

    clock.advance(&mut c, 1000);
    assert_eq!(fake.voice(0).borrow().writes_after_stop, 0);

    fake.set_start_mode(StartMode::Immediate);
    assert!(c.play("a.ogg", PlayOptions::default(), clock.now).is_some());
    assert!(c.last_error().is_none());
    clock.advance(&mut c, 1000);
    assert_eq!(c.snapshot().state, Some(SessionState::Playing));
}

#[test]
fn unopenable_source_is_reported() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);

    fake.mark_missing("gone.ogg");
    assert_eq!(c.play("gone.ogg", PlayOptions::default(), Instant::now()), None);
    assert_eq!(fake.voice_count(), 0);
    assert!(c.last_error().unwrap().contains("gone.ogg"));
}

#[test]
fn silent_backend_reports_missing_device() {
    let mut c = AudioController::new(
        Box::new(SilentBackend::new("no ALSA device")),
        FadeConfig::default(),
    );
    assert_eq!(c.play("a.ogg", PlayOptions::default(), Instant::now()), None);
    assert!(c.live().is_none());
    assert_eq!(c.last_error(), Some("no audio output device: no ALSA device"));
}

#[test]
fn deferred_start_fades_in_only_after_confirmation() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    fake.set_start_mode(StartMode::Deferred);
    let id = c.play("https://example.org/a.ogg", PlayOptions::default(), clock.now);
    assert!(id.is_some());
    assert_eq!(c.snapshot().state, Some(SessionState::Idle));

    clock.advance(&mut c, 1000);
    assert_eq!(c.live_volume(), Some(0.0));
    assert!(fake.voice(0).borrow().volumes.iter().all(|&v| v == 0.0));

    fake.voice(0).borrow_mut().resolution = Some(Ok(()));
    clock.advance(&mut c, 5);
    assert_eq!(c.snapshot().state, Some(SessionState::FadingIn));

    clock.advance(&mut c, 600);
    assert_eq!(c.snapshot().state, Some(SessionState::Playing));
}

#[test]
fn deferred_start_of_a_replaced_session_is_ignored() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    fake.set_start_mode(StartMode::Deferred);
    c.play("a.ogg", PlayOptions::default(), clock.now);
    fake.set_start_mode(StartMode::Immediate);
    c.play("b.ogg", PlayOptions::default(), clock.now);

    fake.voice(0).borrow_mut().resolution = Some(Ok(()));
    clock.advance(&mut c, 1000);

    let a = fake.voice(0);
    let a = a.borrow();
    assert!(!a.started);
    assert_eq!(a.stops, 1);
    assert_eq!(a.writes_after_stop, 0);
    assert_eq!(c.snapshot().source.as_deref(), Some("b.ogg"));
}

#[test]
fn deferred_rejection_tears_the_session_down() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    fake.set_start_mode(StartMode::Deferred);
    c.play("a.ogg", PlayOptions::default(), clock.now);
    fake.voice(0).borrow_mut().resolution = Some(Err("NotAllowedError".to_string()));
    clock.advance(&mut c, 5);

    assert!(c.live().is_none());
    assert_eq!(fake.voice(0).borrow().stops, 1);
    assert!(c.last_error().unwrap().contains("NotAllowedError"));
}

#[test]
fn pause_suspends_and_resume_continues_the_fade_in() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let t0 = Instant::now();

    c.play("a.ogg", with_target(0.5), t0);
    c.tick(t0 + Duration::from_millis(250));
    c.pause(t0 + Duration::from_millis(250));
    assert_eq!(c.snapshot().state, Some(SessionState::Paused));
    assert_eq!(c.snapshot().playback(), PlaybackState::Paused);
    assert!(fake.voice(0).borrow().paused);

    c.tick(t0 + Duration::from_secs(5));
    let v = c.live_volume().unwrap();
    assert!((v - 0.25).abs() < 1e-5, "fade kept running while paused: {v}");

    c.resume(t0 + Duration::from_secs(5));
    assert!(!fake.voice(0).borrow().paused);
    assert_eq!(c.snapshot().state, Some(SessionState::FadingIn));
    c.tick(t0 + Duration::from_millis(5250));
    let v = c.live_volume().unwrap();
    assert!((v - 0.5).abs() < 1e-4, "{v}");
    assert_eq!(c.snapshot().state, Some(SessionState::Playing));
}

#[test]
fn toggle_pause_round_trips() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.toggle_pause(clock.now);
    assert_eq!(c.snapshot().state, None);

    c.play("a.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 600);
    c.toggle_pause(clock.now);
    assert_eq!(c.snapshot().state, Some(SessionState::Paused));
    c.toggle_pause(clock.now);
    assert_eq!(c.snapshot().state, Some(SessionState::Playing));
}

#[test]
fn stop_while_paused_tears_down_immediately() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.play("a.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 600);
    c.pause(clock.now);
    c.stop(clock.now);

    assert!(!c.is_fading_out());
    assert!(c.live().is_none());
    assert_eq!(fake.voice(0).borrow().stops, 1);
}

#[test]
fn teardown_happens_exactly_once() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.play("a.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 600);
    c.stop(clock.now);
    clock.advance(&mut c, 1000);
    c.stop(clock.now);
    c.shutdown();
    drop(c);

    assert_eq!(fake.voice(0).borrow().stops, 1);
}

#[test]
fn looping_session_restarts_and_plain_session_ends() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    c.play("a.ogg", PlayOptions::default(), clock.now);
    clock.advance(&mut c, 600);

    fake.voice(0).borrow_mut().finished = true;
    clock.advance(&mut c, 5);
    assert_eq!(fake.voice(0).borrow().restarts, 1);
    assert!(c.live().is_some());

    c.set_loop(false);
    fake.voice(0).borrow_mut().finished = true;
    clock.advance(&mut c, 5);
    assert!(c.live().is_none());
    assert_eq!(fake.voice(0).borrow().stops, 1);
    assert_eq!(c.snapshot().playback(), PlaybackState::Stopped);

    // The flag carries over to the next session.
    c.play("b.ogg", PlayOptions::default(), clock.now);
    assert!(!c.looping());
}

#[test]
fn tone_gain_is_clamped_and_reaches_the_live_chain() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let now = Instant::now();

    // No chain yet: only the profile changes.
    c.set_tone_gain(ToneBand::Bass, 9.0);
    assert_eq!(c.tone().gain(ToneBand::Bass), TONE_GAIN_MAX_DB);

    c.play("a.ogg", PlayOptions::default(), now);
    let chain = fake.voice(0).borrow().analysis.clone().unwrap();
    assert_eq!(chain.gain(ToneBand::Bass), TONE_GAIN_MAX_DB);

    c.set_tone_gain(ToneBand::Treble, -2.0);
    assert_eq!(chain.gain(ToneBand::Treble), -2.0);
    assert_eq!(c.snapshot().tone.gain(ToneBand::Treble), -2.0);
}

#[test]
fn tone_gain_without_analysis_chain_does_not_fail() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    c.set_analysis_enabled(false);

    c.play("a.ogg", PlayOptions::default(), Instant::now());
    assert!(fake.voice(0).borrow().analysis.is_none());
    c.set_tone_gain(ToneBand::Mid, 3.0);
    assert_eq!(c.tone().gain(ToneBand::Mid), 3.0);
}

#[test]
fn render_loop_is_cancelled_on_every_exit_path() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();
    c.attach_visualizer(true);

    assert!(c.render_frame().is_none());

    c.play("a.ogg", PlayOptions::default(), clock.now);
    assert!(c.render_loop_active());
    assert!(matches!(c.render_frame(), Some(VisualFrame::Bars(_))));

    c.pause(clock.now);
    assert!(!c.render_loop_active());
    assert!(c.render_frame().is_none());

    c.resume(clock.now);
    assert!(c.render_loop_active());
    c.set_visualization_mode(VisualizationMode::Wave);
    assert!(matches!(c.render_frame(), Some(VisualFrame::Wave(_))));

    c.play("b.ogg", PlayOptions::default(), clock.now);
    assert!(c.render_loop_active());

    clock.advance(&mut c, 600);
    c.stop(clock.now);
    assert!(!c.render_loop_active());

    c.play("c.ogg", PlayOptions::default(), clock.now);
    c.attach_visualizer(false);
    assert!(!c.render_loop_active());
    c.shutdown();
    assert!(!c.render_loop_active());
}

#[test]
fn teardown_disconnects_the_analysis_chain() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);

    c.play("a.ogg", PlayOptions::default(), Instant::now());
    let chain = fake.voice(0).borrow().analysis.clone().unwrap();
    chain.push_samples(&[0.5; 16], 44_100);
    assert!(chain.is_connected());

    c.shutdown();
    assert!(!chain.is_connected());
    assert!(chain.latest(16).is_empty());
}

#[test]
fn snapshot_maps_states_to_playback() {
    let fake = FakeBackend::new();
    let mut c = controller(&fake);
    let mut clock = Clock::new();

    assert_eq!(c.snapshot().playback(), PlaybackState::Stopped);
    c.play("a.ogg", PlayOptions::default(), clock.now);
    assert_eq!(c.snapshot().playback(), PlaybackState::Playing);
    clock.advance(&mut c, 600);
    c.stop(clock.now);
    let snap = c.snapshot();
    assert_eq!(snap.playback(), PlaybackState::Stopped);
    assert!(snap.fading_out);
}

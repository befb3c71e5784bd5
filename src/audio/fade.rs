//! Tick-based volume fades.
//!
//! A `FadeTimer` behaves like an interval timer: started at `t0` with
//! interval `d` it fires at `t0 + d`, `t0 + 2d`, ... Each firing moves the
//! volume one fixed step. The timer is plain data owned by its session, so
//! cancelling it is dropping it.

use std::time::{Duration, Instant};

/// Volumes within this distance of a fade's end count as arrived.
pub(crate) const FADE_EPSILON: f32 = 1e-4;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FadeKind {
    In,
    Out,
}

/// Outcome of a single timer firing.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum FadeStep {
    /// Write this volume; the fade goes on.
    Continue(f32),
    /// Write this volume; the fade is complete.
    Done(f32),
    /// Nothing to write; the fade is complete.
    Finished,
}

#[derive(Debug, Clone)]
pub(crate) struct FadeTimer {
    kind: FadeKind,
    interval: Duration,
    next_due: Instant,
    step: f32,
    target: f32,
    suspended: Option<Duration>,
}

impl FadeTimer {
    /// Fade towards `target` in `steps` equal increments spread over `duration`.
    pub(crate) fn fade_in(now: Instant, target: f32, duration: Duration, steps: u32) -> Self {
        let steps = steps.max(1);
        let interval = (duration / steps).max(MIN_INTERVAL);
        Self {
            kind: FadeKind::In,
            interval,
            next_due: now + interval,
            step: target / steps as f32,
            target,
            suspended: None,
        }
    }

    /// Fade towards silence by `step` every `tick`, however long that takes.
    pub(crate) fn fade_out(now: Instant, step: f32, tick: Duration) -> Self {
        let interval = tick.max(MIN_INTERVAL);
        Self {
            kind: FadeKind::Out,
            interval,
            next_due: now + interval,
            step,
            target: 0.0,
            suspended: None,
        }
    }

    pub(crate) fn kind(&self) -> FadeKind {
        self.kind
    }

    /// Consume one due firing, if any. Call repeatedly to catch up on late ticks.
    pub(crate) fn fire_if_due(&mut self, now: Instant) -> bool {
        if self.suspended.is_some() || now < self.next_due {
            return false;
        }
        self.next_due += self.interval;
        true
    }

    /// Freeze the timer, remembering how much of the current interval is left.
    pub(crate) fn suspend(&mut self, now: Instant) {
        if self.suspended.is_none() {
            self.suspended = Some(self.next_due.saturating_duration_since(now));
        }
    }

    pub(crate) fn resume(&mut self, now: Instant) {
        if let Some(remaining) = self.suspended.take() {
            self.next_due = now + remaining;
        }
    }

    /// Compute the volume after one firing starting from `volume`.
    pub(crate) fn apply(&self, volume: f32) -> FadeStep {
        match self.kind {
            FadeKind::In => {
                let ceiling = self.target.min(1.0);
                if volume + FADE_EPSILON >= ceiling {
                    return FadeStep::Finished;
                }
                let next = (volume + self.step).min(ceiling);
                if next + FADE_EPSILON >= ceiling {
                    FadeStep::Done(next)
                } else {
                    FadeStep::Continue(next)
                }
            }
            FadeKind::Out => {
                let next = volume - self.step;
                if next <= FADE_EPSILON {
                    FadeStep::Done(0.0)
                } else {
                    FadeStep::Continue(next)
                }
            }
        }
    }
}

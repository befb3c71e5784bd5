//! Guided tour: a timed walk through a list of countries.

use std::time::{Duration, Instant};

/// Ordered stops (dataset indices) visited one after another, each held
/// for `dwell`.
#[derive(Debug, Clone)]
pub struct Tour {
    stops: Vec<usize>,
    dwell: Duration,
    position: Option<usize>,
    next_at: Option<Instant>,
}

impl Tour {
    pub fn new(stops: Vec<usize>, dwell: Duration) -> Self {
        Self {
            stops,
            dwell,
            position: None,
            next_at: None,
        }
    }

    /// Countries not yet visited, in dataset order; every country when all
    /// have been visited.
    pub fn plan(total: usize, is_visited: impl Fn(usize) -> bool) -> Vec<usize> {
        let unvisited: Vec<usize> = (0..total).filter(|&i| !is_visited(i)).collect();
        if unvisited.is_empty() {
            (0..total).collect()
        } else {
            unvisited
        }
    }

    /// Begin at the first stop. `None` when there are no stops.
    pub fn start(&mut self, now: Instant) -> Option<usize> {
        let first = *self.stops.first()?;
        self.position = Some(0);
        self.next_at = Some(now + self.dwell);
        tracing::info!(stops = self.stops.len(), "tour started");
        Some(first)
    }

    /// The next stop once the current one's dwell time has passed. The tour
    /// ends after the last stop's dwell.
    pub fn tick(&mut self, now: Instant) -> Option<usize> {
        let (pos, due) = (self.position?, self.next_at?);
        if now < due {
            return None;
        }
        let next = pos + 1;
        match self.stops.get(next) {
            Some(&stop) => {
                self.position = Some(next);
                self.next_at = Some(due + self.dwell);
                Some(stop)
            }
            None => {
                tracing::info!("tour finished");
                self.stop();
                None
            }
        }
    }

    pub fn stop(&mut self) {
        self.position = None;
        self.next_at = None;
    }

    pub fn is_active(&self) -> bool {
        self.position.is_some()
    }

    #[cfg(test)]
    fn current(&self) -> Option<usize> {
        self.position.and_then(|p| self.stops.get(p).copied())
    }

    /// 1-based position and stop count, for the status line.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.position.map(|p| (p + 1, self.stops.len()))
    }
}

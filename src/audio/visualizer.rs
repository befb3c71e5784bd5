//! Render loop feeding the visualizer widget.
//!
//! The loop owns a clone of the session's analysis tap, taken once when it
//! starts. The UI asks for one `VisualFrame` per drawn frame; the controller
//! drops the loop on pause, stop, replacement and shutdown.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use super::analysis::AnalysisChain;
use super::types::VisualizationMode;

const FFT_SIZE: usize = 1024;
pub const BAR_COUNT: usize = 32;
pub const RING_COUNT: usize = 48;
pub const WAVE_POINTS: usize = 128;

/// Magnitudes below this many dB under full scale render as empty.
const FLOOR_DB: f32 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub enum VisualFrame {
    /// Log-spaced band levels in `[0, 1]`, low to high.
    Bars(Vec<f32>),
    /// Waveform samples in `[-1, 1]`, oldest first.
    Wave(Vec<f32>),
    /// Band levels in `[0, 1]` to be laid out clockwise on a circle.
    Circular(Vec<f32>),
}

pub struct RenderLoop {
    tap: AnalysisChain,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frames: u64,
}

impl RenderLoop {
    pub(crate) fn start(tap: AnalysisChain) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = hann(FFT_SIZE);
        Self {
            tap,
            fft,
            window,
            frames: 0,
        }
    }

    /// Frames produced since the loop started.
    #[cfg(test)]
    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    pub fn next_frame(&mut self, mode: VisualizationMode) -> VisualFrame {
        self.frames += 1;
        match mode {
            VisualizationMode::Bars => VisualFrame::Bars(self.spectrum(BAR_COUNT)),
            VisualizationMode::Circular => VisualFrame::Circular(self.spectrum(RING_COUNT)),
            VisualizationMode::Wave => {
                VisualFrame::Wave(downsample(&self.tap.latest(FFT_SIZE), WAVE_POINTS))
            }
        }
    }

    fn spectrum(&self, bands: usize) -> Vec<f32> {
        let samples = self.tap.latest(FFT_SIZE);
        band_levels(&samples, &self.window, self.fft.as_ref(), bands)
    }
}

fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = std::f32::consts::PI * 2.0 * i as f32 / (n - 1) as f32;
            0.5 - 0.5 * x.cos()
        })
        .collect()
}

/// Windowed FFT of the newest samples grouped into `bands` log-spaced levels.
pub(crate) fn band_levels(
    samples: &[f32],
    window: &[f32],
    fft: &dyn Fft<f32>,
    bands: usize,
) -> Vec<f32> {
    let n = fft.len();
    let mut buf: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
    // Right-align so a short tap still lines up with the window's tail.
    let samples = &samples[samples.len().saturating_sub(n)..];
    let offset = n - samples.len();
    for (i, &s) in samples.iter().enumerate() {
        let idx = offset + i;
        buf[idx] = Complex::new(s * window[idx], 0.0);
    }
    fft.process(&mut buf);

    let bins = n / 2;
    let reference = n as f32 / 4.0;
    let mut levels = Vec::with_capacity(bands);
    for band in 0..bands {
        let (lo, hi) = band_bins(band, bands, bins);
        let peak = buf[lo..hi]
            .iter()
            .map(|c| c.norm())
            .fold(0.0f32, f32::max);
        let db = 20.0 * (peak / reference).max(1e-9).log10();
        levels.push(((db + FLOOR_DB) / FLOOR_DB).clamp(0.0, 1.0));
    }
    levels
}

/// Bin range `[lo, hi)` of `band`, spaced logarithmically over `1..bins`.
fn band_bins(band: usize, bands: usize, bins: usize) -> (usize, usize) {
    let max = bins as f32;
    let edge = |b: usize| max.powf(b as f32 / bands as f32).floor() as usize;
    let lo = edge(band).max(1);
    let hi = edge(band + 1).max(lo + 1).min(bins);
    (lo.min(hi - 1), hi)
}

fn downsample(samples: &[f32], points: usize) -> Vec<f32> {
    if samples.is_empty() {
        return vec![0.0; points];
    }
    (0..points)
        .map(|i| {
            let idx = i * samples.len() / points;
            samples[idx.min(samples.len() - 1)].clamp(-1.0, 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::ToneProfile;

    fn sine(freq: f32, rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin() * 0.8)
            .collect()
    }

    #[test]
    fn silence_renders_empty_bars() {
        let tap = AnalysisChain::new(ToneProfile::default());
        let mut rl = RenderLoop::start(tap);
        match rl.next_frame(VisualizationMode::Bars) {
            VisualFrame::Bars(levels) => {
                assert_eq!(levels.len(), BAR_COUNT);
                assert!(levels.iter().all(|&l| l == 0.0));
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(rl.frames(), 1);
    }

    #[test]
    fn high_tone_lands_in_upper_bands() {
        let tap = AnalysisChain::new(ToneProfile::default());
        tap.push_samples(&sine(8_000.0, 44_100.0, FFT_SIZE), 44_100);
        let mut rl = RenderLoop::start(tap);
        let VisualFrame::Bars(levels) = rl.next_frame(VisualizationMode::Bars) else {
            panic!("expected bars");
        };
        let loudest = levels
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &l)| if l > acc.1 { (i, l) } else { acc })
            .0;
        assert!(loudest > BAR_COUNT / 2, "loudest band {loudest}");
    }

    #[test]
    fn wave_and_circular_have_fixed_sizes() {
        let tap = AnalysisChain::new(ToneProfile::default());
        tap.push_samples(&sine(440.0, 44_100.0, 300), 44_100);
        let mut rl = RenderLoop::start(tap);
        match rl.next_frame(VisualizationMode::Wave) {
            VisualFrame::Wave(points) => {
                assert_eq!(points.len(), WAVE_POINTS);
                assert!(points.iter().all(|p| (-1.0..=1.0).contains(p)));
            }
            other => panic!("unexpected frame {other:?}"),
        }
        match rl.next_frame(VisualizationMode::Circular) {
            VisualFrame::Circular(levels) => assert_eq!(levels.len(), RING_COUNT),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn band_bins_cover_the_spectrum_without_gaps_at_the_top() {
        let bins = FFT_SIZE / 2;
        let (_, last_hi) = band_bins(BAR_COUNT - 1, BAR_COUNT, bins);
        assert_eq!(last_hi, bins);
        for b in 0..BAR_COUNT {
            let (lo, hi) = band_bins(b, BAR_COUNT, bins);
            assert!(lo < hi && hi <= bins);
        }
    }
}

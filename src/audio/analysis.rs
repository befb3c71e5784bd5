//! Tone shaping and sample capture for one session.
//!
//! An `AnalysisChain` is a shared handle: the controller keeps one clone to
//! change gains and disconnect at teardown, the audio thread keeps another
//! inside a `ToneShaper` source that filters the signal and feeds the tap.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::Source;

use super::types::{ToneBand, ToneProfile, clamp_tone_gain};

/// Samples kept for the visualizer (mono).
pub const TAP_CAPACITY: usize = 4096;

const BASS_HZ: f32 = 250.0;
const MID_HZ: f32 = 1000.0;
const TREBLE_HZ: f32 = 4000.0;
const MID_Q: f32 = 1.0;

/// Mono samples are handed to the tap in batches to keep locking off the hot path.
const TAP_BATCH: usize = 256;

/// How often (in frames) the shaper looks for gain changes.
const GAIN_POLL_FRAMES: usize = 512;

struct ChainShared {
    gains: [AtomicU32; 3],
    version: AtomicU64,
    connected: AtomicBool,
    tap: Mutex<SampleTap>,
}

struct SampleTap {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: u32,
}

#[derive(Clone)]
pub struct AnalysisChain {
    inner: Arc<ChainShared>,
}

impl AnalysisChain {
    pub fn new(profile: ToneProfile) -> Self {
        Self::with_capacity(profile, TAP_CAPACITY)
    }

    pub fn with_capacity(profile: ToneProfile, capacity: usize) -> Self {
        let gains = ToneBand::ALL.map(|b| AtomicU32::new(profile.gain(b).to_bits()));
        Self {
            inner: Arc::new(ChainShared {
                gains,
                version: AtomicU64::new(0),
                connected: AtomicBool::new(true),
                tap: Mutex::new(SampleTap {
                    samples: VecDeque::with_capacity(capacity),
                    capacity: capacity.max(1),
                    sample_rate: 44_100,
                }),
            }),
        }
    }

    pub fn set_gain(&self, band: ToneBand, gain_db: f32) {
        let g = clamp_tone_gain(gain_db);
        self.inner.gains[band.index()].store(g.to_bits(), Ordering::Relaxed);
        self.inner.version.fetch_add(1, Ordering::Release);
    }

    pub fn gain(&self, band: ToneBand) -> f32 {
        f32::from_bits(self.inner.gains[band.index()].load(Ordering::Relaxed))
    }

    fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Stop recording and drop captured samples. Filtering keeps working so
    /// a voice still draining does not change colour.
    pub fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::Release);
        if let Ok(mut tap) = self.inner.tap.lock() {
            tap.samples.clear();
        }
    }

    /// Append mono samples captured at `sample_rate`.
    pub fn push_samples(&self, samples: &[f32], sample_rate: u32) {
        if !self.is_connected() {
            return;
        }
        if let Ok(mut tap) = self.inner.tap.lock() {
            tap.sample_rate = sample_rate;
            for &s in samples {
                if tap.samples.len() == tap.capacity {
                    tap.samples.pop_front();
                }
                tap.samples.push_back(s);
            }
        }
    }

    /// The newest `n` samples (fewer if not captured yet), oldest first.
    pub fn latest(&self, n: usize) -> Vec<f32> {
        let Ok(tap) = self.inner.tap.lock() else {
            return Vec::new();
        };
        let skip = tap.samples.len().saturating_sub(n);
        tap.samples.iter().skip(skip).copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn sample_rate(&self) -> u32 {
        self.inner
            .tap
            .lock()
            .map(|t| t.sample_rate)
            .unwrap_or(44_100)
    }
}

/// Second-order IIR section, transposed direct form II.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    fn from_coefficients(b: [f32; 3], a: [f32; 3]) -> Self {
        let a0 = a[0];
        Self {
            b0: b[0] / a0,
            b1: b[1] / a0,
            b2: b[2] / a0,
            a1: a[1] / a0,
            a2: a[2] / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub(crate) fn low_shelf(sample_rate: u32, freq: f32, gain_db: f32) -> Self {
        let (a, cos, sqrt_a_alpha) = shelf_terms(sample_rate, freq, gain_db);
        Self::from_coefficients(
            [
                a * ((a + 1.0) - (a - 1.0) * cos + sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
                a * ((a + 1.0) - (a - 1.0) * cos - sqrt_a_alpha),
            ],
            [
                (a + 1.0) + (a - 1.0) * cos + sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos),
                (a + 1.0) + (a - 1.0) * cos - sqrt_a_alpha,
            ],
        )
    }

    pub(crate) fn high_shelf(sample_rate: u32, freq: f32, gain_db: f32) -> Self {
        let (a, cos, sqrt_a_alpha) = shelf_terms(sample_rate, freq, gain_db);
        Self::from_coefficients(
            [
                a * ((a + 1.0) + (a - 1.0) * cos + sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                a * ((a + 1.0) + (a - 1.0) * cos - sqrt_a_alpha),
            ],
            [
                (a + 1.0) - (a - 1.0) * cos + sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos),
                (a + 1.0) - (a - 1.0) * cos - sqrt_a_alpha,
            ],
        )
    }

    pub(crate) fn peaking(sample_rate: u32, freq: f32, q: f32, gain_db: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * safe_freq(sample_rate, freq) / sample_rate.max(1) as f32;
        let cos = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        Self::from_coefficients(
            [1.0 + alpha * a, -2.0 * cos, 1.0 - alpha * a],
            [1.0 + alpha / a, -2.0 * cos, 1.0 - alpha / a],
        )
    }

    pub(crate) fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Keep the filter state, swap the response.
    fn retune(&mut self, other: Biquad) {
        let (z1, z2) = (self.z1, self.z2);
        *self = other;
        self.z1 = z1;
        self.z2 = z2;
    }
}

fn safe_freq(sample_rate: u32, freq: f32) -> f32 {
    freq.min(sample_rate as f32 * 0.45)
}

// Shelf slope S = 1.
fn shelf_terms(sample_rate: u32, freq: f32, gain_db: f32) -> (f32, f32, f32) {
    let a = 10f32.powf(gain_db / 40.0);
    let w0 = 2.0 * PI * safe_freq(sample_rate, freq) / sample_rate.max(1) as f32;
    let alpha = w0.sin() / 2.0 * 2f32.sqrt();
    (a, w0.cos(), 2.0 * a.sqrt() * alpha)
}

fn stages_for(sample_rate: u32, gains: [f32; 3]) -> [Biquad; 3] {
    [
        Biquad::low_shelf(sample_rate, BASS_HZ, gains[0]),
        Biquad::peaking(sample_rate, MID_HZ, MID_Q, gains[1]),
        Biquad::high_shelf(sample_rate, TREBLE_HZ, gains[2]),
    ]
}

/// Interleaved-sample DSP behind `ToneShaper`, independent of `rodio`.
pub(crate) struct ToneProcessor {
    chain: AnalysisChain,
    channels: usize,
    sample_rate: u32,
    filters: Vec<[Biquad; 3]>,
    seen_version: u64,
    channel_pos: usize,
    frames_since_poll: usize,
    frame_sum: f32,
    pending: Vec<f32>,
}

impl ToneProcessor {
    pub(crate) fn new(chain: AnalysisChain, channels: usize, sample_rate: u32) -> Self {
        let mut p = Self {
            chain,
            channels: channels.max(1),
            sample_rate,
            filters: Vec::new(),
            seen_version: 0,
            channel_pos: 0,
            frames_since_poll: 0,
            frame_sum: 0.0,
            pending: Vec::with_capacity(TAP_BATCH),
        };
        p.rebuild();
        p
    }

    fn gains(&self) -> [f32; 3] {
        ToneBand::ALL.map(|b| self.chain.gain(b))
    }

    fn rebuild(&mut self) {
        self.seen_version = self.chain.version();
        let stages = stages_for(self.sample_rate, self.gains());
        self.filters = vec![stages; self.channels];
    }

    fn retune(&mut self) {
        self.seen_version = self.chain.version();
        let stages = stages_for(self.sample_rate, self.gains());
        for ch in &mut self.filters {
            for (old, new) in ch.iter_mut().zip(stages) {
                old.retune(new);
            }
        }
    }

    /// Follow a format change of the underlying stream; only at frame boundaries.
    pub(crate) fn set_format(&mut self, channels: usize, sample_rate: u32) {
        let channels = channels.max(1);
        if self.channel_pos == 0 && (channels != self.channels || sample_rate != self.sample_rate)
        {
            self.channels = channels;
            self.sample_rate = sample_rate;
            self.rebuild();
        }
    }

    pub(crate) fn process(&mut self, sample: f32) -> f32 {
        if self.channel_pos == 0 {
            self.frames_since_poll += 1;
            if self.frames_since_poll >= GAIN_POLL_FRAMES {
                self.frames_since_poll = 0;
                if self.chain.version() != self.seen_version {
                    self.retune();
                }
            }
        }

        let mut y = sample;
        for stage in &mut self.filters[self.channel_pos] {
            y = stage.process(y);
        }

        self.frame_sum += y;
        self.channel_pos += 1;
        if self.channel_pos == self.channels {
            self.pending.push(self.frame_sum / self.channels as f32);
            self.frame_sum = 0.0;
            self.channel_pos = 0;
            if self.pending.len() >= TAP_BATCH {
                self.flush();
            }
        }
        y
    }

    pub(crate) fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.chain.push_samples(&self.pending, self.sample_rate);
            self.pending.clear();
        }
    }
}

/// `rodio` source adapter running the tone stages and feeding the tap.
pub struct ToneShaper<S: Source> {
    input: S,
    processor: ToneProcessor,
}

impl<S: Source> ToneShaper<S> {
    pub fn new(input: S, chain: AnalysisChain) -> Self {
        let channels = u16::from(input.channels()) as usize;
        let sample_rate = u32::from(input.sample_rate());
        Self {
            input,
            processor: ToneProcessor::new(chain, channels, sample_rate),
        }
    }
}

impl<S: Source> Iterator for ToneShaper<S> {
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.processor.set_format(
            u16::from(self.input.channels()) as usize,
            u32::from(self.input.sample_rate()),
        );
        match self.input.next() {
            Some(s) => Some(self.processor.process(s)),
            None => {
                self.processor.flush();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.input.size_hint()
    }
}

impl<S: Source> Source for ToneShaper<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.input.current_span_len()
    }

    fn channels(&self) -> rodio::ChannelCount {
        self.input.channels()
    }

    fn sample_rate(&self) -> rodio::SampleRate {
        self.input.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.input.total_duration()
    }
}
